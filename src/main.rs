#[macro_use]
extern crate log;

mod collector;
mod config;
mod parser;
mod session;
mod sink;

use crate::collector::{
    count_by_status, ArtifactWriter, BatchScheduler, CollectionStatus, ConsoleProgress,
    SessionRunner,
};
use crate::config::{load_catalog, load_inventory, load_settings, CredentialDefaults};
use crate::parser::TextFsmParser;
use crate::session::CliConnector;
use crate::sink::FileSink;

use anyhow::{bail, Context};
use clap::Parser;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Collects CLI output from network devices, batch by batch.
#[derive(Parser, Debug)]
#[command(name = "netcollector", version)]
struct Cli {
    /// Default username for devices without auth_username
    #[arg(short = 'u', long = "user", env = "NETCOLLECTOR_USER")]
    user: Option<String>,

    /// Default password for devices without credentials
    #[arg(
        short = 'p',
        long,
        env = "NETCOLLECTOR_PASSWORD",
        hide_env_values = true,
        conflicts_with = "private_key"
    )]
    password: Option<String>,

    /// Default private key for devices without credentials
    #[arg(long, env = "NETCOLLECTOR_AUTH_PRIVATE_KEY")]
    private_key: Option<PathBuf>,

    /// Passphrase of the private keys, unless a device sets its own
    #[arg(
        long,
        env = "NETCOLLECTOR_PRIVATE_KEY_PASSPHRASE",
        hide_env_values = true
    )]
    private_key_passphrase: Option<String>,

    #[arg(
        short = 'i',
        long,
        env = "NETCOLLECTOR_INVENTORY_FILE",
        default_value = "inventory.yaml"
    )]
    inventory_file: PathBuf,

    #[arg(
        short = 'c',
        long,
        env = "NETCOLLECTOR_CONFIG_FILE",
        default_value = "netcollector.yaml"
    )]
    config_file: PathBuf,

    /// Overrides `commands_file` from the config file
    #[arg(long)]
    commands_file: Option<PathBuf>,

    /// Overrides `batch_size` from the config file
    #[arg(long)]
    batch_size: Option<usize>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(&cli.config_file)
        .await
        .with_context(|| format!("unable to load settings from {}", cli.config_file.display()))?;

    let mut logger = env_logger::Builder::new();
    logger
        .parse_filters(&settings.log_filters())
        .parse_default_env();
    if let Some(log_file) = settings.log_file() {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .with_context(|| format!("unable to open log file {}", log_file.display()))?;
        logger.target(env_logger::Target::Pipe(Box::new(file)));
    } else if settings.log_to_stdout() {
        logger.target(env_logger::Target::Stdout);
    }
    logger.init();

    info!("Hello, netcollector!");

    let defaults = CredentialDefaults {
        username: cli.user,
        password: cli.password,
        private_key: cli.private_key,
        private_key_passphrase: cli.private_key_passphrase,
    };
    let inventory = load_inventory(&cli.inventory_file, &defaults)
        .await
        .context("unable to load inventory")?;
    if inventory.devices.is_empty() {
        bail!("no devices in inventory {}", cli.inventory_file.display());
    }

    let commands_file = cli.commands_file.unwrap_or_else(|| settings.commands_file.clone());
    let catalog = load_catalog(&commands_file)
        .await
        .context("unable to load command catalog")?;

    let batch_size = match cli.batch_size {
        Some(size) => NonZeroUsize::new(size).context("--batch-size must be at least 1")?,
        None => settings
            .batch_size()
            .context("batch_size must be at least 1")?,
    };

    let runner = SessionRunner::new(
        Arc::new(catalog),
        Arc::new(CliConnector::new(
            settings.connect_timeout(),
            settings.command_timeout(),
        )),
        Arc::new(TextFsmParser::new(&settings.templates_path)),
    );
    let writer = ArtifactWriter::new(Arc::new(FileSink::new(&settings.artifacts_path)));
    let scheduler = BatchScheduler::new(runner, writer, Arc::new(ConsoleProgress), batch_size);

    info!(
        "collecting {} device(s) in batches of {}",
        inventory.devices.len(),
        batch_size
    );

    let started = Instant::now();
    let results = scheduler.collect(&inventory.devices).await;
    let counts = count_by_status(&results);

    info!(
        "collection finished: {} device(s) in {:.1}s, artifacts in {}",
        results.len(),
        started.elapsed().as_secs_f64(),
        settings.artifacts_path.display()
    );
    for (status, count) in &counts {
        info!("  {}: {}", status, count);
    }

    let failed = counts.get(&CollectionStatus::Failed).copied().unwrap_or(0);
    if failed > 0 {
        warn!("{} device(s) could not be collected", failed);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_rejects_password_and_private_key() {
        let err = Cli::try_parse_from(["netcollector", "-p", "secret", "--private-key", "/keys/id"])
            .err()
            .unwrap();

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_private_key_with_passphrase() {
        let cli = Cli::try_parse_from([
            "netcollector",
            "-u",
            "admin",
            "--private-key",
            "/keys/id",
            "--private-key-passphrase",
            "unlock",
        ])
        .unwrap();

        assert_eq!(cli.private_key, Some(PathBuf::from("/keys/id")));
        assert_eq!(cli.private_key_passphrase.as_deref(), Some("unlock"));
        assert_eq!(cli.password, None);
    }
}

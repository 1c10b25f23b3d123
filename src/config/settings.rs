use super::{read_yaml, ConfigErrors};
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
const DEFAULT_SESSION_LOG_LEVEL: &str = "warn";
const SESSION_LOG_TARGET: &str = "russh";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub artifacts_path: PathBuf,
    #[serde(alias = "max_concurrent_tasks")]
    pub batch_size: usize,
    pub connect_timeout_secs: f64,
    pub command_timeout_secs: f64,
    /// One timeout for both session establishment and commands, overriding
    /// the two specific ones.
    #[serde(alias = "scrapli_timeout")]
    pub timeout_secs: Option<f64>,
    pub templates_path: PathBuf,
    pub commands_file: PathBuf,
    /// `env_logger` filter directives.
    pub log_level: String,
    pub logging: LoggingSettings,
    // accepted for compatibility with older configuration files, data
    // normalization is not performed
    pub interface_keys: Option<serde_yaml::Value>,
    pub interface_list_keys: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Application logger, its level wins over `log_level`.
    pub main: LoggerSettings,
    /// SSH library logger.
    #[serde(alias = "scrapli")]
    pub session: LoggerSettings,
    pub pandas: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerSettings {
    pub level: Option<String>,
    pub logfile: Option<PathBuf>,
    pub stdout: Option<bool>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            artifacts_path: PathBuf::from(".artifacts"),
            batch_size: DEFAULT_BATCH_SIZE,
            connect_timeout_secs: DEFAULT_TIMEOUT_SECS,
            command_timeout_secs: DEFAULT_TIMEOUT_SECS,
            timeout_secs: None,
            templates_path: PathBuf::from("templates"),
            commands_file: PathBuf::from("commands.yaml"),
            log_level: "info".to_owned(),
            logging: LoggingSettings::default(),
            interface_keys: None,
            interface_list_keys: None,
        }
    }
}

impl Settings {
    pub fn batch_size(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.batch_size)
    }

    pub fn connect_timeout(&self) -> Duration {
        timeout(self.timeout_secs.unwrap_or(self.connect_timeout_secs))
    }

    pub fn command_timeout(&self) -> Duration {
        timeout(self.timeout_secs.unwrap_or(self.command_timeout_secs))
    }

    /// Filter directives for `env_logger`, `RUST_LOG` is applied on top.
    pub fn log_filters(&self) -> String {
        let main = match self.logging.main.level.as_deref().and_then(level_directive) {
            Some(level) => level.to_owned(),
            None => self.log_level.clone(),
        };
        let session = self
            .logging
            .session
            .level
            .as_deref()
            .and_then(level_directive)
            .unwrap_or(DEFAULT_SESSION_LOG_LEVEL);

        format!("{},{}={}", main, SESSION_LOG_TARGET, session)
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.logging.main.logfile.as_deref()
    }

    pub fn log_to_stdout(&self) -> bool {
        self.logging.main.stdout.unwrap_or(false)
    }
}

fn timeout(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS))
}

fn valid_timeout(secs: f64) -> bool {
    secs > 0.0 && Duration::try_from_secs_f64(secs).is_ok()
}

/// Maps python-style level names (`WARNING`, `CRITICAL`, ...) onto `log`
/// level filters.
fn level_directive(level: &str) -> Option<&'static str> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" => Some("error"),
        "off" => Some("off"),
        _ => None,
    }
}

pub async fn load_settings(path: &Path) -> Result<Settings, ConfigErrors> {
    let settings = read_yaml::<Settings>(path).await?.unwrap_or_default();

    if settings.batch_size().is_none() {
        return Err(ConfigErrors::invalid(path, "batch_size must be at least 1"));
    }
    let timeouts = [
        Some(settings.connect_timeout_secs),
        Some(settings.command_timeout_secs),
        settings.timeout_secs,
    ];
    if !timeouts.into_iter().flatten().all(valid_timeout) {
        return Err(ConfigErrors::invalid(path, "timeouts must be positive numbers of seconds"));
    }
    for level in [&settings.logging.main.level, &settings.logging.session.level]
        .into_iter()
        .flatten()
    {
        if level_directive(level).is_none() {
            return Err(ConfigErrors::invalid(path, format!("unknown log level {}", level)));
        }
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn load(content: &str) -> Result<Settings, ConfigErrors> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netcollector.yaml");
        std::fs::write(&path, content).unwrap();

        load_settings(&path).await
    }

    #[tokio::test]
    async fn test_missing_settings_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();

        let settings = load_settings(&dir.path().join("netcollector.yaml"))
            .await
            .unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.batch_size().unwrap().get(), 10);
        assert_eq!(settings.log_filters(), "info,russh=warn");
        assert_eq!(settings.log_file(), None);
    }

    #[tokio::test]
    async fn test_settings_partial_override() {
        let settings = load("max_concurrent_tasks: 4\nartifacts_path: /tmp/out\ncommand_timeout_secs: 5\n")
            .await
            .unwrap();

        assert_eq!(settings.batch_size, 4);
        assert_eq!(settings.artifacts_path, PathBuf::from("/tmp/out"));
        assert_eq!(settings.command_timeout(), Duration::from_secs(5));
        assert_eq!(settings.connect_timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_settings_accepts_legacy_keys() {
        let settings = load(
            r#"
max_concurrent_tasks: 20
scrapli_timeout: 12.5
logging:
  main:
    level: DEBUG
    logfile: /tmp/netcollector.log
    stdout: true
  scrapli:
    level: WARNING
  pandas:
    level: WARNING
interface_keys:
  - interface
interface_list_keys:
  - member_interfaces
"#,
        )
        .await
        .unwrap();

        assert_eq!(settings.batch_size, 20);
        assert_eq!(settings.connect_timeout(), Duration::from_millis(12_500));
        assert_eq!(settings.command_timeout(), Duration::from_millis(12_500));
        assert_eq!(settings.log_filters(), "debug,russh=warn");
        assert_eq!(settings.log_file(), Some(Path::new("/tmp/netcollector.log")));
        assert!(settings.log_to_stdout());
    }

    #[tokio::test]
    async fn test_settings_log_level_directives() {
        let settings = load("log_level: info,netcollector=debug\nlogging:\n  session:\n    level: CRITICAL\n")
            .await
            .unwrap();

        assert_eq!(settings.log_filters(), "info,netcollector=debug,russh=error");
    }

    #[tokio::test]
    async fn test_settings_invalid_values_rejected() {
        let cases = vec![
            "batch_size: 0\n",
            "scrapli_timeout: 0\n",
            "connect_timeout_secs: -1\n",
            "logging:\n  main:\n    level: LOUD\n",
        ];

        for content in cases {
            let err = load(content).await.err();
            assert!(
                matches!(err, Some(ConfigErrors::ValidationError { .. })),
                "settings should be rejected: {:?}",
                content
            );
        }
    }

    #[tokio::test]
    async fn test_settings_unknown_key_rejected() {
        for content in ["batchsize: 3\n", "logging:\n  main:\n    colour: true\n"] {
            let err = load(content).await.err();

            assert!(matches!(err, Some(ConfigErrors::YamlError { .. })), "{:?}", content);
        }
    }
}

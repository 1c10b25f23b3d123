use super::catalog::{CommandCatalog, CommandSpec};
use super::results::{CommandResult, CommandResults, DeviceResult, ParseOutcome};
use crate::config::Device;
use crate::parser::OutputParser;
use crate::session::{Connector, Session, SessionErrors};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;

/// Collects one device: one session, every configured command in catalog
/// order. Failures never escape `run`, they end up in the `DeviceResult`.
#[derive(Clone)]
pub struct SessionRunner {
    catalog: Arc<CommandCatalog>,
    connector: Arc<dyn Connector>,
    parser: Arc<dyn OutputParser>,
}

impl SessionRunner {
    pub fn new(
        catalog: Arc<CommandCatalog>,
        connector: Arc<dyn Connector>,
        parser: Arc<dyn OutputParser>,
    ) -> SessionRunner {
        SessionRunner {
            catalog,
            connector,
            parser,
        }
    }

    pub async fn run(&self, device: &Device) -> DeviceResult {
        let specs = self.catalog.resolve(&device.platform);
        if specs.is_empty() {
            warn!(
                "{} ({}): no commands defined for this platform, skipping device",
                device.hostname, device.platform
            );
            return DeviceResult::no_commands(device);
        }

        let started = Instant::now();
        let mut session = match self.connector.open(device).await {
            Ok(session) => session,
            Err(err) => {
                error!("{} ({}): {}", device.hostname, device.platform, err);
                return DeviceResult::failed(device, err.to_string(), CommandResults::new());
            }
        };
        let connection_time = started.elapsed();
        debug!(
            "{} ({}): connected in {:.1}s",
            device.hostname,
            device.platform,
            connection_time.as_secs_f64()
        );

        let mut commands = CommandResults::new();
        let outcome = self
            .run_commands(session.as_mut(), device, &specs, &mut commands)
            .await;
        session.close().await;

        let total_time = started.elapsed();
        info!(
            "{} ({}): ConnectionTime: {:.1}s, CommandsTime: {:.1}s, TotalTime: {:.1}s, Commands: {}",
            device.hostname,
            device.platform,
            connection_time.as_secs_f64(),
            (total_time - connection_time).as_secs_f64(),
            total_time.as_secs_f64(),
            commands.len()
        );

        match outcome {
            Ok(()) => DeviceResult::collected(device, commands),
            Err(err) => {
                error!(
                    "{} ({}): session lost after {} command(s): {}",
                    device.hostname,
                    device.platform,
                    commands.len(),
                    err
                );
                DeviceResult::failed(device, err.to_string(), commands)
            }
        }
    }

    /// Issues the commands one at a time. A failing command is recorded and
    /// the loop moves on; only a lost session stops it early.
    async fn run_commands(
        &self,
        session: &mut dyn Session,
        device: &Device,
        specs: &[&CommandSpec],
        commands: &mut CommandResults,
    ) -> Result<(), SessionErrors> {
        for spec in specs {
            let Some(command) = spec.command.as_deref() else {
                warn!(
                    "{} ({}): skipping command `{}`, no command string provided",
                    device.hostname, device.platform, spec.name
                );
                commands.insert(spec.name.clone(), CommandResult::misconfigured(&spec.name));
                continue;
            };

            debug!("{}: sending `{}`", device.hostname, command);
            let started = Instant::now();
            let result = match session.send_command(command).await {
                Ok(response) if !response.failed => {
                    let parse = self.parse(device, spec, &response.output).await;
                    CommandResult::completed(command, response.output, response.elapsed, parse)
                }
                Ok(response) => {
                    let error = response
                        .error
                        .unwrap_or_else(|| "command reported a failure".to_owned());
                    CommandResult::execution_failed(command, error, response.elapsed)
                }
                Err(SessionErrors::Disconnected(host)) => {
                    let err = SessionErrors::Disconnected(host);
                    commands.insert(
                        spec.name.clone(),
                        CommandResult::execution_failed(command, err.to_string(), started.elapsed()),
                    );
                    return Err(err);
                }
                Err(err) => CommandResult::execution_failed(command, err.to_string(), started.elapsed()),
            };

            if let Some(error) = result.error() {
                error!(
                    "{} ({}): command `{}` failed after {:.1}s: {}",
                    device.hostname,
                    device.platform,
                    spec.name,
                    result.elapsed.as_secs_f64(),
                    error
                );
            }
            commands.insert(spec.name.clone(), result);
        }

        Ok(())
    }

    async fn parse(&self, device: &Device, spec: &CommandSpec, output: &str) -> Option<ParseOutcome> {
        let template = spec.parser_template.as_deref()?;
        if output.trim().is_empty() {
            return None;
        }

        match self.parser.parse(template, output).await {
            Ok(records) => {
                debug!(
                    "{}: command `{}` parsed with {}, {} record(s)",
                    device.hostname,
                    spec.name,
                    template,
                    records.len()
                );
                Some(ParseOutcome::Parsed(records))
            }
            Err(err) => {
                warn!(
                    "{} ({}): unable to parse `{}` output: {}",
                    device.hostname, device.platform, spec.name, err
                );
                Some(ParseOutcome::Failed(err.to_string()))
            }
        }
    }
}

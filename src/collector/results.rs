use super::classifier::classify;
use crate::config::Device;
use crate::parser::Record;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Success,
    PartialSuccess,
    AllCommandsFailedExecution,
    NoCommandsForPlatform,
    Failed,
}

impl CollectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionStatus::Success => "success",
            CollectionStatus::PartialSuccess => "partial_success",
            CollectionStatus::AllCommandsFailedExecution => "all_commands_failed_execution",
            CollectionStatus::NoCommandsForPlatform => "no_commands_for_platform",
            CollectionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(Vec<Record>),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Completed {
        output: String,
        parse: Option<ParseOutcome>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    /// The command text sent to the device, `None` if it was never issued.
    pub command: Option<String>,
    pub elapsed: Duration,
    pub outcome: CommandOutcome,
}

pub type CommandResults = IndexMap<String, CommandResult>;

impl CommandResult {
    pub fn completed(
        command: &str,
        output: String,
        elapsed: Duration,
        parse: Option<ParseOutcome>,
    ) -> CommandResult {
        CommandResult {
            command: Some(command.to_owned()),
            elapsed,
            outcome: CommandOutcome::Completed { output, parse },
        }
    }

    pub fn execution_failed(command: &str, error: String, elapsed: Duration) -> CommandResult {
        CommandResult {
            command: Some(command.to_owned()),
            elapsed,
            outcome: CommandOutcome::Failed { error },
        }
    }

    pub fn misconfigured(name: &str) -> CommandResult {
        CommandResult {
            command: None,
            elapsed: Duration::ZERO,
            outcome: CommandOutcome::Failed {
                error: format!("configuration error: command `{}` has no command text", name),
            },
        }
    }

    pub fn failed(&self) -> bool {
        matches!(self.outcome, CommandOutcome::Failed { .. })
    }

    pub fn output(&self) -> Option<&str> {
        match &self.outcome {
            CommandOutcome::Completed { output, .. } => Some(output),
            CommandOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            CommandOutcome::Failed { error } => Some(error),
            CommandOutcome::Completed { .. } => None,
        }
    }

    pub fn parsed_output(&self) -> Option<&[Record]> {
        match &self.outcome {
            CommandOutcome::Completed {
                parse: Some(ParseOutcome::Parsed(records)),
                ..
            } => Some(records),
            _ => None,
        }
    }

    pub fn parse_error(&self) -> Option<&str> {
        match &self.outcome {
            CommandOutcome::Completed {
                parse: Some(ParseOutcome::Failed(error)),
                ..
            } => Some(error),
            _ => None,
        }
    }

    /// Raw output for completed commands, the error text otherwise.
    pub fn raw_text(&self) -> &str {
        match &self.outcome {
            CommandOutcome::Completed { output, .. } => output,
            CommandOutcome::Failed { error } => error,
        }
    }

    pub fn to_record(&self) -> Value {
        json!({
            "command": self.command,
            "output": self.output().unwrap_or_default(),
            "failed": self.failed(),
            "elapsed_time": elapsed_secs(self.elapsed),
            "parsed_output": self.parsed_output(),
            "parse_error": self.parse_error(),
            "error": self.error(),
        })
    }
}

fn elapsed_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceResult {
    pub hostname: String,
    pub platform: String,
    pub host: String,
    pub status: CollectionStatus,
    pub commands: CommandResults,
    pub error: Option<String>,
}

impl DeviceResult {
    pub fn collected(device: &Device, commands: CommandResults) -> DeviceResult {
        DeviceResult::new(device, classify(true, &commands), commands, None)
    }

    pub fn no_commands(device: &Device) -> DeviceResult {
        let commands = CommandResults::new();
        DeviceResult::new(device, classify(false, &commands), commands, None)
    }

    pub fn failed(device: &Device, error: String, commands: CommandResults) -> DeviceResult {
        DeviceResult::new(device, CollectionStatus::Failed, commands, Some(error))
    }

    fn new(
        device: &Device,
        status: CollectionStatus,
        commands: CommandResults,
        error: Option<String>,
    ) -> DeviceResult {
        DeviceResult {
            hostname: device.hostname.clone(),
            platform: device.platform.clone(),
            host: device.host.clone(),
            status,
            commands,
            error,
        }
    }

    pub fn to_record(&self) -> Value {
        let commands: serde_json::Map<String, Value> = self
            .commands
            .iter()
            .map(|(name, result)| (name.clone(), result.to_record()))
            .collect();

        json!({
            "hostname": self.hostname,
            "platform": self.platform,
            "host": self.host,
            "status": self.status,
            "error": self.error,
            "commands": commands,
        })
    }
}

pub fn count_by_status(results: &[DeviceResult]) -> IndexMap<CollectionStatus, usize> {
    let mut counts = IndexMap::new();
    for result in results {
        *counts.entry(result.status).or_insert(0) += 1;
    }
    counts
}

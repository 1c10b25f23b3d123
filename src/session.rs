#[cfg(test)]
use mockall::automock;

mod channel;
mod driver;
mod platform;
mod ssh;
mod telnet;

pub(crate) use driver::CliConnector;

use crate::config::Device;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionErrors {
    #[error("unable to open session to {host}: {reason}")]
    OpenError { host: String, reason: String },
    #[error("command `{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("session to {0} was disconnected")]
    Disconnected(String),
    #[error("session io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// What the device answered to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub output: String,
    pub failed: bool,
    pub error: Option<String>,
    pub elapsed: Duration,
}

#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, device: &Device) -> Result<Box<dyn Session>, SessionErrors>;
}

/// An open CLI session. Commands are issued one at a time; `close` must be
/// called once the session is no longer needed.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Session: Send {
    async fn send_command(&mut self, command: &str) -> Result<CommandResponse, SessionErrors>;
    async fn close(&mut self);
}

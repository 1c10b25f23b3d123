use super::channel::{CliChannel, CliTransport};
use super::platform::PlatformProfile;
use super::ssh::SshTransport;
use super::telnet::{self, TelnetTransport};
use super::{CommandResponse, Connector, Session, SessionErrors};
use crate::config::{Device, Transport};
use log::{debug, warn};
use regex::Regex;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Opens interactive CLI sessions over SSH or telnet, driven by the platform
/// profile of each device.
pub struct CliConnector {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl CliConnector {
    pub fn new(connect_timeout: Duration, command_timeout: Duration) -> CliConnector {
        CliConnector {
            connect_timeout,
            command_timeout,
        }
    }

    async fn open_cli(
        &self,
        device: &Device,
        profile: &'static PlatformProfile,
        prompt: Regex,
    ) -> Result<Box<dyn Session>, SessionErrors> {
        match device.transport {
            Transport::Ssh => {
                let mut channel = CliChannel::new(&device.hostname, SshTransport::connect(device).await?);
                channel.read_until(&prompt).await?;
                self.establish(device, channel, profile, prompt).await
            }
            Transport::Telnet => {
                let mut channel =
                    CliChannel::new(&device.hostname, TelnetTransport::connect(device).await?);
                telnet::login(&mut channel, device, &prompt).await?;
                self.establish(device, channel, profile, prompt).await
            }
        }
    }

    async fn establish<T: CliTransport + 'static>(
        &self,
        device: &Device,
        channel: CliChannel<T>,
        profile: &'static PlatformProfile,
        prompt: Regex,
    ) -> Result<Box<dyn Session>, SessionErrors> {
        let mut session = CliSession::new(&device.hostname, channel, profile, prompt, self.command_timeout);
        session.on_open().await?;
        Ok(Box::new(session))
    }
}

#[async_trait::async_trait]
impl Connector for CliConnector {
    async fn open(&self, device: &Device) -> Result<Box<dyn Session>, SessionErrors> {
        let profile = match PlatformProfile::for_platform(&device.platform) {
            Some(profile) => profile,
            None => {
                warn!(
                    "{}: no profile for platform {}, using a generic prompt and no paging setup",
                    device.hostname, device.platform
                );
                PlatformProfile::generic()
            }
        };
        let prompt = profile.prompt().map_err(|err| SessionErrors::OpenError {
            host: device.host.clone(),
            reason: format!("invalid prompt pattern for {}: {}", profile.name, err),
        })?;

        match timeout(self.connect_timeout, self.open_cli(device, profile, prompt)).await {
            Ok(session) => session,
            Err(_) => Err(SessionErrors::OpenError {
                host: device.host.clone(),
                reason: format!("no prompt after {:?}", self.connect_timeout),
            }),
        }
    }
}

/// A logged in shell. Commands are written one at a time and their output is
/// everything the device prints until the prompt comes back.
pub(super) struct CliSession<T> {
    hostname: String,
    channel: CliChannel<T>,
    profile: &'static PlatformProfile,
    prompt: Regex,
    command_timeout: Duration,
    /// A command timed out: its output may still arrive before the next
    /// prompt.
    out_of_sync: bool,
}

impl<T: CliTransport> CliSession<T> {
    pub fn new(
        hostname: &str,
        channel: CliChannel<T>,
        profile: &'static PlatformProfile,
        prompt: Regex,
        command_timeout: Duration,
    ) -> CliSession<T> {
        CliSession {
            hostname: hostname.to_owned(),
            channel,
            profile,
            prompt,
            command_timeout,
            out_of_sync: false,
        }
    }

    pub async fn on_open(&mut self) -> Result<(), SessionErrors> {
        for command in self.profile.on_open {
            let response = self.run(command).await?;
            if response.failed {
                warn!("{}: `{}` was rejected by the device", self.hostname, command);
            }
        }

        Ok(())
    }

    async fn run(&mut self, command: &str) -> Result<CommandResponse, SessionErrors> {
        if self.out_of_sync {
            self.resync(command).await?;
        }

        let started = Instant::now();
        self.channel.send_line(command).await?;
        let text = match timeout(self.command_timeout, self.read_response(command)).await {
            Ok(text) => text?,
            Err(_) => {
                self.out_of_sync = true;
                return Err(SessionErrors::Timeout {
                    command: command.to_owned(),
                    timeout: self.command_timeout,
                });
            }
        };
        let elapsed = started.elapsed();

        let output = command_output(&text, &self.prompt, command);
        let failure = self.profile.failure(&output);

        Ok(CommandResponse {
            failed: failure.is_some(),
            error: failure.map(|marker| format!("device rejected the command: {}", marker)),
            output,
            elapsed,
        })
    }

    /// Reads prompt to prompt until the echo of `command` went by, prompts
    /// left over from a resync come before it.
    async fn read_response(&mut self, command: &str) -> Result<String, SessionErrors> {
        let echo = command.trim();
        let mut text = String::new();
        loop {
            text.push_str(&self.channel.read_until(&self.prompt).await?);
            if echo.is_empty() || text.contains(echo) {
                return Ok(text);
            }
        }
    }

    /// Discards what is left of a timed out command by asking for a fresh
    /// prompt.
    async fn resync(&mut self, command: &str) -> Result<(), SessionErrors> {
        debug!("{}: waiting for the prompt before `{}`", self.hostname, command);

        self.channel.send_line("").await?;
        match timeout(self.command_timeout, self.channel.read_until(&self.prompt)).await {
            Ok(text) => {
                text?;
                self.out_of_sync = false;
                Ok(())
            }
            Err(_) => Err(SessionErrors::Timeout {
                command: command.to_owned(),
                timeout: self.command_timeout,
            }),
        }
    }
}

/// Cuts the command echo and the trailing prompt out of what the device
/// printed.
fn command_output(text: &str, prompt: &Regex, command: &str) -> String {
    let body = match prompt.find(text) {
        Some(found) => &text[..found.start()],
        None => text,
    };

    let command = command.trim();
    let body = match body.find(command) {
        Some(start) if !command.is_empty() => match body[start..].find('\n') {
            Some(end) => &body[start + end + 1..],
            None => "",
        },
        _ => body,
    };

    body.trim_end_matches('\n').to_owned()
}

#[async_trait::async_trait]
impl<T: CliTransport> Session for CliSession<T> {
    async fn send_command(&mut self, command: &str) -> Result<CommandResponse, SessionErrors> {
        self.run(command).await
    }

    async fn close(&mut self) {
        for command in self.profile.on_close {
            if let Err(err) = self.channel.send_line(command).await {
                debug!("{}: unable to send `{}`: {}", self.hostname, command, err);
                break;
            }
        }
        self.channel.shutdown().await;
    }
}

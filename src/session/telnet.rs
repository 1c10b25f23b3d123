use super::channel::{CliChannel, CliTransport};
use super::SessionErrors;
use crate::config::Device;
use log::debug;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const TELNET_PORT: u16 = 23;
const READ_BUFFER_SIZE: usize = 4096;

const USERNAME_PROMPT: &str = r"(?im)^.*(username|login)\s*:\s*\z";
const PASSWORD_PROMPT: &str = r"(?im)^.*password\s*:\s*\z";

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;
const ECHO: u8 = 1;
const SUPPRESS_GO_AHEAD: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FilterState {
    #[default]
    Data,
    Command,
    Negotiation(u8),
    Subnegotiation,
    SubnegotiationCommand,
}

/// Separates user data from telnet commands. Option requests are refused,
/// except for the server echoing and suppressing go-ahead.
#[derive(Debug, Default)]
struct TelnetFilter {
    state: FilterState,
}

impl TelnetFilter {
    /// Returns the data bytes of `input` and the replies owed to the server.
    fn feed(&mut self, input: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut data = Vec::with_capacity(input.len());
        let mut replies = Vec::new();

        for &byte in input {
            self.state = match (self.state, byte) {
                (FilterState::Data, IAC) => FilterState::Command,
                (FilterState::Data, 0) => FilterState::Data,
                (FilterState::Data, byte) => {
                    data.push(byte);
                    FilterState::Data
                }
                (FilterState::Command, IAC) => {
                    data.push(IAC);
                    FilterState::Data
                }
                (FilterState::Command, DO | DONT | WILL | WONT) => FilterState::Negotiation(byte),
                (FilterState::Command, SB) => FilterState::Subnegotiation,
                (FilterState::Command, _) => FilterState::Data,
                (FilterState::Negotiation(verb), option) => {
                    match verb {
                        DO => replies.extend([IAC, WONT, option]),
                        WILL if option == ECHO || option == SUPPRESS_GO_AHEAD => {
                            replies.extend([IAC, DO, option])
                        }
                        WILL => replies.extend([IAC, DONT, option]),
                        _ => {}
                    }
                    FilterState::Data
                }
                (FilterState::Subnegotiation, IAC) => FilterState::SubnegotiationCommand,
                (FilterState::Subnegotiation, _) => FilterState::Subnegotiation,
                (FilterState::SubnegotiationCommand, SE) => FilterState::Data,
                (FilterState::SubnegotiationCommand, _) => FilterState::Subnegotiation,
            };
        }

        (data, replies)
    }
}

pub(super) struct TelnetTransport {
    hostname: String,
    stream: TcpStream,
    filter: TelnetFilter,
    buffer: Vec<u8>,
}

impl TelnetTransport {
    pub async fn connect(device: &Device) -> Result<TelnetTransport, SessionErrors> {
        let port = device.port.unwrap_or(TELNET_PORT);
        let stream = TcpStream::connect((device.host.as_str(), port))
            .await
            .map_err(|err| SessionErrors::OpenError {
                host: device.host.clone(),
                reason: err.to_string(),
            })?;
        stream.set_nodelay(true)?;

        debug!("{}: telnet connection open on port {}", device.hostname, port);

        Ok(TelnetTransport {
            hostname: device.hostname.clone(),
            stream,
            filter: TelnetFilter::default(),
            buffer: vec![0; READ_BUFFER_SIZE],
        })
    }
}

#[async_trait::async_trait]
impl CliTransport for TelnetTransport {
    async fn send(&mut self, data: &[u8]) -> Result<(), SessionErrors> {
        self.stream.write_all(data).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<Vec<u8>>, SessionErrors> {
        loop {
            let read = self.stream.read(&mut self.buffer).await?;
            if read == 0 {
                return Ok(None);
            }

            let (data, replies) = self.filter.feed(&self.buffer[..read]);
            if !replies.is_empty() {
                self.stream.write_all(&replies).await?;
            }
            if !data.is_empty() {
                return Ok(Some(data));
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Err(err) = self.stream.shutdown().await {
            debug!("{}: telnet shutdown failed: {}", self.hostname, err);
        }
    }
}

fn login_error(device: &Device, reason: impl Into<String>) -> SessionErrors {
    SessionErrors::OpenError {
        host: device.host.clone(),
        reason: reason.into(),
    }
}

/// Answers the username and password prompts, then waits for `prompt`.
/// Devices that only ask for a password are handled too.
pub(super) async fn login<T: CliTransport>(
    channel: &mut CliChannel<T>,
    device: &Device,
    prompt: &Regex,
) -> Result<(), SessionErrors> {
    let credentials = &device.credentials;
    let (Some(username), Some(password)) = (&credentials.username, &credentials.password) else {
        return Err(login_error(device, "telnet needs a username and a password"));
    };

    let pattern = |pattern: &str| {
        Regex::new(pattern).map_err(|err| login_error(device, format!("invalid login pattern: {}", err)))
    };
    let username_prompt = pattern(USERNAME_PROMPT)?;
    let password_prompt = pattern(PASSWORD_PROMPT)?;
    let credentials_prompt = pattern(&format!("(?:{})|(?:{})", USERNAME_PROMPT, PASSWORD_PROMPT))?;
    let after_login = pattern(&format!("(?:{})|(?:{})", prompt.as_str(), USERNAME_PROMPT))?;

    let asked = channel.read_until(&credentials_prompt).await?;
    if username_prompt.is_match(&asked) {
        channel.send_line(username).await?;
        channel.read_until(&password_prompt).await?;
    }
    channel.send_line(password).await?;

    let answer = channel.read_until(&after_login).await?;
    if !prompt.is_match(&answer) {
        return Err(login_error(device, "authentication failed"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_passes_plain_data() {
        let mut filter = TelnetFilter::default();

        let (data, replies) = filter.feed(b"leaf-01#\r\0");

        assert_eq!(data, b"leaf-01#\r");
        assert!(replies.is_empty());
    }

    #[test]
    fn test_filter_answers_negotiation() {
        let mut filter = TelnetFilter::default();

        let (data, replies) = filter.feed(&[
            IAC, WILL, ECHO, IAC, WILL, SUPPRESS_GO_AHEAD, IAC, DO, 24, IAC, WILL, 31, IAC, DONT, 1,
            b'o', b'k',
        ]);

        assert_eq!(data, b"ok");
        assert_eq!(
            replies,
            vec![IAC, DO, ECHO, IAC, DO, SUPPRESS_GO_AHEAD, IAC, WONT, 24, IAC, DONT, 31]
        );
    }

    #[test]
    fn test_filter_skips_subnegotiation_across_chunks() {
        let mut filter = TelnetFilter::default();

        let (first, _) = filter.feed(&[b'a', IAC, SB, 24, 1]);
        let (second, _) = filter.feed(&[IAC, SE, b'b', IAC, IAC]);

        assert_eq!(first, b"a");
        assert_eq!(second, vec![b'b', IAC]);
    }

    #[test]
    fn test_filter_negotiation_split_across_chunks() {
        let mut filter = TelnetFilter::default();

        let (_, first) = filter.feed(&[IAC]);
        let (_, second) = filter.feed(&[DO]);
        let (_, third) = filter.feed(&[ECHO]);

        assert!(first.is_empty());
        assert!(second.is_empty());
        assert_eq!(third, vec![IAC, WONT, ECHO]);
    }
}

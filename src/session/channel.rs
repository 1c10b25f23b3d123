use super::SessionErrors;
use regex::Regex;

const ESC: u8 = 0x1b;

/// Byte level access to an interactive shell on a device.
#[async_trait::async_trait]
pub trait CliTransport: Send {
    async fn send(&mut self, data: &[u8]) -> Result<(), SessionErrors>;
    /// Next chunk sent by the device, `None` once it hung up.
    async fn receive(&mut self) -> Result<Option<Vec<u8>>, SessionErrors>;
    async fn shutdown(&mut self);
}

/// Buffers what the device prints so that it can be consumed up to a
/// pattern, usually the prompt. Carriage returns, NULs and ANSI escape
/// sequences are dropped on the way in.
pub struct CliChannel<T> {
    host: String,
    transport: T,
    pending: Vec<u8>,
    text: Vec<u8>,
}

impl<T: CliTransport> CliChannel<T> {
    pub fn new(host: &str, transport: T) -> CliChannel<T> {
        CliChannel {
            host: host.to_owned(),
            transport,
            pending: Vec::new(),
            text: Vec::new(),
        }
    }

    pub async fn send_line(&mut self, line: &str) -> Result<(), SessionErrors> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');

        self.transport.send(&data).await
    }

    /// Reads until `pattern` matches and returns everything up to the end of
    /// the match. Cancelling the returned future loses no data.
    pub async fn read_until(&mut self, pattern: &Regex) -> Result<String, SessionErrors> {
        loop {
            let found = {
                let text = String::from_utf8_lossy(&self.text);
                let split = pattern.find(&text).map(|found| {
                    (
                        text[..found.end()].to_owned(),
                        text[found.end()..].as_bytes().to_vec(),
                    )
                });
                split
            };
            if let Some((consumed, rest)) = found {
                self.text = rest;
                return Ok(consumed);
            }

            match self.transport.receive().await? {
                Some(chunk) => {
                    self.pending.extend_from_slice(&chunk);
                    let used = clean_into(&self.pending, &mut self.text);
                    self.pending.drain(..used);
                }
                None => return Err(SessionErrors::Disconnected(self.host.clone())),
            }
        }
    }

    pub async fn shutdown(&mut self) {
        self.transport.shutdown().await
    }
}

/// Moves `raw` into `text` without carriage returns, NULs and ANSI CSI
/// sequences. Returns how many bytes were used: an escape sequence cut at the
/// end of `raw` stays there until the rest of it arrives.
fn clean_into(raw: &[u8], text: &mut Vec<u8>) -> usize {
    let mut index = 0;
    while index < raw.len() {
        match raw[index] {
            b'\r' | 0 => index += 1,
            ESC => match raw.get(index + 1) {
                None => return index,
                Some(b'[') => {
                    let end = raw[index + 2..]
                        .iter()
                        .position(|byte| (0x40..=0x7e).contains(byte));
                    match end {
                        Some(end) => index += end + 3,
                        None => return index,
                    }
                }
                Some(_) => index += 2,
            },
            byte => {
                text.push(byte);
                index += 1;
            }
        }
    }

    index
}

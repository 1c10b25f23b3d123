use super::channel::CliTransport;
use super::SessionErrors;
use crate::config::Device;
use log::{debug, warn};
use russh::client::{self, Handle};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use std::sync::Arc;

const SSH_PORT: u16 = 22;
const TERMINAL_TYPE: &str = "xterm";
const TERMINAL_WIDTH: u32 = 511;
const TERMINAL_HEIGHT: u32 = 24;

/// Accepts any host key unless strict checking is enabled for the device,
/// then the key must be listed in the user's known_hosts.
pub(super) struct HostKeyPolicy {
    host: String,
    port: u16,
    strict: bool,
}

#[async_trait::async_trait]
impl client::Handler for HostKeyPolicy {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        if !self.strict {
            return Ok(true);
        }

        match russh_keys::check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(true) => Ok(true),
            Ok(false) => {
                warn!("{}: host key is not in known_hosts", self.host);
                Ok(false)
            }
            Err(err) => {
                warn!("{}: host key verification failed: {}", self.host, err);
                Ok(false)
            }
        }
    }
}

/// An interactive shell on a pty, opened over a single SSH connection.
pub(super) struct SshTransport {
    hostname: String,
    handle: Handle<HostKeyPolicy>,
    channel: Channel<client::Msg>,
}

impl SshTransport {
    pub async fn connect(device: &Device) -> Result<SshTransport, SessionErrors> {
        let port = device.port.unwrap_or(SSH_PORT);
        let policy = HostKeyPolicy {
            host: device.host.clone(),
            port,
            strict: device.credentials.strict_host_key,
        };

        let mut handle = client::connect(
            Arc::new(client::Config::default()),
            (device.host.as_str(), port),
            policy,
        )
        .await
        .map_err(|err| open_error(device, err.to_string()))?;

        authenticate(&mut handle, device).await?;

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|err| open_error(device, format!("unable to open channel: {}", err)))?;
        channel
            .request_pty(false, TERMINAL_TYPE, TERMINAL_WIDTH, TERMINAL_HEIGHT, 0, 0, &[])
            .await
            .map_err(|err| open_error(device, format!("pty request failed: {}", err)))?;
        channel
            .request_shell(false)
            .await
            .map_err(|err| open_error(device, format!("shell request failed: {}", err)))?;

        debug!("{}: ssh shell open on port {}", device.hostname, port);

        Ok(SshTransport {
            hostname: device.hostname.clone(),
            handle,
            channel,
        })
    }
}

fn open_error(device: &Device, reason: impl Into<String>) -> SessionErrors {
    SessionErrors::OpenError {
        host: device.host.clone(),
        reason: reason.into(),
    }
}

async fn authenticate(handle: &mut Handle<HostKeyPolicy>, device: &Device) -> Result<(), SessionErrors> {
    let credentials = &device.credentials;
    let username = credentials
        .username
        .clone()
        .ok_or_else(|| open_error(device, "no username configured"))?;

    let accepted = match (&credentials.private_key, &credentials.password) {
        (Some(path), _) => {
            let encoded = tokio::fs::read_to_string(path).await.map_err(|err| {
                open_error(device, format!("unable to read private key {}: {}", path.display(), err))
            })?;
            let key = russh_keys::decode_secret_key(&encoded, credentials.private_key_passphrase.as_deref())
                .map_err(|err| {
                    open_error(device, format!("unable to decode private key {}: {}", path.display(), err))
                })?;

            handle.authenticate_publickey(username, Arc::new(key)).await
        }
        (None, Some(password)) => handle.authenticate_password(username, password.as_str()).await,
        (None, None) => return Err(open_error(device, "no password or private key configured")),
    }
    .map_err(|err| open_error(device, err.to_string()))?;

    if !accepted {
        return Err(open_error(device, "authentication failed"));
    }

    Ok(())
}

#[async_trait::async_trait]
impl CliTransport for SshTransport {
    async fn send(&mut self, data: &[u8]) -> Result<(), SessionErrors> {
        self.channel
            .data(data)
            .await
            .map_err(|_| SessionErrors::Disconnected(self.hostname.clone()))
    }

    async fn receive(&mut self) -> Result<Option<Vec<u8>>, SessionErrors> {
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                    return Ok(Some(data.to_vec()))
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return Ok(None),
                Some(_) => {}
            }
        }
    }

    async fn shutdown(&mut self) {
        let _ = self.channel.eof().await;
        if let Err(err) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!("{}: ssh disconnect failed: {}", self.hostname, err);
        }
    }
}

use super::{read_yaml, ConfigErrors};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

const REDACTED: &str = "********";

#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub private_key: Option<PathBuf>,
    pub private_key_passphrase: Option<String>,
    pub strict_host_key: bool,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("private_key", &self.private_key)
            .field(
                "private_key_passphrase",
                &self.private_key_passphrase.as_ref().map(|_| REDACTED),
            )
            .field("strict_host_key", &self.strict_host_key)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    #[serde(alias = "asyncssh")]
    Ssh,
    #[serde(alias = "asynctelnet")]
    Telnet,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "DeviceEntry")]
pub struct Device {
    pub hostname: String,
    pub host: String,
    pub port: Option<u16>,
    pub platform: String,
    pub transport: Transport,
    pub credentials: Credentials,
}

/// Inventory representation of a device, unknown keys are rejected.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceEntry {
    hostname: String,
    host: String,
    #[serde(default)]
    port: Option<u16>,
    platform: String,
    #[serde(default)]
    transport: Transport,
    #[serde(default)]
    auth_username: Option<String>,
    #[serde(default)]
    auth_password: Option<String>,
    #[serde(default)]
    auth_private_key: Option<PathBuf>,
    #[serde(default)]
    auth_private_key_passphrase: Option<String>,
    #[serde(default)]
    auth_strict_key: bool,
}

impl From<DeviceEntry> for Device {
    fn from(entry: DeviceEntry) -> Device {
        Device {
            hostname: entry.hostname,
            host: entry.host,
            port: entry.port,
            platform: entry.platform,
            transport: entry.transport,
            credentials: Credentials {
                username: entry.auth_username,
                password: entry.auth_password,
                private_key: entry.auth_private_key,
                private_key_passphrase: entry.auth_private_key_passphrase,
                strict_host_key: entry.auth_strict_key,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Inventory {
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Credentials given on the command line, applied to every device that does
/// not carry its own.
#[derive(Clone, Default)]
pub struct CredentialDefaults {
    pub username: Option<String>,
    pub password: Option<String>,
    pub private_key: Option<PathBuf>,
    pub private_key_passphrase: Option<String>,
}

impl Device {
    fn apply_defaults(&mut self, defaults: &CredentialDefaults) {
        let credentials = &mut self.credentials;

        if credentials.username.is_none() {
            credentials.username = defaults.username.clone();
        }
        if credentials.password.is_none() && credentials.private_key.is_none() {
            credentials.password = defaults.password.clone();
            credentials.private_key = defaults.private_key.clone();
        }
        if credentials.private_key.is_some() && credentials.private_key_passphrase.is_none() {
            credentials.private_key_passphrase = defaults.private_key_passphrase.clone();
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.hostname.trim().is_empty() {
            return Err("device hostname cannot be empty".to_owned());
        }
        if self.host.trim().is_empty() {
            return Err(format!("device {} has an empty host", self.hostname));
        }
        if self.port == Some(0) {
            return Err(format!("device {} has an invalid port 0", self.hostname));
        }
        if self.platform.trim().is_empty() {
            return Err(format!("device {} has an empty platform", self.hostname));
        }

        let credentials = &self.credentials;
        if credentials.username.is_none() {
            return Err(format!("device {} has no auth_username", self.hostname));
        }
        match (&credentials.password, &credentials.private_key) {
            (None, None) => Err(format!(
                "device {} needs either auth_password or auth_private_key",
                self.hostname
            )),
            (Some(_), Some(_)) => Err(format!(
                "device {} must set auth_password or auth_private_key, not both",
                self.hostname
            )),
            (None, Some(_)) if self.transport == Transport::Telnet => Err(format!(
                "device {} uses telnet, which needs auth_password",
                self.hostname
            )),
            _ => Ok(()),
        }
    }
}

pub async fn load_inventory(
    path: &Path,
    defaults: &CredentialDefaults,
) -> Result<Inventory, ConfigErrors> {
    let mut inventory = match read_yaml::<Inventory>(path).await? {
        Some(inventory) => inventory,
        None => return Err(ConfigErrors::invalid(path, "inventory file is missing or empty")),
    };

    let mut seen_hostnames = HashSet::new();
    for device in inventory.devices.iter_mut() {
        device.apply_defaults(defaults);
        device
            .validate()
            .map_err(|reason| ConfigErrors::invalid(path, reason))?;

        if !seen_hostnames.insert(device.hostname.to_lowercase()) {
            return Err(ConfigErrors::invalid(
                path,
                format!(
                    "duplicate hostname {}, hostnames must be unique (case-insensitive)",
                    device.hostname
                ),
            ));
        }
    }

    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVENTORY: &str = r#"
devices:
  - hostname: leaf-01
    host: 10.0.0.1
    platform: cisco_nxos
  - hostname: spine-01
    host: 10.0.0.2
    port: 2222
    platform: arista_eos
    auth_username: operator
    auth_private_key: /keys/id_ed25519
    auth_strict_key: true
  - hostname: oob-01
    host: 10.0.0.3
    platform: cisco_iosxe
    transport: telnet
"#;

    fn defaults() -> CredentialDefaults {
        CredentialDefaults {
            username: Some("admin".to_owned()),
            password: Some("secret".to_owned()),
            private_key: None,
            private_key_passphrase: Some("unlock".to_owned()),
        }
    }

    async fn load_from(content: &str, defaults: &CredentialDefaults) -> Result<Inventory, ConfigErrors> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.yaml");
        std::fs::write(&path, content).unwrap();
        load_inventory(&path, defaults).await
    }

    #[tokio::test]
    async fn test_inventory_defaults_applied() {
        let inventory = load_from(INVENTORY, &defaults()).await.unwrap();

        assert_eq!(inventory.devices.len(), 3);

        let leaf = &inventory.devices[0];
        assert_eq!(leaf.credentials.username.as_deref(), Some("admin"));
        assert_eq!(leaf.credentials.password.as_deref(), Some("secret"));
        assert_eq!(leaf.credentials.private_key_passphrase, None);
        assert_eq!(leaf.port, None);
        assert_eq!(leaf.transport, Transport::Ssh);

        let spine = &inventory.devices[1];
        assert_eq!(spine.credentials.username.as_deref(), Some("operator"));
        assert_eq!(spine.credentials.password, None);
        assert_eq!(
            spine.credentials.private_key,
            Some(PathBuf::from("/keys/id_ed25519"))
        );
        assert_eq!(spine.credentials.private_key_passphrase.as_deref(), Some("unlock"));
        assert!(spine.credentials.strict_host_key);
        assert_eq!(spine.port, Some(2222));

        assert_eq!(inventory.devices[2].transport, Transport::Telnet);
    }

    #[tokio::test]
    async fn test_inventory_default_private_key() {
        let content = "devices:\n  - {hostname: leaf-01, host: 10.0.0.1, platform: cisco_nxos}\n";
        let key_defaults = CredentialDefaults {
            username: Some("admin".to_owned()),
            private_key: Some(PathBuf::from("/keys/id_rsa")),
            private_key_passphrase: Some("unlock".to_owned()),
            ..Default::default()
        };

        let inventory = load_from(content, &key_defaults).await.unwrap();

        let credentials = &inventory.devices[0].credentials;
        assert_eq!(credentials.password, None);
        assert_eq!(credentials.private_key, Some(PathBuf::from("/keys/id_rsa")));
        assert_eq!(credentials.private_key_passphrase.as_deref(), Some("unlock"));
    }

    #[tokio::test]
    async fn test_inventory_unknown_keys_rejected() {
        let cases = vec![
            "devices:\n  - {hostname: leaf-01, host: 10.0.0.1, platform: cisco_nxos, auth_pasword: typo}\n",
            "devices:\n  - {hostname: leaf-01, host: 10.0.0.1, platform: cisco_nxos, transport: serial}\n",
            "devices: []\ngroups: []\n",
        ];

        for content in cases {
            let err = load_from(content, &defaults()).await.err();

            assert!(
                matches!(err, Some(ConfigErrors::YamlError { .. })),
                "inventory should be rejected: {}",
                content
            );
        }
    }

    #[tokio::test]
    async fn test_inventory_transport_aliases() {
        let content = r#"
devices:
  - {hostname: leaf-01, host: 10.0.0.1, platform: cisco_nxos, transport: asyncssh}
  - {hostname: leaf-02, host: 10.0.0.2, platform: cisco_nxos, transport: asynctelnet}
"#;

        let inventory = load_from(content, &defaults()).await.unwrap();

        assert_eq!(inventory.devices[0].transport, Transport::Ssh);
        assert_eq!(inventory.devices[1].transport, Transport::Telnet);
    }

    #[tokio::test]
    async fn test_inventory_invalid_devices_rejected() {
        let cases = vec![
            (
                "{hostname: leaf-01, host: 10.0.0.1, platform: cisco_nxos, auth_password: a, auth_private_key: /k}",
                "not both",
            ),
            ("{hostname: leaf-01, host: 10.0.0.1, platform: cisco_nxos, port: 0}", "port 0"),
            (
                "{hostname: leaf-01, host: 10.0.0.1, platform: cisco_nxos, transport: telnet, auth_private_key: /k}",
                "needs auth_password",
            ),
            ("{hostname: leaf-01, host: '', platform: cisco_nxos}", "empty host"),
        ];

        for (device, reason) in cases {
            let content = format!("devices:\n  - {}\n", device);
            let err = load_from(&content, &defaults()).await.err().unwrap();

            assert!(matches!(err, ConfigErrors::ValidationError { .. }), "{}", device);
            assert!(err.to_string().contains(reason), "{}: {}", device, err);
        }
    }

    #[tokio::test]
    async fn test_inventory_duplicate_hostnames_rejected() {
        let content = r#"
devices:
  - {hostname: Leaf-01, host: 10.0.0.1, platform: cisco_nxos}
  - {hostname: leaf-01, host: 10.0.0.2, platform: cisco_nxos}
"#;

        let err = load_from(content, &defaults()).await.err().unwrap();

        assert!(err.to_string().contains("duplicate hostname leaf-01"));
    }

    #[tokio::test]
    async fn test_inventory_without_any_secret_rejected() {
        let content = "devices:\n  - {hostname: leaf-01, host: 10.0.0.1, platform: cisco_nxos}\n";
        let no_secret = CredentialDefaults {
            username: Some("admin".to_owned()),
            ..Default::default()
        };

        let err = load_from(content, &no_secret).await.err().unwrap();

        assert!(err.to_string().contains("auth_password or auth_private_key"));
    }

    #[tokio::test]
    async fn test_missing_inventory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = load_inventory(&dir.path().join("inventory.yaml"), &defaults())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, ConfigErrors::ValidationError { .. }));
    }

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let credentials = Credentials {
            username: Some("admin".to_owned()),
            password: Some("hunter2".to_owned()),
            private_key_passphrase: Some("opensesame".to_owned()),
            ..Default::default()
        };

        let printed = format!("{:?}", credentials);

        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("opensesame"));
        assert!(printed.contains(REDACTED));
    }
}

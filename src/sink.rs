#[cfg(test)]
use mockall::automock;

mod files;
pub(crate) use files::FileSink;

use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkErrors {
    #[error("unable to write artifact {key}: {source}")]
    WriteError { key: String, source: std::io::Error },
    #[error("unable to serialize artifact {key}: {source}")]
    SerializationError {
        key: String,
        source: serde_json::Error,
    },
    #[error("{} of {attempted} artifact writes for {hostname} failed", .errors.len())]
    Incomplete {
        hostname: String,
        attempted: usize,
        errors: Vec<SinkErrors>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactName {
    Command(String),
    Error,
    Summary,
}

/// Where an artifact lands. Keys are namespaced by hostname, so concurrent
/// writers for different devices never touch the same artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub hostname: String,
    pub name: ArtifactName,
}

impl ArtifactKey {
    pub fn command(hostname: &str, command_name: &str) -> ArtifactKey {
        ArtifactKey {
            hostname: hostname.to_owned(),
            name: ArtifactName::Command(command_name.to_owned()),
        }
    }

    pub fn error(hostname: &str) -> ArtifactKey {
        ArtifactKey {
            hostname: hostname.to_owned(),
            name: ArtifactName::Error,
        }
    }

    pub fn summary(hostname: &str) -> ArtifactKey {
        ArtifactKey {
            hostname: hostname.to_owned(),
            name: ArtifactName::Summary,
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            ArtifactName::Command(command) => write!(f, "{}/{}", self.hostname, command),
            ArtifactName::Error => write!(f, "{}/error", self.hostname),
            ArtifactName::Summary => write!(f, "{}/summary", self.hostname),
        }
    }
}

/// Durable storage for collection artifacts. Writing the same key twice
/// replaces the previous artifact.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn write_record(&self, key: &ArtifactKey, record: &Value) -> Result<(), SinkErrors>;
    async fn write_raw(&self, key: &ArtifactKey, text: &str) -> Result<(), SinkErrors>;
}

/// Replaces every character that is not safe in a storage key.
pub fn sanitize_key(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    match sanitized.trim_matches('.') {
        "" => "_".to_owned(),
        _ => sanitized,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory sink that remembers the last write for every key.
    #[derive(Default)]
    pub struct MemorySink {
        pub records: Mutex<HashMap<ArtifactKey, Value>>,
        pub raw: Mutex<HashMap<ArtifactKey, String>>,
    }

    impl MemorySink {
        pub fn record(&self, key: &ArtifactKey) -> Option<Value> {
            self.records.lock().unwrap().get(key).cloned()
        }

        pub fn raw_text(&self, key: &ArtifactKey) -> Option<String> {
            self.raw.lock().unwrap().get(key).cloned()
        }

        pub fn keys(&self) -> Vec<ArtifactKey> {
            self.records.lock().unwrap().keys().cloned().collect()
        }
    }

    #[async_trait::async_trait]
    impl ArtifactSink for MemorySink {
        async fn write_record(&self, key: &ArtifactKey, record: &Value) -> Result<(), SinkErrors> {
            self.records
                .lock()
                .unwrap()
                .insert(key.clone(), record.clone());
            Ok(())
        }

        async fn write_raw(&self, key: &ArtifactKey, text: &str) -> Result<(), SinkErrors> {
            self.raw.lock().unwrap().insert(key.clone(), text.to_owned());
            Ok(())
        }
    }
}

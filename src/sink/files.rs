use super::{sanitize_key, ArtifactKey, ArtifactName, ArtifactSink, SinkErrors};
use log::debug;
use serde_json::Value;
use std::path::PathBuf;

/// Writes artifacts below `root`, one directory per device:
/// `<root>/<hostname>/<command>.json|.txt`, `_error.json|.txt` and
/// `_summary.json`.
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> FileSink {
        FileSink { root: root.into() }
    }

    fn path_for(&self, key: &ArtifactKey, extension: &str) -> PathBuf {
        let file_stem = match &key.name {
            ArtifactName::Command(command) => sanitize_key(command),
            ArtifactName::Error => "_error".to_owned(),
            ArtifactName::Summary => "_summary".to_owned(),
        };

        self.root
            .join(sanitize_key(&key.hostname))
            .join(format!("{}.{}", file_stem, extension))
    }

    async fn write(&self, key: &ArtifactKey, extension: &str, content: &[u8]) -> Result<(), SinkErrors> {
        let path = self.path_for(key, extension);
        let write_error = |source: std::io::Error| SinkErrors::WriteError {
            key: key.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
        }
        tokio::fs::write(&path, content).await.map_err(write_error)?;

        debug!("artifact {} written to {}", key, path.display());
        Ok(())
    }
}

#[async_trait::async_trait]
impl ArtifactSink for FileSink {
    async fn write_record(&self, key: &ArtifactKey, record: &Value) -> Result<(), SinkErrors> {
        let content =
            serde_json::to_vec_pretty(record).map_err(|source| SinkErrors::SerializationError {
                key: key.to_string(),
                source,
            })?;

        self.write(key, "json", &content).await
    }

    async fn write_raw(&self, key: &ArtifactKey, text: &str) -> Result<(), SinkErrors> {
        self.write(key, "txt", text.as_bytes()).await
    }
}

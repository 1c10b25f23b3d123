mod commands;
mod inventory;
mod settings;

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub(crate) use commands::load_catalog;
pub(crate) use inventory::*;
pub(crate) use settings::*;

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("unable to read configuration file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid yaml in {path}: {source}")]
    YamlError {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration in {path}: {reason}")]
    ValidationError { path: PathBuf, reason: String },
}

impl ConfigErrors {
    fn invalid(path: &Path, reason: impl Into<String>) -> ConfigErrors {
        ConfigErrors::ValidationError {
            path: path.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Reads a yaml document from `path`.
///
/// A missing file, an empty file or a document that is just `null` all yield
/// `Ok(None)` so that callers can decide whether defaults apply.
async fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigErrors> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigErrors::ReadError {
                path: path.to_owned(),
                source,
            })
        }
    };

    if content.trim().is_empty() {
        return Ok(None);
    }

    serde_yaml::from_str::<Option<T>>(&content).map_err(|source| ConfigErrors::YamlError {
        path: path.to_owned(),
        source,
    })
}

use super::results::{CollectionStatus, DeviceResult};
use crate::sink::{sanitize_key, ArtifactKey, ArtifactSink, SinkErrors};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

struct Artifact {
    key: ArtifactKey,
    record: Value,
    raw: Option<String>,
}

pub struct ArtifactWriter {
    sink: Arc<dyn ArtifactSink>,
}

impl ArtifactWriter {
    pub fn new(sink: Arc<dyn ArtifactSink>) -> ArtifactWriter {
        ArtifactWriter { sink }
    }

    /// Persists one finished device. Writing the same result again replaces
    /// the previous artifacts. Every artifact is attempted even when an
    /// earlier write fails; the failures are reported together.
    pub async fn persist(&self, result: &DeviceResult) -> Result<(), SinkErrors> {
        let mut attempted = 0;
        let mut errors = Vec::new();

        for artifact in artifacts(result) {
            attempted += 1;
            if let Err(err) = self.sink.write_record(&artifact.key, &artifact.record).await {
                errors.push(err);
            }
            if let Some(raw) = &artifact.raw {
                attempted += 1;
                if let Err(err) = self.sink.write_raw(&artifact.key, raw).await {
                    errors.push(err);
                }
            }
        }

        if errors.is_empty() {
            return Ok(());
        }
        Err(SinkErrors::Incomplete {
            hostname: result.hostname.clone(),
            attempted,
            errors,
        })
    }
}

fn artifacts(result: &DeviceResult) -> Vec<Artifact> {
    if result.status == CollectionStatus::Failed {
        return vec![error_artifact(result)];
    }
    if result.commands.is_empty() {
        return vec![summary_artifact(result)];
    }

    let mut used_names = HashSet::new();
    result
        .commands
        .iter()
        .map(|(name, command)| {
            let mut record = json!({
                "hostname": result.hostname,
                "platform": result.platform,
                "host": result.host,
                "command_name": name,
            });
            if let (Some(target), Value::Object(fields)) =
                (record.as_object_mut(), command.to_record())
            {
                target.extend(fields);
            }

            Artifact {
                key: ArtifactKey::command(&result.hostname, &unique_name(&mut used_names, name)),
                record,
                raw: Some(command.raw_text().to_owned()),
            }
        })
        .collect()
}

/// Sanitized artifact name for `name`, suffixed when another command of the
/// same device already sanitizes to it.
fn unique_name(used_names: &mut HashSet<String>, name: &str) -> String {
    let base = sanitize_key(name);
    let mut candidate = base.clone();
    let mut suffix = 2;
    while !used_names.insert(candidate.clone()) {
        candidate = format!("{}_{}", base, suffix);
        suffix += 1;
    }
    candidate
}

fn error_artifact(result: &DeviceResult) -> Artifact {
    let error = result.error.as_deref().unwrap_or("unknown error");

    Artifact {
        key: ArtifactKey::error(&result.hostname),
        record: result.to_record(),
        raw: Some(format!(
            "{} ({}) collection failed\n{}\n",
            result.hostname, result.host, error
        )),
    }
}

fn summary_artifact(result: &DeviceResult) -> Artifact {
    let reason = match result.status {
        CollectionStatus::NoCommandsForPlatform => {
            format!("no commands configured for platform {}", result.platform)
        }
        status => format!("no command results collected ({})", status),
    };

    Artifact {
        key: ArtifactKey::summary(&result.hostname),
        record: json!({
            "hostname": result.hostname,
            "platform": result.platform,
            "host": result.host,
            "status": result.status,
            "message": reason,
        }),
        raw: None,
    }
}

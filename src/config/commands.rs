use super::{read_yaml, ConfigErrors};
use crate::collector::{CommandCatalog, CommandCatalogBuilder};
use crate::sink::sanitize_key;
use indexmap::IndexMap;
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Deserialize, Default)]
#[serde(default)]
struct CommandsFile {
    platforms: IndexMap<String, Option<IndexMap<String, Option<CommandEntry>>>>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CommandEntry {
    command: Option<String>,
    textfsm_template: Option<String>,
}

/// Loads the platform command catalog. A missing or empty commands file is not
/// an error: it produces an empty catalog and every device ends up with
/// `no_commands_for_platform`.
pub async fn load_catalog(path: &Path) -> Result<CommandCatalog, ConfigErrors> {
    let commands_file = match read_yaml::<CommandsFile>(path).await? {
        Some(commands_file) => commands_file,
        None => {
            warn!(
                "commands file {} does not exist or is empty, no commands will be collected",
                path.display()
            );
            CommandsFile::default()
        }
    };

    let mut builder = CommandCatalogBuilder::new();
    for (platform, commands) in &commands_file.platforms {
        builder.add_platform(platform);

        let mut artifact_names: HashMap<String, &str> = HashMap::new();
        for (name, entry) in commands.iter().flatten() {
            let artifact_name = sanitize_key(name);
            if let Some(other) = artifact_names.insert(artifact_name.clone(), name) {
                return Err(ConfigErrors::invalid(
                    path,
                    format!(
                        "commands `{}` and `{}` of platform {} would both be stored as `{}`",
                        other, name, platform, artifact_name
                    ),
                ));
            }

            let entry = entry.as_ref();
            let command = entry
                .and_then(|entry| entry.command.as_deref())
                .filter(|command| !command.trim().is_empty());
            let template = entry.and_then(|entry| entry.textfsm_template.as_deref());

            builder.add_command(platform, name, command, template);
        }
    }

    let catalog = builder.build_catalog();
    for platform in catalog.inspect_platforms() {
        info!("commands configured for {}", platform);
    }

    Ok(catalog)
}

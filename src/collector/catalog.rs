use indexmap::IndexMap;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: String,
    /// `None` when the command was declared without command text.
    pub command: Option<String>,
    pub parser_template: Option<String>,
}

/// Platform -> ordered command specifications. Built once per run and only
/// ever read afterwards, so it is shared across device tasks behind an `Arc`.
#[derive(Debug, Default)]
pub struct CommandCatalog {
    platforms: HashMap<String, IndexMap<String, CommandSpec>>,
}

impl CommandCatalog {
    /// Command specifications for `platform` in declaration order, empty for
    /// unknown or unconfigured platforms.
    pub fn resolve(&self, platform: &str) -> Vec<&CommandSpec> {
        self.platforms
            .get(platform)
            .map(|commands| commands.values().collect())
            .unwrap_or_default()
    }

    pub fn inspect_platforms(&self) -> Vec<String> {
        let mut platforms_list: Vec<String> = self
            .platforms
            .iter()
            .map(|(platform, commands)| {
                let names: Vec<&str> = commands.keys().map(String::as_str).collect();
                format!("{} - {}", platform, names.join("/"))
            })
            .collect();
        platforms_list.sort();

        platforms_list
    }
}

pub struct CommandCatalogBuilder {
    platforms: Vec<String>,
    commands: Vec<(String, CommandSpec)>,
}

impl CommandCatalogBuilder {
    pub fn new() -> CommandCatalogBuilder {
        CommandCatalogBuilder {
            platforms: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn add_command(
        &mut self,
        platform: &str,
        name: &str,
        command: Option<&str>,
        parser_template: Option<&str>,
    ) -> &mut CommandCatalogBuilder {
        self.commands.push((
            platform.to_owned(),
            CommandSpec {
                name: name.to_owned(),
                command: command.map(str::to_owned),
                parser_template: parser_template.map(str::to_owned),
            },
        ));

        self
    }

    /// Registers a platform even if it ends up without commands.
    pub fn add_platform(&mut self, platform: &str) -> &mut CommandCatalogBuilder {
        self.platforms.push(platform.to_owned());

        self
    }

    pub fn build_catalog(self) -> CommandCatalog {
        let mut platforms: HashMap<String, IndexMap<String, CommandSpec>> = HashMap::new();

        for platform in self.platforms {
            platforms.entry(platform).or_default();
        }
        for (platform, spec) in self.commands {
            // a redefinition replaces the spec but keeps its original position
            platforms
                .entry(platform)
                .or_default()
                .insert(spec.name.clone(), spec);
        }

        CommandCatalog { platforms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(specs: &[&CommandSpec]) -> Vec<String> {
        specs.iter().map(|spec| spec.name.clone()).collect()
    }

    #[test]
    fn test_catalog_building() {
        let mut builder = CommandCatalogBuilder::new();
        builder
            .add_command("cisco_nxos", "version", Some("show version"), None)
            .add_command("cisco_nxos", "interfaces", Some("show interface"), None)
            .add_command("arista_eos", "lldp", Some("show lldp neighbors"), None)
            .add_platform("juniper_junos");

        let catalog = builder.build_catalog();
        let available = catalog.inspect_platforms();

        assert_eq!(
            available,
            vec![
                "arista_eos - lldp".to_owned(),
                "cisco_nxos - version/interfaces".to_owned(),
                "juniper_junos - ".to_owned(),
            ]
        );
    }

    #[test]
    fn test_catalog_resolve_keeps_declaration_order() {
        let mut builder = CommandCatalogBuilder::new();
        builder
            .add_command("cisco_nxos", "version", Some("show version"), None)
            .add_command("cisco_nxos", "arp", Some("show ip arp"), Some("arp.textfsm"))
            .add_command("cisco_nxos", "bgp", Some("show bgp summary"), None);

        let catalog = builder.build_catalog();
        let specs = catalog.resolve("cisco_nxos");

        assert_eq!(names(&specs), vec!["version", "arp", "bgp"]);
        assert_eq!(specs[1].parser_template.as_deref(), Some("arp.textfsm"));
    }

    #[test]
    fn test_catalog_redefinition_replaces_in_place() {
        let mut builder = CommandCatalogBuilder::new();
        builder
            .add_command("cisco_nxos", "version", Some("show version"), None)
            .add_command("cisco_nxos", "arp", Some("show ip arp"), None)
            .add_command("cisco_nxos", "version", Some("show version | json"), None);

        let catalog = builder.build_catalog();
        let specs = catalog.resolve("cisco_nxos");

        assert_eq!(names(&specs), vec!["version", "arp"]);
        assert_eq!(specs[0].command.as_deref(), Some("show version | json"));
    }

    #[test]
    fn test_catalog_resolve_unknown_platform() {
        let mut builder = CommandCatalogBuilder::new();
        builder.add_command("cisco_nxos", "version", Some("show version"), None);
        let catalog = builder.build_catalog();

        assert!(catalog.resolve("juniper_junos").is_empty());
    }

    #[test]
    fn test_catalog_resolve_empty_platform() {
        let mut builder = CommandCatalogBuilder::new();
        builder.add_platform("juniper_junos");
        let catalog = builder.build_catalog();

        assert!(catalog.resolve("juniper_junos").is_empty());
    }

    #[test]
    fn test_catalog_keeps_command_with_empty_name() {
        let mut builder = CommandCatalogBuilder::new();
        builder
            .add_platform("cisco_nxos")
            .add_command("cisco_nxos", "", Some("show clock"), None);
        let catalog = builder.build_catalog();

        let specs = catalog.resolve("cisco_nxos");

        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].command.as_deref(), Some("show clock"));
    }

    #[test]
    fn test_catalog_keeps_specs_without_command_text() {
        let mut builder = CommandCatalogBuilder::new();
        builder.add_command("cisco_nxos", "broken", None, None);
        let catalog = builder.build_catalog();

        let specs = catalog.resolve("cisco_nxos");

        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].command, None);
    }
}

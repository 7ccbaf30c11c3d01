use crate::domain::model::{
    ConfigModel, GlobalSettings, Host, ProvisioningSettings, ProxmoxSettings, Service, VmTemplate,
};
use crate::utils::error::{CompileError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Yaml,
    Toml,
}

impl SourceFormat {
    /// `.toml` is TOML; everything else (`.yml`, `.yaml`, no extension) is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => SourceFormat::Toml,
            _ => SourceFormat::Yaml,
        }
    }
}

/// `template:` holds one VM template, a list, or a map keyed by a short name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateSection {
    One(VmTemplate),
    Many(Vec<VmTemplate>),
    Named(NamedTemplates),
}

impl TemplateSection {
    pub fn into_vec(self) -> Vec<VmTemplate> {
        match self {
            TemplateSection::One(template) => vec![template],
            TemplateSection::Many(templates) => templates,
            TemplateSection::Named(named) => named.0.into_iter().map(|(_, t)| t).collect(),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = &VmTemplate> + '_> {
        match self {
            TemplateSection::One(template) => Box::new(std::iter::once(template)),
            TemplateSection::Many(templates) => Box::new(templates.iter()),
            TemplateSection::Named(named) => Box::new(named.0.iter().map(|(_, t)| t)),
        }
    }
}

/// `template: { ubuntu: {...}, debian: {...} }`, kept in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTemplates(pub Vec<(String, VmTemplate)>);

impl<'de> Deserialize<'de> for NamedTemplates {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct NamedVisitor;

        impl<'de> serde::de::Visitor<'de> for NamedVisitor {
            type Value = NamedTemplates;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map of VM templates")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((key, template)) = map.next_entry::<String, VmTemplate>()? {
                    entries.push((key, template));
                }
                Ok(NamedTemplates(entries))
            }
        }

        deserializer.deserialize_map(NamedVisitor)
    }
}

impl Serialize for NamedTemplates {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, template) in &self.0 {
            map.serialize_entry(key, template)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Extra names provided at deploy time, on top of the built-in fact names.
    #[serde(default)]
    pub external_vars: Vec<String>,
    #[serde(default)]
    pub jobs: Option<usize>,
}

/// The declarative environment description (`homelab.yml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomelabConfig {
    pub proxmox: ProxmoxSettings,
    #[serde(default)]
    pub global: GlobalSettings,
    #[serde(default)]
    pub template: Option<TemplateSection>,
    #[serde(default, alias = "vms")]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub provisioning: ProvisioningSettings,
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("env pattern is valid"))
}

impl HomelabConfig {
    /// Loads and validates a config file; the format follows the file extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CompileError::ConfigParseError {
            source_name: path.display().to_string(),
            message: format!("cannot read file: {}", e),
        })?;
        let config = Self::from_str_with(&content, SourceFormat::from_path(path), &path.display().to_string())?;
        tracing::debug!(
            "Loaded {} ({} hosts, {} services)",
            path.display(),
            config.hosts.len(),
            config.services.len()
        );
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Self::from_str_with(content, SourceFormat::Yaml, "<yaml>")
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::from_str_with(content, SourceFormat::Toml, "<toml>")
    }

    /// Parses and validates; never returns a partially populated config.
    pub fn from_str_with(content: &str, format: SourceFormat, source_name: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        let parse_error = |message: String| CompileError::ConfigParseError {
            source_name: source_name.to_string(),
            message,
        };

        let config: Self = match format {
            SourceFormat::Yaml => serde_yaml::from_str(&processed).map_err(|e| parse_error(e.to_string()))?,
            SourceFormat::Toml => toml::from_str(&processed).map_err(|e| parse_error(e.to_string()))?,
        };
        config.validate_config()?;
        Ok(config)
    }

    /// Replaces `${VAR}` with the environment value; unknown variables stay as written.
    pub fn substitute_env_vars(content: &str) -> String {
        env_pattern()
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// Declared VM templates in order; the first one is the default clone source.
    pub fn templates(&self) -> Vec<&VmTemplate> {
        self.template.iter().flat_map(TemplateSection::iter).collect()
    }

    /// Structural checks. A service naming an unknown host is not checked here;
    /// that is a per-service failure at compile time.
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("proxmox.host", &self.proxmox.host)?;
        validation::validate_url("proxmox.host", &self.proxmox.api_url())?;
        validation::validate_non_empty_string("proxmox.target_node", &self.proxmox.target_node)?;
        validation::validate_positive_number("global.vm_ssh_port", u64::from(self.global.vm_ssh_port), 1)?;
        for subnet in &self.global.subnets {
            validation::validate_ip_address("global.subnets", subnet)?;
        }

        let templates = self.templates();
        let mut vmids = HashSet::new();
        for template in templates {
            validation::validate_non_empty_string("template.name", &template.name)?;
            validation::validate_non_empty_string("template.image", &template.image)?;
            validation::validate_positive_number("template.vmid", u64::from(template.vmid), 100)?;
            validation::validate_positive_number("template.memory", template.memory, 1)?;
            validation::validate_positive_number("template.disk", template.disk, 1)?;
            if !vmids.insert(template.vmid) {
                return Err(CompileError::InvalidConfigValueError {
                    field: "template.vmid".to_string(),
                    value: template.vmid.to_string(),
                    reason: "vmid is declared more than once".to_string(),
                });
            }
        }

        if !self.hosts.is_empty() {
            validation::validate_required_field("template", &self.template)?;
        }

        for host in &self.hosts {
            let field = |name: &str| format!("hosts.{}.{}", host.name, name);
            validation::validate_non_empty_string("hosts.name", &host.name)?;
            validation::validate_ip_address(&field("ip"), &host.ip)?;
            if let Some(gateway) = &host.gateway {
                validation::validate_ip_address(&field("gateway"), gateway)?;
            }
            validation::validate_positive_number(&field("cores"), u64::from(host.cores), 1)?;
            validation::validate_positive_number(&field("memory"), host.memory, 1)?;
            validation::validate_positive_number(&field("disk"), host.disk, 1)?;
            validation::validate_path(&field("data_dir"), &host.data_dir)?;
            if let Some(vmid) = host.template {
                if !vmids.contains(&vmid) {
                    return Err(CompileError::InvalidConfigValueError {
                        field: field("template"),
                        value: vmid.to_string(),
                        reason: "No VM template with this vmid".to_string(),
                    });
                }
            }
        }
        validation::validate_unique_names("hosts.name", self.hosts.iter().map(|h| h.name.as_str()))?;

        for service in &self.services {
            validation::validate_non_empty_string("services.name", &service.name)?;
            validation::validate_non_empty_string(&format!("services.{}.vm", service.name), &service.host)?;
        }
        validation::validate_unique_names(
            "services.name",
            self.services.iter().map(|s| s.name.as_str()),
        )?;

        let declared: HashSet<&str> = self.services.iter().map(|s| s.name.as_str()).collect();
        for service in &self.services {
            if let Some(missing) = service.depends_on.iter().find(|d| !declared.contains(d.as_str())) {
                return Err(CompileError::config(
                    format!("services.{}.depends_on", service.name),
                    format!("Dependency service '{}' not found", missing),
                ));
            }
        }

        if let Some(jobs) = self.validation.jobs {
            validation::validate_range("validation.jobs", jobs, 1, crate::core::compiler::MAX_JOBS)?;
        }
        Ok(())
    }

    /// Consumes the validated config. Hosts without `ssh_user` inherit their template's user.
    pub fn into_model(self) -> Result<ConfigModel> {
        self.validate_config()?;
        let templates = self.template.map(TemplateSection::into_vec).unwrap_or_default();

        let hosts = self
            .hosts
            .into_iter()
            .map(|mut host| {
                if host.ssh_user.is_none() {
                    let template = match host.template {
                        Some(vmid) => templates.iter().find(|t| t.vmid == vmid),
                        None => templates.first(),
                    };
                    host.ssh_user = template.map(|t| t.user.clone());
                }
                host
            })
            .collect();

        Ok(ConfigModel {
            proxmox: self.proxmox,
            global: self.global,
            templates,
            hosts,
            services: self.services,
            provisioning: self.provisioning,
            external_vars: self.validation.external_vars,
            jobs: self.validation.jobs,
        })
    }
}

impl Validate for HomelabConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;

fn default_target_node() -> String {
    "homelab".to_string()
}

fn default_api_user() -> String {
    "root@pam".to_string()
}

fn default_bridge() -> String {
    "vmbr0".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_template_memory() -> u64 {
    1024
}

fn default_template_disk() -> u64 {
    2
}

fn default_data_dir() -> String {
    "/opt/homelab".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxmoxSettings {
    pub host: String,
    #[serde(default = "default_target_node")]
    pub target_node: String,
    #[serde(default = "default_api_user")]
    pub user: String,
    #[serde(default = "default_bridge")]
    pub bridge: String,
}

impl ProxmoxSettings {
    pub fn api_url(&self) -> String {
        format!("https://{}:8006/api2/json", self.host)
    }
}

/// Global defaults. Every key, including the free-form ones, is visible to templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default = "default_ssh_port")]
    pub vm_ssh_port: u16,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            vm_ssh_port: default_ssh_port(),
            subnets: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// Cloud-init image that hosts are cloned from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmTemplate {
    pub name: String,
    pub vmid: u32,
    pub image: String,
    pub user: String,
    pub ssh_key: String,
    #[serde(alias = "datasource_id")]
    pub datastore_id: String,
    #[serde(default = "default_template_memory")]
    pub memory: u64,
    #[serde(default = "default_template_disk")]
    pub disk: u64,
    #[serde(default)]
    pub tags: Vec<String>,
}

const CLOUD_IMAGE_BASE: &str = "https://cloud-images.ubuntu.com/noble/current/";

impl VmTemplate {
    /// Private key path paired with `ssh_key`.
    pub fn private_key_path(&self) -> String {
        self.ssh_key
            .strip_suffix(".pub")
            .unwrap_or(&self.ssh_key)
            .to_string()
    }

    /// Download URL; a bare file name is looked up on the Ubuntu cloud image mirror.
    pub fn image_url(&self) -> String {
        if self.image.contains("://") {
            self.image.clone()
        } else {
            format!("{}{}", CLOUD_IMAGE_BASE, self.image)
        }
    }

    pub fn image_file(&self) -> &str {
        self.image.rsplit('/').next().unwrap_or(&self.image)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    pub ip: String,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub ssh_user: Option<String>,
    pub cores: u32,
    pub memory: u64,
    pub disk: u64,
    #[serde(default)]
    pub deploy_order: Option<u32>,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// vmid of the [`VmTemplate`] this host is cloned from.
    #[serde(default)]
    pub template: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Host {
    /// Network address without the prefix length.
    pub fn address(&self) -> &str {
        self.ip.split('/').next().unwrap_or(&self.ip)
    }

    /// Address with prefix length; a bare address is taken as a /24.
    pub fn cidr(&self) -> String {
        if self.ip.contains('/') {
            self.ip.clone()
        } else {
            format!("{}/24", self.ip)
        }
    }

    pub fn ssh_user(&self) -> &str {
        self.ssh_user.as_deref().unwrap_or("root")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    /// Owning host name.
    #[serde(rename = "vm")]
    pub host: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    #[serde(default = "default_true")]
    pub ansible: bool,
    #[serde(default)]
    pub docker: bool,
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            ansible: true,
            docker: false,
        }
    }
}

/// Fully loaded, validated description of the environment for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigModel {
    pub proxmox: ProxmoxSettings,
    pub global: GlobalSettings,
    pub templates: Vec<VmTemplate>,
    pub hosts: Vec<Host>,
    pub services: Vec<Service>,
    pub provisioning: ProvisioningSettings,
    pub external_vars: Vec<String>,
    pub jobs: Option<usize>,
}

impl ConfigModel {
    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.name == name)
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Template a host is cloned from; hosts without an explicit vmid use the first template.
    pub fn template_for(&self, host: &Host) -> Option<&VmTemplate> {
        match host.template {
            Some(vmid) => self.templates.iter().find(|t| t.vmid == vmid),
            None => self.templates.first(),
        }
    }

    pub fn default_template(&self) -> Option<&VmTemplate> {
        self.templates.first()
    }

    /// VM ids for cloned hosts, in declaration order: template vmid + 1 + clones of
    /// that template so far. Hosts without a resolvable template are left out.
    pub fn host_vms(&self) -> Vec<HostVm<'_>> {
        let mut clones: HashMap<u32, u32> = HashMap::new();
        self.hosts
            .iter()
            .filter_map(|host| {
                let template = self.template_for(host)?;
                let count = clones.entry(template.vmid).or_insert(0);
                let vmid = template.vmid + 1 + *count;
                *count += 1;
                Some(HostVm {
                    host,
                    template,
                    vmid,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostVm<'a> {
    pub host: &'a Host,
    pub template: &'a VmTemplate,
    pub vmid: u32,
}

/// A template file bound to one service by directory convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub service: String,
    pub name: String,
    pub source: String,
}

impl Template {
    pub fn new(service: impl Into<String>, name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            name: name.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    Overwrite,
    /// Never replaces an existing file (operator-edited secrets).
    CreateIfMissing,
}

/// Rendered output, relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub contents: String,
    pub executable: bool,
    pub mode: WriteMode,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            executable: false,
            mode: WriteMode::Overwrite,
        }
    }

    pub fn executable(mut self) -> Self {
        self.executable = true;
        self
    }

    pub fn create_if_missing(mut self) -> Self {
        self.mode = WriteMode::CreateIfMissing;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(name: &str, vmid: u32) -> VmTemplate {
        VmTemplate {
            name: name.to_string(),
            vmid,
            image: "noble-server-cloudimg-amd64.img".to_string(),
            user: "ubuntu".to_string(),
            ssh_key: "~/.ssh/id_ed25519.pub".to_string(),
            datastore_id: "local-lvm".to_string(),
            memory: default_template_memory(),
            disk: default_template_disk(),
            tags: vec![],
        }
    }

    fn host(name: &str, template: Option<u32>) -> Host {
        Host {
            name: name.to_string(),
            ip: "10.0.0.5/24".to_string(),
            gateway: None,
            ssh_user: None,
            cores: 1,
            memory: 512,
            disk: 8,
            deploy_order: None,
            data_dir: default_data_dir(),
            template,
            extra: Map::new(),
        }
    }

    fn model(templates: Vec<VmTemplate>, hosts: Vec<Host>) -> ConfigModel {
        ConfigModel {
            proxmox: ProxmoxSettings {
                host: "pve".to_string(),
                target_node: default_target_node(),
                user: default_api_user(),
                bridge: default_bridge(),
            },
            global: GlobalSettings::default(),
            templates,
            hosts,
            services: vec![],
            provisioning: ProvisioningSettings::default(),
            external_vars: vec![],
            jobs: None,
        }
    }

    #[test]
    fn test_host_vms_count_clones_per_template() {
        let model = model(
            vec![template("ubuntu", 9000), template("debian", 8000)],
            vec![
                host("a", None),
                host("b", Some(8000)),
                host("c", Some(9000)),
                host("orphan", Some(7000)),
            ],
        );

        let vms: Vec<(&str, u32)> = model
            .host_vms()
            .iter()
            .map(|vm| (vm.host.name.as_str(), vm.vmid))
            .collect();
        assert_eq!(vms, vec![("a", 9001), ("b", 8001), ("c", 9002)]);
    }

    #[test]
    fn test_image_url_and_file() {
        let mut t = template("ubuntu", 9000);
        assert_eq!(
            t.image_url(),
            "https://cloud-images.ubuntu.com/noble/current/noble-server-cloudimg-amd64.img"
        );
        assert_eq!(t.private_key_path(), "~/.ssh/id_ed25519");

        t.image = "https://mirror.example/images/jammy.img".to_string();
        assert_eq!(t.image_url(), "https://mirror.example/images/jammy.img");
        assert_eq!(t.image_file(), "jammy.img");
    }

    #[test]
    fn test_host_address_strips_prefix() {
        let mut h = host("a", None);
        assert_eq!(h.address(), "10.0.0.5");
        assert_eq!(h.cidr(), "10.0.0.5/24");
        h.ip = "10.0.0.5".to_string();
        assert_eq!(h.cidr(), "10.0.0.5/24");
        assert_eq!(h.address(), "10.0.0.5");
        assert_eq!(h.ssh_user(), "root");
        h.ssh_user = Some("admin".to_string());
        assert_eq!(h.ssh_user(), "admin");
    }
}

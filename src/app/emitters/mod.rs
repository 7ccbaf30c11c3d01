//! Artifact emitters. Each one owns a single output grammar and only turns the
//! validated model into text; the compiler decides what gets written.

pub mod env_files;
pub mod inventory;
pub mod playbooks;
pub mod roles;
pub mod scripts;
pub mod terraform;

pub use env_files::EnvFileEmitter;
pub use inventory::InventoryEmitter;
pub use playbooks::PlaybookEmitter;
pub use roles::RoleEmitter;
pub use scripts::ScriptEmitter;
pub use terraform::TerraformEmitter;

use crate::domain::ports::{ManifestEmitter, ServiceEmitter};

pub fn default_service_emitters() -> Vec<Box<dyn ServiceEmitter>> {
    vec![Box::new(RoleEmitter), Box::new(EnvFileEmitter)]
}

pub fn default_manifest_emitters() -> Vec<Box<dyn ManifestEmitter>> {
    vec![
        Box::new(TerraformEmitter),
        Box::new(InventoryEmitter),
        Box::new(PlaybookEmitter),
        Box::new(ScriptEmitter),
    ]
}

/// Lower-case identifier usable as a Terraform resource or shell function name.
pub(crate) fn identifier(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if ident.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::config::HomelabConfig;
    use crate::core::context::Context;
    use crate::domain::model::ConfigModel;
    use crate::domain::ports::{DeploymentPlan, ServiceUnit};

    pub const HOMELAB: &str = r#"
proxmox:
  host: pve.lab.local
global:
  vm_ssh_port: 2222
  subnets: ["10.0.0.0/24", "10.0.1.0/24"]
template:
  name: ubuntu-cloud
  vmid: 9000
  image: noble-server-cloudimg-amd64.img
  user: ubuntu
  ssh_key: ~/.ssh/id_ed25519.pub
  datastore_id: local-lvm
  tags: [cloudinit, ubuntu]
hosts:
  - name: edge
    ip: 10.0.0.10/24
    gateway: 10.0.0.1
    cores: 2
    memory: 2048
    disk: 20
    deploy_order: 2
  - name: data
    ip: 10.0.0.11
    cores: 4
    memory: 4096
    disk: 50
    deploy_order: 1
    ssh_user: admin
services:
  - name: postgres
    vm: data
    port: 5432
  - name: api
    vm: edge
    depends_on: [postgres]
    port: 8080
    log_level: debug
    replicas: 2
    tls: true
    labels: {team: core}
"#;

    pub fn model() -> ConfigModel {
        HomelabConfig::from_yaml_str(HOMELAB)
            .unwrap()
            .into_model()
            .unwrap()
    }

    pub fn contexts(model: &ConfigModel) -> Vec<Context> {
        model
            .services
            .iter()
            .map(|s| Context::for_service(model, model.host(&s.host).unwrap(), s).unwrap())
            .collect()
    }

    /// Every declared service counts as deployed, in declaration order.
    pub fn plan<'a>(
        model: &'a ConfigModel,
        contexts: &'a [Context],
        service_order: &'a [String],
        host_order: &'a [String],
    ) -> DeploymentPlan<'a> {
        let deployed = model
            .services
            .iter()
            .zip(contexts)
            .enumerate()
            .map(|(i, (service, context))| ServiceUnit {
                service,
                host: model.host(&service.host).unwrap(),
                context,
                order_index: i,
                templates: &[],
            })
            .collect();
        DeploymentPlan {
            model,
            service_order,
            host_order,
            deployed,
        }
    }
}

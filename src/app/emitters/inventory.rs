use crate::domain::model::{Artifact, ConfigModel};
use crate::domain::ports::{DeploymentPlan, ManifestEmitter};
use crate::utils::error::{CompileError, Result};

/// `ansible/inventory.ini` listing every declared host.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryEmitter;

fn inventory(model: &ConfigModel) -> Result<String> {
    let template = model
        .default_template()
        .ok_or_else(|| CompileError::emission("inventory", "no VM template configured"))?;

    let mut out = String::from("[homelab]\n");
    for host in &model.hosts {
        out.push_str(&format!("{} ansible_host={}", host.name, host.address()));
        if host.ssh_user() != template.user {
            out.push_str(&format!(" ansible_user={}", host.ssh_user()));
        }
        out.push('\n');
    }

    out.push_str("\n[homelab:vars]\n");
    out.push_str(&format!("ansible_user={}\n", template.user));
    out.push_str(&format!(
        "ansible_ssh_private_key_file={}\n",
        template.private_key_path()
    ));
    out.push_str(&format!("ansible_port={}\n", model.global.vm_ssh_port));
    out.push_str("ansible_ssh_common_args='-o StrictHostKeyChecking=accept-new'\n");
    if !model.global.subnets.is_empty() {
        out.push_str(&format!("subnets={}\n", model.global.subnets.join(" ")));
    }
    Ok(out)
}

impl ManifestEmitter for InventoryEmitter {
    fn name(&self) -> &str {
        "inventory"
    }

    fn emit(&self, plan: &DeploymentPlan<'_>) -> Result<Vec<Artifact>> {
        Ok(vec![Artifact::new("ansible/inventory.ini", inventory(plan.model)?)])
    }
}

use super::identifier;
use crate::domain::model::{Artifact, ConfigModel, HostVm, VmTemplate};
use crate::domain::ports::{DeploymentPlan, ManifestEmitter};
use crate::utils::error::Result;

/// Terraform for the bpg/proxmox provider: one template VM per VM template and
/// one cloned VM per host. Hosts are infrastructure, so all of them are emitted
/// regardless of how their services fared.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerraformEmitter;

const PROVIDER_TF: &str = r#"terraform {
  required_providers {
    proxmox = {
      source  = "bpg/proxmox"
      version = ">= 0.50.0"
    }
  }
}

provider "proxmox" {
  endpoint = var.pm_api_url
  username = var.pm_user
  password = var.pm_password
  insecure = var.pm_tls_insecure
  ssh {
    agent = true
  }
}
"#;

fn variables_tf(model: &ConfigModel) -> String {
    format!(
        r#"variable "pm_api_url" {{
  description = "Proxmox API URL"
  type        = string
  default     = "{api_url}"
}}

variable "pm_user" {{
  description = "Proxmox username"
  type        = string
  default     = "{user}"
}}

variable "pm_password" {{
  description = "Proxmox password"
  type        = string
  sensitive   = true
}}

variable "pm_tls_insecure" {{
  description = "Allow insecure TLS connections"
  type        = bool
  default     = true
}}

variable "default_password" {{
  description = "Default password for VM users"
  type        = string
  sensitive   = true
}}
"#,
        api_url = model.proxmox.api_url(),
        user = model.proxmox.user,
    )
}

fn template_resource(template: &VmTemplate) -> String {
    format!("proxmox_virtual_environment_vm.{}_template", identifier(&template.name))
}

fn template_tf(model: &ConfigModel) -> String {
    let node = &model.proxmox.target_node;
    let blocks: Vec<String> = model
        .templates
        .iter()
        .map(|t| {
            let id = identifier(&t.name);
            let tags = t
                .tags
                .iter()
                .map(|tag| format!("\"{}\"", tag))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                r#"resource "proxmox_virtual_environment_download_file" "{id}_cloud_image" {{
  content_type = "iso"
  datastore_id = "local"
  node_name    = "{node}"
  url          = "{url}"
}}

resource "proxmox_virtual_environment_vm" "{id}_template" {{
  name      = "{name}"
  node_name = "{node}"
  vm_id     = {vmid}

  template = true
  started  = false

  machine     = "q35"
  description = "Managed by Terraform"
  tags        = [{tags}]

  agent {{
    enabled = false
  }}

  cpu {{
    cores = 2
  }}

  memory {{
    dedicated = {memory}
  }}

  disk {{
    datastore_id = "{datastore}"
    file_id      = proxmox_virtual_environment_download_file.{id}_cloud_image.id
    interface    = "virtio0"
    iothread     = true
    discard      = "on"
    size         = {disk}
  }}

  initialization {{
    datastore_id = "{datastore}"
    user_account {{
      username = "{user}"
      keys     = [file("{ssh_key}")]
    }}
    ip_config {{
      ipv4 {{
        address = "dhcp"
      }}
    }}
  }}

  network_device {{
    bridge = "{bridge}"
  }}
}}
"#,
                url = t.image_url(),
                name = t.name,
                vmid = t.vmid,
                memory = t.memory,
                datastore = t.datastore_id,
                disk = t.disk,
                user = t.user,
                ssh_key = t.ssh_key,
                bridge = model.proxmox.bridge,
            )
        })
        .collect();
    blocks.join("\n")
}

fn vm_block(model: &ConfigModel, vm: &HostVm<'_>) -> String {
    let host = vm.host;
    let template = vm.template;
    let gateway = host
        .gateway
        .as_ref()
        .map(|gw| format!("\n        gateway = \"{}\"", gw))
        .unwrap_or_default();
    format!(
        r#"resource "proxmox_virtual_environment_vm" "{id}" {{
  name      = "{name}"
  node_name = "{node}"
  vm_id     = {vmid}

  depends_on = [{template_resource}]

  clone {{
    vm_id        = {template_vmid}
    datastore_id = "{datastore}"
  }}

  agent {{
    enabled = false
  }}

  cpu {{
    cores = {cores}
  }}

  memory {{
    dedicated = {memory}
  }}

  disk {{
    datastore_id = "{datastore}"
    interface    = "virtio0"
    size         = {disk}
  }}

  initialization {{
    datastore_id = "{datastore}"
    ip_config {{
      ipv4 {{
        address = "{address}"{gateway}
      }}
    }}
    user_account {{
      username = "{user}"
      password = var.default_password
      keys     = [file("{ssh_key}")]
    }}
  }}

  network_device {{
    bridge = "{bridge}"
  }}
}}
"#,
        id = identifier(&host.name),
        name = host.name,
        node = model.proxmox.target_node,
        vmid = vm.vmid,
        template_resource = template_resource(template),
        template_vmid = template.vmid,
        datastore = template.datastore_id,
        cores = host.cores,
        memory = host.memory,
        disk = host.disk,
        address = host.cidr(),
        user = host.ssh_user(),
        ssh_key = template.ssh_key,
        bridge = model.proxmox.bridge,
    )
}

fn main_tf(model: &ConfigModel) -> String {
    model
        .host_vms()
        .iter()
        .map(|vm| vm_block(model, vm))
        .collect::<Vec<_>>()
        .join("\n")
}

fn tfvars(model: &ConfigModel, placeholder: &str) -> String {
    format!(
        "# Proxmox credentials. Never commit the filled-in copy.\n\
         pm_api_url = \"{}\"\n\
         pm_user = \"{}\"\n\
         pm_password = \"{placeholder}\"\n\
         pm_tls_insecure = true\n\
         default_password = \"{placeholder}\"\n",
        model.proxmox.api_url(),
        model.proxmox.user,
    )
}

impl ManifestEmitter for TerraformEmitter {
    fn name(&self) -> &str {
        "terraform"
    }

    fn emit(&self, plan: &DeploymentPlan<'_>) -> Result<Vec<Artifact>> {
        let model = plan.model;
        Ok(vec![
            Artifact::new("terraform/provider.tf", PROVIDER_TF),
            Artifact::new("terraform/variables.tf", variables_tf(model)),
            Artifact::new("terraform/template.tf", template_tf(model)),
            Artifact::new("terraform/main.tf", main_tf(model)),
            Artifact::new("terraform/terraform.tfvars.example", tfvars(model, "CHANGEME")),
            Artifact::new("terraform/terraform.tfvars", tfvars(model, "CHANGEME")).create_if_missing(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::emitters::fixtures;
    use crate::domain::model::WriteMode;

    fn emit() -> Vec<Artifact> {
        let model = fixtures::model();
        let contexts = fixtures::contexts(&model);
        let order: Vec<String> = vec!["postgres".into(), "api".into()];
        let hosts: Vec<String> = vec!["data".into(), "edge".into()];
        let plan = fixtures::plan(&model, &contexts, &order, &hosts);
        TerraformEmitter.emit(&plan).unwrap()
    }

    fn file<'a>(artifacts: &'a [Artifact], path: &str) -> &'a Artifact {
        artifacts
            .iter()
            .find(|a| a.path.to_str() == Some(path))
            .unwrap()
    }

    #[test]
    fn test_main_tf_clones_hosts_in_declaration_order() {
        let artifacts = emit();
        let main = &file(&artifacts, "terraform/main.tf").contents;
        let edge = main.find("\"edge\" {").unwrap();
        let data = main.find("\"data\" {").unwrap();
        assert!(edge < data);
        assert!(main.contains("vm_id     = 9001"));
        assert!(main.contains("vm_id     = 9002"));
        assert!(main.contains("address = \"10.0.0.10/24\"\n        gateway = \"10.0.0.1\""));
        assert!(main.contains("address = \"10.0.0.11/24\"\n      }"));
        assert!(main.contains("username = \"admin\""));
        assert!(main.contains("depends_on = [proxmox_virtual_environment_vm.ubuntu_cloud_template]"));
    }

    #[test]
    fn test_template_tf_uses_image_mirror_for_bare_names() {
        let artifacts = emit();
        let template = &file(&artifacts, "terraform/template.tf").contents;
        assert!(template.contains(
            "url          = \"https://cloud-images.ubuntu.com/noble/current/noble-server-cloudimg-amd64.img\""
        ));
        assert!(template.contains("tags        = [\"cloudinit\", \"ubuntu\"]"));
        assert!(template.contains("datastore_id = \"local-lvm\""));
    }

    #[test]
    fn test_secrets_file_is_create_if_missing() {
        let artifacts = emit();
        assert_eq!(
            file(&artifacts, "terraform/terraform.tfvars").mode,
            WriteMode::CreateIfMissing
        );
        assert_eq!(
            file(&artifacts, "terraform/terraform.tfvars.example").mode,
            WriteMode::Overwrite
        );
        assert!(file(&artifacts, "terraform/variables.tf")
            .contents
            .contains("https://pve.lab.local:8006/api2/json"));
    }
}

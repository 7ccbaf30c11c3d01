use super::{identifier, playbooks::DEPLOY_PLAYBOOK};
use crate::domain::model::{Artifact, ConfigModel, HostVm, ProvisioningSettings, VmTemplate};
use crate::domain::ports::{DeploymentPlan, ManifestEmitter};
use crate::utils::error::Result;

/// Operator shell scripts for Proxmox. Everything emitted here is executable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptEmitter;

const SHEBANG: &str = "#!/bin/bash\n\nset -euo pipefail\n";

fn provision_script(provisioning: &ProvisioningSettings) -> String {
    let playbook = DEPLOY_PLAYBOOK.trim_start_matches("ansible/");
    let ansible = if provisioning.ansible {
        format!(
            "echo \"📦 Running Ansible playbooks...\"\n\
             (cd ansible && ansible-playbook -i inventory.ini {playbook})\n"
        )
    } else {
        "# Ansible step disabled in provisioning settings\n".to_string()
    };
    let docker = if provisioning.docker {
        "echo \"🐳 Installing Docker on every host...\"\n\
         (cd ansible && ansible homelab -i inventory.ini -b -m shell \
         -a 'command -v docker || curl -fsSL https://get.docker.com | sh')\n"
            .to_string()
    } else {
        "# Docker step disabled in provisioning settings\n".to_string()
    };

    format!(
        "{shebang}\n\
         echo \"🔐 Exporting secrets from terraform.tfvars...\"\n\
         export TF_VAR_pm_password=$(sed -n 's/^pm_password *= *\"\\(.*\\)\"/\\1/p' terraform/terraform.tfvars)\n\
         export TF_VAR_default_password=$(sed -n 's/^default_password *= *\"\\(.*\\)\"/\\1/p' terraform/terraform.tfvars)\n\
         \n\
         echo \"🚀 Running Terraform to provision VMs...\"\n\
         (cd terraform && terraform init && terraform apply -auto-approve)\n\
         \n\
         {ansible}\n\
         {docker}\n\
         echo \"✅ Homelab provisioning complete.\"\n",
        shebang = SHEBANG,
    )
}

fn vm_function(model: &ConfigModel, vm: &HostVm<'_>) -> String {
    let host = vm.host;
    let ipconfig = match &host.gateway {
        Some(gw) => format!("ip={},gw={}", host.cidr(), gw),
        None => format!("ip={}", host.cidr()),
    };
    format!(
        r#"configure_vm_{vmid}() {{
    local vmid={vmid}
    local name="{name}"
    local memory={memory}
    local cores={cores}
    local ipconfig="{ipconfig}"

    if ! qm status "$vmid" &>/dev/null; then
        echo "VM $vmid ($name) does not exist. Cloning from {template}..."
        qm clone {template} "$vmid" --name "$name" --full true --target {node}
        qm set "$vmid" --memory "$memory" --cores "$cores" --net0 virtio,bridge={bridge}
        qm resize "$vmid" virtio0 {disk}G
        qm set "$vmid" --ipconfig0 "$ipconfig" --ciuser {user}
        qm set "$vmid" --sshkeys {ssh_key}
        qm start "$vmid"
        return
    fi

    local config
    config=$(qm config "$vmid")
    current() {{ echo "$config" | awk -v key="$1:" '$1 == key {{ print $2 }}'; }}

    if [ "$(current memory)" != "$memory" ]; then
        echo "Updating memory for VM $vmid"
        qm set "$vmid" --memory "$memory"
    fi
    if [ "$(current cores)" != "$cores" ]; then
        echo "Updating cores for VM $vmid"
        qm set "$vmid" --cores "$cores"
    fi
    if [ "$(current ipconfig0)" != "$ipconfig" ]; then
        echo "Updating IP config for VM $vmid"
        qm set "$vmid" --ipconfig0 "$ipconfig"
    fi

    if [ "$(qm status "$vmid" | awk '{{ print $2 }}')" != "running" ]; then
        echo "Starting VM $vmid"
        qm start "$vmid"
    fi
}}
"#,
        vmid = vm.vmid,
        name = host.name,
        memory = host.memory,
        cores = host.cores,
        template = vm.template.vmid,
        node = model.proxmox.target_node,
        bridge = model.proxmox.bridge,
        disk = host.disk,
        user = host.ssh_user(),
        ssh_key = vm.template.ssh_key,
    )
}

/// One idempotent function per cloned host, called in host deploy order.
fn vms_script(model: &ConfigModel, host_order: &[String]) -> String {
    let vms = model.host_vms();
    let ordered: Vec<&HostVm<'_>> = host_order
        .iter()
        .filter_map(|name| vms.iter().find(|vm| &vm.host.name == name))
        .collect();

    let mut out = String::from(SHEBANG);
    for vm in &ordered {
        out.push('\n');
        out.push_str(&vm_function(model, vm));
    }
    out.push_str("\nmain() {\n");
    for vm in &ordered {
        out.push_str(&format!("    configure_vm_{}\n", vm.vmid));
    }
    if ordered.is_empty() {
        out.push_str("    :\n");
    }
    out.push_str("}\n\nmain \"$@\"\n");
    out
}

fn template_section(model: &ConfigModel, template: &VmTemplate) -> String {
    format!(
        r#"create_template_{ident}() {{
    local vmid={vmid}
    local image="{image_file}"
    local image_path="/var/lib/vz/template/$image"

    if qm status "$vmid" &>/dev/null; then
        echo "Template $vmid ({name}) already exists, skipping"
        return
    fi

    wget -nc "{url}"
    qemu-img resize "$image" 32G
    mv -n "$image" "$image_path"

    qm create "$vmid" --name "{name}" --ostype l26 \
        --memory {memory} \
        --agent 1 \
        --machine q35 \
        --cpu host --sockets 1 --cores 1 \
        --vga serial0 --serial0 socket \
        --net0 virtio,bridge={bridge}

    qm importdisk "$vmid" "$image_path" {datastore}
    qm set "$vmid" --scsihw virtio-scsi-pci --virtio0 {datastore}:vm-$vmid-disk-0,discard=on
    qm set "$vmid" --boot order=virtio0
    qm set "$vmid" --scsi1 {datastore}:cloudinit
    qm set "$vmid" --tags "{tags}"
    qm set "$vmid" --ciuser {user}
    qm set "$vmid" --ipconfig0 ip=dhcp
    qm template "$vmid"
}}
"#,
        ident = identifier(&template.name),
        vmid = template.vmid,
        image_file = template.image_file(),
        name = template.name,
        url = template.image_url(),
        memory = template.memory,
        bridge = model.proxmox.bridge,
        datastore = template.datastore_id,
        tags = template.tags.join(","),
        user = template.user,
    )
}

fn template_script(model: &ConfigModel) -> String {
    let mut out = String::from(SHEBANG);
    for template in &model.templates {
        out.push('\n');
        out.push_str(&template_section(model, template));
    }
    out.push('\n');
    for template in &model.templates {
        out.push_str(&format!("create_template_{}\n", identifier(&template.name)));
    }
    out
}

impl ManifestEmitter for ScriptEmitter {
    fn name(&self) -> &str {
        "scripts"
    }

    fn emit(&self, plan: &DeploymentPlan<'_>) -> Result<Vec<Artifact>> {
        let model = plan.model;
        Ok(vec![
            Artifact::new("scripts/provision.sh", provision_script(&model.provisioning)).executable(),
            Artifact::new("scripts/create_vms_checked.sh", vms_script(model, plan.host_order))
                .executable(),
            Artifact::new("scripts/create_cloudinit_template.sh", template_script(model))
                .executable(),
        ])
    }
}

use crate::domain::model::{ConfigModel, Host, Service};
use crate::utils::error::Result;
use serde::Serialize;
use serde_json::{Map, Value};

/// Variable namespace seen by one service's templates.
///
/// Built by layering, later layers overriding earlier ones:
/// `global` keys, the host's VM template, host fields, service fields,
/// then the `service` and `host` aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Context {
    vars: Map<String, Value>,
}

fn as_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(vars: Map<String, Value>) -> Self {
        Self { vars }
    }

    /// Context for `service` running on `host`.
    pub fn for_service(model: &ConfigModel, host: &Host, service: &Service) -> Result<Self> {
        let mut ctx = Self::new();

        ctx.layer(as_object(serde_json::to_value(&model.global)?));
        if let Some(template) = model.template_for(host) {
            ctx.layer(as_object(serde_json::to_value(template)?));
        }

        let mut host_fields = as_object(serde_json::to_value(host)?);
        host_fields.insert("address".to_string(), Value::String(host.address().to_string()));
        host_fields.insert("ssh_user".to_string(), Value::String(host.ssh_user().to_string()));
        ctx.layer(host_fields.clone());

        let service_fields = as_object(serde_json::to_value(service)?);
        ctx.layer(service_fields.clone());

        ctx.insert("service", Value::Object(service_fields));
        ctx.insert("host", Value::Object(host_fields));
        Ok(ctx)
    }

    /// Merges `vars` over the current contents; existing keys are replaced.
    pub fn layer(&mut self, vars: Map<String, Value>) {
        self.vars.extend(vars);
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Follows a dotted path (`service.port`, `subnets.0`) through nested objects and arrays.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.vars.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn resolves(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{GlobalSettings, ProvisioningSettings, ProxmoxSettings, VmTemplate};
    use serde_json::json;

    fn model() -> ConfigModel {
        let mut extra = Map::new();
        extra.insert("domain".into(), json!("lab.local"));
        extra.insert("port".into(), json!(1));

        let mut params = Map::new();
        params.insert("port".into(), json!(8080));
        params.insert("env".into(), json!({"MODE": "prod"}));

        ConfigModel {
            proxmox: ProxmoxSettings {
                host: "pve.lab.local".into(),
                target_node: "homelab".into(),
                user: "root@pam".into(),
                bridge: "vmbr0".into(),
            },
            global: GlobalSettings {
                vm_ssh_port: 2222,
                subnets: vec!["10.0.0.0/24".into()],
                extra,
            },
            templates: vec![VmTemplate {
                name: "ubuntu".into(),
                vmid: 9000,
                image: "https://example.invalid/ubuntu.img".into(),
                user: "ubuntu".into(),
                ssh_key: "~/.ssh/id_ed25519.pub".into(),
                datastore_id: "local-lvm".into(),
                memory: 1024,
                disk: 2,
                tags: vec![],
            }],
            hosts: vec![Host {
                name: "vm1".into(),
                ip: "10.0.0.10/24".into(),
                gateway: Some("10.0.0.1".into()),
                ssh_user: None,
                cores: 2,
                memory: 2048,
                disk: 20,
                deploy_order: Some(1),
                data_dir: "/opt/homelab".into(),
                template: None,
                extra: Map::new(),
            }],
            services: vec![Service {
                name: "web".into(),
                host: "vm1".into(),
                depends_on: vec![],
                params,
            }],
            provisioning: ProvisioningSettings::default(),
            external_vars: vec![],
            jobs: None,
        }
    }

    #[test]
    fn test_layers_and_aliases() {
        let model = model();
        let ctx = Context::for_service(&model, &model.hosts[0], &model.services[0]).unwrap();

        assert_eq!(ctx.get("domain"), Some(&json!("lab.local")));
        assert_eq!(ctx.get("vm_ssh_port"), Some(&json!(2222)));
        assert_eq!(ctx.get("vmid"), Some(&json!(9000)));
        // service overrides global, then host name is shadowed by the service name
        assert_eq!(ctx.get("port"), Some(&json!(8080)));
        assert_eq!(ctx.get("name"), Some(&json!("web")));
        assert_eq!(ctx.lookup("service.port"), Some(&json!(8080)));
        assert_eq!(ctx.lookup("service.vm"), Some(&json!("vm1")));
        assert_eq!(ctx.lookup("host.name"), Some(&json!("vm1")));
        assert_eq!(ctx.lookup("host.address"), Some(&json!("10.0.0.10")));
        assert_eq!(ctx.lookup("host.ssh_user"), Some(&json!("root")));
        assert_eq!(ctx.lookup("service.env.MODE"), Some(&json!("prod")));
    }

    #[test]
    fn test_lookup_through_arrays_and_scalars() {
        let ctx = Context::from_map(as_object(json!({
            "subnets": ["10.0.0.0/24", "10.0.1.0/24"],
            "port": 80,
            "empty": null,
        })));
        assert_eq!(ctx.lookup("subnets.1"), Some(&json!("10.0.1.0/24")));
        assert!(ctx.lookup("subnets.9").is_none());
        assert!(ctx.lookup("subnets.first").is_none());
        assert!(ctx.lookup("port.value").is_none());
        assert!(ctx.resolves("empty"));
        assert!(!ctx.resolves("absent"));
    }
}

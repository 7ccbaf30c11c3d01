use crate::domain::model::Artifact;
use crate::domain::ports::{ServiceEmitter, ServiceUnit};
use crate::utils::error::{CompileError, Result};
use serde_json::Value;

const RESERVED: [&str; 4] = ["SERVICE_NAME", "SERVICE_HOST", "HOST_ADDRESS", "DEPLOY_INDEX"];

/// `env/<service>.env`: identity lines plus every scalar service parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvFileEmitter;

fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

fn env_value(raw: &str) -> String {
    let plain = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@,+".contains(c));
    if plain {
        raw.to_string()
    } else {
        format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\"").replace('$', "\\$"))
    }
}

impl ServiceEmitter for EnvFileEmitter {
    fn name(&self) -> &str {
        "env-files"
    }

    fn emit(&self, unit: &ServiceUnit<'_>) -> Result<Vec<Artifact>> {
        let service = unit.service;
        let mut lines = vec![
            format!("SERVICE_NAME={}", env_value(&service.name)),
            format!("SERVICE_HOST={}", env_value(&unit.host.name)),
            format!("HOST_ADDRESS={}", unit.host.address()),
            format!("DEPLOY_INDEX={}", unit.order_index),
        ];

        for (name, value) in &service.params {
            let rendered = match value {
                Value::String(s) => env_value(s),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => continue,
            };
            let key = env_key(name);
            if RESERVED.contains(&key.as_str()) {
                return Err(CompileError::emission(
                    self.name(),
                    format!("parameter '{}' of service '{}' collides with {}", name, service.name, key),
                ));
            }
            lines.push(format!("{}={}", key, rendered));
        }

        let mut contents = lines.join("\n");
        contents.push('\n');
        Ok(vec![Artifact::new(format!("env/{}.env", service.name), contents)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::emitters::fixtures;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn test_env_file_contents() {
        let model = fixtures::model();
        let contexts = fixtures::contexts(&model);
        let unit = ServiceUnit {
            service: &model.services[1],
            host: &model.hosts[0],
            context: &contexts[1],
            order_index: 1,
            templates: &[],
        };

        let artifacts = EnvFileEmitter.emit(&unit).unwrap();
        assert_eq!(artifacts[0].path, PathBuf::from("env/api.env"));
        assert_eq!(
            artifacts[0].contents,
            "SERVICE_NAME=api\nSERVICE_HOST=edge\nHOST_ADDRESS=10.0.0.10\nDEPLOY_INDEX=1\n\
             LOG_LEVEL=debug\nPORT=8080\nREPLICAS=2\nTLS=true\n"
        );
    }

    #[test]
    fn test_values_needing_quotes() {
        assert_eq!(env_value("plain-value_1.0"), "plain-value_1.0");
        assert_eq!(env_value("two words"), "\"two words\"");
        assert_eq!(env_value("pa$$"), "\"pa\\$\\$\"");
        assert_eq!(env_value(""), "\"\"");
    }

    #[test]
    fn test_reserved_key_collision_is_an_error() {
        let mut model = fixtures::model();
        model.services[0]
            .params
            .insert("service-name".into(), json!("oops"));
        let contexts = fixtures::contexts(&model);
        let unit = ServiceUnit {
            service: &model.services[0],
            host: &model.hosts[1],
            context: &contexts[0],
            order_index: 0,
            templates: &[],
        };
        let err = EnvFileEmitter.emit(&unit).unwrap_err();
        assert!(err.to_string().contains("SERVICE_NAME"));
    }
}

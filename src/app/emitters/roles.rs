use crate::domain::model::Artifact;
use crate::domain::ports::{ServiceEmitter, ServiceUnit};
use crate::utils::error::Result;
use std::path::PathBuf;

/// Template that becomes the role's task list instead of a role template.
pub const TASKS_TEMPLATE: &str = "tasks_main.yml.j2";

/// Copies a service's validated templates into an Ansible role.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleEmitter;

impl ServiceEmitter for RoleEmitter {
    fn name(&self) -> &str {
        "roles"
    }

    fn emit(&self, unit: &ServiceUnit<'_>) -> Result<Vec<Artifact>> {
        let role = PathBuf::from("ansible/roles").join(&unit.service.name);
        Ok(unit
            .templates
            .iter()
            .map(|template| {
                let path = if template.name == TASKS_TEMPLATE {
                    role.join("tasks/main.yml")
                } else {
                    role.join("templates").join(&template.name)
                };
                Artifact::new(path, template.source.clone())
            })
            .collect())
    }
}

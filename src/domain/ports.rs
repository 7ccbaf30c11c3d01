use crate::core::context::Context;
use crate::domain::model::{Artifact, ConfigModel, Host, Service, Template};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A file written beside its target but not yet visible under the target name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Path relative to the output root, as the artifact names it.
    pub path: PathBuf,
    pub target: PathBuf,
    pub temp: PathBuf,
    /// Topmost directory created while staging, removed again on discard.
    pub created_dir: Option<PathBuf>,
}

/// Output sink. Writes go through `stage` then `commit`, so a group of files
/// becomes visible together or not at all.
pub trait Storage: Send + Sync {
    fn stage(
        &self,
        path: &Path,
        data: &[u8],
        executable: bool,
    ) -> impl std::future::Future<Output = Result<StagedFile>> + Send;

    /// Moves every staged file into place. On error, targets are restored to
    /// what they were before the call and the remaining temps are discarded.
    fn commit(&self, staged: Vec<StagedFile>) -> impl std::future::Future<Output = Result<()>> + Send;

    fn discard(&self, staged: Vec<StagedFile>) -> impl std::future::Future<Output = ()> + Send;

    fn exists(&self, path: &Path) -> impl std::future::Future<Output = Result<bool>> + Send;
}

/// Finds the templates bound to a service. `Ok(None)` means the service has no template set at all.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn load_templates(&self, service: &str) -> Result<Option<Vec<Template>>>;

    /// Where the templates of `service` are expected, for reports.
    fn location(&self, service: &str) -> String;
}

pub trait ConfigProvider: Send + Sync {
    fn config_path(&self) -> &str;
    fn templates_path(&self) -> &str;
    fn output_path(&self) -> &str;
    fn jobs(&self) -> Option<usize>;
    fn dry_run(&self) -> bool;
    fn extra_external_names(&self) -> &[String];
}

/// Everything an emitter may know about one fully validated service.
#[derive(Debug, Clone)]
pub struct ServiceUnit<'a> {
    pub service: &'a Service,
    pub host: &'a Host,
    pub context: &'a Context,
    pub order_index: usize,
    pub templates: &'a [Template],
}

/// Input for run-level artifacts, built after every service has been decided.
#[derive(Debug, Clone)]
pub struct DeploymentPlan<'a> {
    pub model: &'a ConfigModel,
    pub service_order: &'a [String],
    pub host_order: &'a [String],
    /// Succeeded services only, in dependency order.
    pub deployed: Vec<ServiceUnit<'a>>,
}

impl<'a> DeploymentPlan<'a> {
    pub fn services_on(&self, host: &str) -> Vec<&ServiceUnit<'a>> {
        self.deployed
            .iter()
            .filter(|unit| unit.host.name == host)
            .collect()
    }

    /// Hosts in deploy order that received at least one service.
    pub fn deployed_hosts(&self) -> Vec<&'a str> {
        self.host_order
            .iter()
            .filter(|host| self.deployed.iter().any(|unit| &unit.host.name == *host))
            .map(|host| host.as_str())
            .collect()
    }
}

/// Per-service artifact kind. Must not touch the filesystem; the orchestrator writes.
pub trait ServiceEmitter: Send + Sync {
    fn name(&self) -> &str;
    fn emit(&self, unit: &ServiceUnit<'_>) -> Result<Vec<Artifact>>;
}

/// Run-level artifact kind (infrastructure definitions, inventories, manifests).
pub trait ManifestEmitter: Send + Sync {
    fn name(&self) -> &str;
    fn emit(&self, plan: &DeploymentPlan<'_>) -> Result<Vec<Artifact>>;
}

use crate::core::inventory::TemplateSyntaxError;
use crate::core::validator::Verdict;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateVerdict {
    pub template: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Why a service produced no artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceFailure {
    UnknownHost { host: String },
    MissingTemplates { path: String },
    TemplateSyntax(TemplateSyntaxError),
    MissingVariables { template: String, missing: Vec<String> },
    /// The validation worker for this service stopped without a result.
    Worker { message: String },
    /// A service this one depends on failed earlier in the run.
    DependencyFailed { dependency: String },
    Emission { emitter: String, message: String },
    Write { path: String, message: String },
}

impl std::fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownHost { host } => write!(f, "unknown host '{}'", host),
            Self::MissingTemplates { path } => write!(f, "no template directory at {}", path),
            Self::TemplateSyntax(e) => write!(f, "{}", e),
            Self::MissingVariables { template, missing } => {
                write!(f, "{} references undefined: {}", template, missing.join(", "))
            }
            Self::Worker { message } => write!(f, "validation worker failed: {}", message),
            Self::DependencyFailed { dependency } => {
                write!(f, "dependency '{}' failed", dependency)
            }
            Self::Emission { emitter, message } => write!(f, "emitter '{}': {}", emitter, message),
            Self::Write { path, message } => write!(f, "writing {}: {}", path, message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
    pub name: String,
    pub host: String,
    /// Position in the resolved dependency order.
    pub order_index: usize,
    pub status: ServiceStatus,
    pub verdicts: Vec<TemplateVerdict>,
    pub failures: Vec<ServiceFailure>,
    pub artifacts: Vec<PathBuf>,
    /// Files kept because they already existed (create-if-missing).
    pub skipped: Vec<PathBuf>,
}

impl ServiceReport {
    pub fn new(name: impl Into<String>, host: impl Into<String>, order_index: usize) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            order_index,
            status: ServiceStatus::Succeeded,
            verdicts: Vec::new(),
            failures: Vec::new(),
            artifacts: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn fail(&mut self, failure: ServiceFailure) {
        self.status = ServiceStatus::Failed;
        self.failures.push(failure);
    }

    pub fn succeeded(&self) -> bool {
        self.status == ServiceStatus::Succeeded
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestReport {
    pub emitter: String,
    pub artifacts: Vec<PathBuf>,
    /// Files kept because they already existed (create-if-missing).
    pub skipped: Vec<PathBuf>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub services_total: usize,
    pub services_succeeded: usize,
    pub services_failed: usize,
    /// Artifact files written, or that would be written in a dry run.
    pub artifacts: usize,
    pub manifest_errors: usize,
}

/// Structured result of one compilation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    pub service_order: Vec<String>,
    pub host_order: Vec<String>,
    pub services: Vec<ServiceReport>,
    pub manifests: Vec<ManifestReport>,
    pub summary: ReportSummary,
}

impl CompileReport {
    pub fn new(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            run_id: format!("run-{}", started_at.format("%Y%m%dT%H%M%S%.3fZ")),
            started_at,
            dry_run,
            service_order: Vec::new(),
            host_order: Vec::new(),
            services: Vec::new(),
            manifests: Vec::new(),
            summary: ReportSummary::default(),
        }
    }

    pub fn service(&self, name: &str) -> Option<&ServiceReport> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ServiceReport> {
        self.services.iter().filter(|s| s.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ServiceReport> {
        self.services.iter().filter(|s| !s.succeeded())
    }

    pub fn has_failures(&self) -> bool {
        self.summary.services_failed > 0 || self.summary.manifest_errors > 0
    }

    pub fn finalize(&mut self) {
        let artifacts = self.services.iter().map(|s| s.artifacts.len()).sum::<usize>()
            + self.manifests.iter().map(|m| m.artifacts.len()).sum::<usize>();
        self.summary = ReportSummary {
            services_total: self.services.len(),
            services_succeeded: self.succeeded().count(),
            services_failed: self.failed().count(),
            artifacts,
            manifest_errors: self.manifests.iter().filter(|m| m.error.is_some()).count(),
        };
    }

    pub fn to_json(&self) -> crate::utils::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

use crate::core::context::Context;
use crate::core::graph;
use crate::core::inventory::TemplateSyntaxError;
use crate::core::report::{
    CompileReport, ManifestReport, ServiceFailure, ServiceReport, TemplateVerdict,
};
use crate::core::validator::{self, ExternalNames, Verdict};
use crate::domain::model::{Artifact, ConfigModel, Host, Service, Template, WriteMode};
use crate::domain::ports::{
    ConfigProvider, DeploymentPlan, ManifestEmitter, ServiceEmitter, ServiceUnit, Storage,
    TemplateSource,
};
use crate::utils::error::{CompileError, Result};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const DEFAULT_JOBS: usize = 4;
pub const MAX_JOBS: usize = 256;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Upper bound on concurrent validation workers.
    pub jobs: usize,
    pub dry_run: bool,
    pub external_names: ExternalNames,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            jobs: DEFAULT_JOBS,
            dry_run: false,
            external_names: ExternalNames::default(),
        }
    }
}

impl CompileOptions {
    /// CLI flags win over the config file; the allow-list is the union of defaults, file and flags.
    pub fn from_provider(provider: &impl ConfigProvider, model: &ConfigModel) -> Self {
        let mut external_names = ExternalNames::default();
        external_names.extend(model.external_vars.iter().cloned());
        external_names.extend(provider.extra_external_names().iter().cloned());

        Self {
            jobs: provider
                .jobs()
                .or(model.jobs)
                .unwrap_or(DEFAULT_JOBS)
                .clamp(1, MAX_JOBS),
            dry_run: provider.dry_run(),
            external_names,
        }
    }
}

/// A service whose host and templates were found, ready for validation.
struct Prepared<'m> {
    index: usize,
    service: &'m Service,
    host: &'m Host,
    context: Context,
    templates: Vec<Template>,
}

impl Prepared<'_> {
    fn unit(&self) -> ServiceUnit<'_> {
        ServiceUnit {
            service: self.service,
            host: self.host,
            context: &self.context,
            order_index: self.index,
            templates: &self.templates,
        }
    }
}

type TemplateOutcome = (String, std::result::Result<Verdict, TemplateSyntaxError>);

/// Outcomes of one service's templates, or why its worker produced none.
type WorkerResult = std::result::Result<Vec<TemplateOutcome>, String>;

/// Templates of one service plus its context, owned so a worker task can take them.
struct ValidationJob {
    index: usize,
    context: Context,
    templates: Vec<Template>,
}

/// Runs `check` over every job on at most `jobs` concurrent tasks. Slot `i` of the
/// result belongs to dependency index `i`; a task that dies only loses its own slot.
async fn run_validation_pool<F>(
    jobs: usize,
    slots: usize,
    work: Vec<ValidationJob>,
    check: F,
) -> Result<Vec<Option<WorkerResult>>>
where
    F: Fn(&Template, &Context) -> std::result::Result<Verdict, TemplateSyntaxError>
        + Send
        + Sync
        + 'static,
{
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let check = Arc::new(check);
    let mut workers = JoinSet::new();
    let mut owners = HashMap::new();

    for job in work {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| CompileError::WorkerPoolError(e.to_string()))?;
        let check = Arc::clone(&check);
        let index = job.index;
        let handle = workers.spawn(async move {
            let _permit = permit;
            job.templates
                .iter()
                .map(|t| (t.name.clone(), check(t, &job.context)))
                .collect::<Vec<TemplateOutcome>>()
        });
        owners.insert(handle.id(), index);
    }

    let mut results: Vec<Option<WorkerResult>> = (0..slots).map(|_| None).collect();
    while let Some(joined) = workers.join_next_with_id().await {
        let (id, result) = match joined {
            Ok((id, outcomes)) => (id, Ok(outcomes)),
            Err(e) => {
                let id = e.id();
                let error = CompileError::from(e);
                tracing::error!("❌ {}", error);
                (id, Err(error.to_string()))
            }
        };
        if let Some(slot) = owners.get(&id).and_then(|&index| results.get_mut(index)) {
            *slot = Some(result);
        }
    }
    Ok(results)
}

/// Paths of one group of artifacts: written (or would be, in a dry run) and kept.
#[derive(Debug, Default)]
struct Written {
    written: Vec<PathBuf>,
    skipped: Vec<PathBuf>,
}

/// Drives one run: order, validate, emit.
pub struct Compiler<S: Storage, T: TemplateSource> {
    storage: S,
    source: T,
    options: CompileOptions,
    service_emitters: Vec<Box<dyn ServiceEmitter>>,
    manifest_emitters: Vec<Box<dyn ManifestEmitter>>,
}

impl<S: Storage, T: TemplateSource> Compiler<S, T> {
    pub fn new(storage: S, source: T, options: CompileOptions) -> Self {
        Self {
            storage,
            source,
            options,
            service_emitters: Vec::new(),
            manifest_emitters: Vec::new(),
        }
    }

    pub fn with_service_emitter(mut self, emitter: impl ServiceEmitter + 'static) -> Self {
        self.service_emitters.push(Box::new(emitter));
        self
    }

    pub fn with_manifest_emitter(mut self, emitter: impl ManifestEmitter + 'static) -> Self {
        self.manifest_emitters.push(Box::new(emitter));
        self
    }

    pub fn with_service_emitters(mut self, emitters: Vec<Box<dyn ServiceEmitter>>) -> Self {
        self.service_emitters.extend(emitters);
        self
    }

    pub fn with_manifest_emitters(mut self, emitters: Vec<Box<dyn ManifestEmitter>>) -> Self {
        self.manifest_emitters.extend(emitters);
        self
    }

    /// Runs the whole pipeline. `Err` only for structural or system errors, in which
    /// case nothing has been written; per-service problems land in the report.
    pub async fn compile(&self, model: &ConfigModel) -> Result<CompileReport> {
        let mut report = CompileReport::new(Utc::now(), self.options.dry_run);
        tracing::info!(
            "🚀 Compiling {} services on {} hosts (jobs: {}, dry run: {})",
            model.services.len(),
            model.hosts.len(),
            self.options.jobs,
            self.options.dry_run
        );

        let service_order = graph::resolve(&model.services)?;
        let host_order = graph::host_deploy_order(&model.hosts);
        tracing::info!("📋 Service order: {}", service_order.join(" -> "));
        tracing::debug!("Host deploy order: {:?}", host_order);

        let mut services = Vec::with_capacity(service_order.len());
        let mut prepared = Vec::with_capacity(service_order.len());
        for (index, name) in service_order.iter().enumerate() {
            let service = model
                .service(name)
                .ok_or_else(|| CompileError::MissingConfigError {
                    field: format!("services.{}", name),
                })?;
            let mut service_report = ServiceReport::new(&service.name, &service.host, index);
            prepared.push(self.prepare(model, service, index, &mut service_report).await?);
            services.push(service_report);
        }

        let outcomes = self.validate_all(&prepared).await?;

        let mut failed: HashSet<String> = HashSet::new();
        for ((entry, service_report), outcome) in
            prepared.iter().zip(services.iter_mut()).zip(outcomes)
        {
            if let Some(entry) = entry {
                match outcome {
                    Some(Ok(outcomes)) => record_outcomes(service_report, outcomes),
                    Some(Err(message)) => service_report.fail(ServiceFailure::Worker { message }),
                    None => service_report.fail(ServiceFailure::Worker {
                        message: "no result returned".to_string(),
                    }),
                }
                for dependency in &entry.service.depends_on {
                    let failure = ServiceFailure::DependencyFailed {
                        dependency: dependency.clone(),
                    };
                    if failed.contains(dependency) && !service_report.failures.contains(&failure) {
                        service_report.fail(failure);
                    }
                }
                if service_report.succeeded() {
                    self.emit_service(entry, service_report).await;
                }
            }
            if !service_report.succeeded() {
                failed.insert(service_report.name.clone());
            }
            log_service(service_report);
        }

        let deployed: Vec<ServiceUnit<'_>> = prepared
            .iter()
            .zip(&services)
            .filter(|(_, r)| r.succeeded())
            .filter_map(|(p, _)| p.as_ref().map(Prepared::unit))
            .collect();
        let plan = DeploymentPlan {
            model,
            service_order: &service_order,
            host_order: &host_order,
            deployed,
        };
        for emitter in &self.manifest_emitters {
            let manifest = self.emit_manifest(emitter.as_ref(), &plan).await;
            report.manifests.push(manifest);
        }

        report.service_order = service_order.clone();
        report.host_order = host_order.clone();
        report.services = services;
        report.finalize();

        tracing::info!(
            "📊 {} succeeded, {} failed, {} artifacts{}",
            report.summary.services_succeeded,
            report.summary.services_failed,
            report.summary.artifacts,
            if report.dry_run { " (dry run, nothing written)" } else { "" }
        );
        Ok(report)
    }

    async fn prepare<'m>(
        &self,
        model: &'m ConfigModel,
        service: &'m Service,
        index: usize,
        service_report: &mut ServiceReport,
    ) -> Result<Option<Prepared<'m>>> {
        let Some(host) = model.host(&service.host) else {
            service_report.fail(ServiceFailure::UnknownHost {
                host: service.host.clone(),
            });
            return Ok(None);
        };

        let Some(templates) = self.source.load_templates(&service.name).await? else {
            service_report.fail(ServiceFailure::MissingTemplates {
                path: self.source.location(&service.name),
            });
            return Ok(None);
        };
        tracing::debug!("Loaded {} templates for '{}'", templates.len(), service.name);

        Ok(Some(Prepared {
            index,
            service,
            host,
            context: Context::for_service(model, host, service)?,
            templates,
        }))
    }

    /// Validates every prepared service on a bounded pool. Results are indexed by
    /// dependency order, independent of completion order.
    async fn validate_all(
        &self,
        prepared: &[Option<Prepared<'_>>],
    ) -> Result<Vec<Option<WorkerResult>>> {
        let work = prepared
            .iter()
            .flatten()
            .map(|entry| ValidationJob {
                index: entry.index,
                context: entry.context.clone(),
                templates: entry.templates.clone(),
            })
            .collect();
        let external = self.options.external_names.clone();
        run_validation_pool(self.options.jobs, prepared.len(), work, move |template, context| {
            validator::validate(template, context, &external)
        })
        .await
    }

    /// Renders every artifact of the service, then writes them as one group.
    async fn emit_service(&self, entry: &Prepared<'_>, service_report: &mut ServiceReport) {
        let unit = entry.unit();
        let mut artifacts = Vec::new();
        for emitter in &self.service_emitters {
            match emitter.emit(&unit) {
                Ok(mut emitted) => artifacts.append(&mut emitted),
                Err(e) => {
                    service_report.fail(ServiceFailure::Emission {
                        emitter: emitter.name().to_string(),
                        message: e.to_string(),
                    });
                    return;
                }
            }
        }

        match self.write_all(&artifacts).await {
            Ok(written) => {
                service_report.artifacts = written.written;
                service_report.skipped = written.skipped;
            }
            Err(CompileError::WriteError { path, source }) => {
                service_report.fail(ServiceFailure::Write {
                    path,
                    message: source.to_string(),
                });
            }
            Err(e) => service_report.fail(ServiceFailure::Emission {
                emitter: "storage".to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn emit_manifest(
        &self,
        emitter: &dyn ManifestEmitter,
        plan: &DeploymentPlan<'_>,
    ) -> ManifestReport {
        let mut manifest = ManifestReport {
            emitter: emitter.name().to_string(),
            artifacts: Vec::new(),
            skipped: Vec::new(),
            error: None,
        };

        let artifacts = match emitter.emit(plan) {
            Ok(artifacts) => artifacts,
            Err(e) => {
                tracing::error!("❌ Emitter '{}' failed: {}", emitter.name(), e);
                manifest.error = Some(e.to_string());
                return manifest;
            }
        };

        match self.write_all(&artifacts).await {
            Ok(written) => {
                manifest.artifacts = written.written;
                manifest.skipped = written.skipped;
            }
            Err(e) => {
                tracing::error!("❌ Emitter '{}' output not written: {}", emitter.name(), e);
                manifest.error = Some(e.to_string());
                return manifest;
            }
        }
        tracing::debug!(
            "Emitter '{}' produced {} files ({} kept)",
            manifest.emitter,
            manifest.artifacts.len(),
            manifest.skipped.len()
        );
        manifest
    }

    /// Stages every artifact, then commits them together. A create-if-missing artifact
    /// whose file already exists is left alone and reported as skipped.
    async fn write_all(&self, artifacts: &[Artifact]) -> Result<Written> {
        let mut written = Written::default();
        let mut pending = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            if artifact.mode == WriteMode::CreateIfMissing && self.storage.exists(&artifact.path).await? {
                tracing::debug!("Keeping existing {}", artifact.path.display());
                written.skipped.push(artifact.path.clone());
            } else {
                pending.push(artifact);
            }
        }
        written.written = pending.iter().map(|a| a.path.clone()).collect();

        if self.options.dry_run {
            for artifact in &pending {
                tracing::debug!("[dry run] would write {}", artifact.path.display());
            }
            return Ok(written);
        }

        let mut staged = Vec::with_capacity(pending.len());
        for artifact in &pending {
            match self
                .storage
                .stage(&artifact.path, artifact.contents.as_bytes(), artifact.executable)
                .await
            {
                Ok(file) => staged.push(file),
                Err(e) => {
                    self.storage.discard(staged).await;
                    return Err(e);
                }
            }
        }
        self.storage.commit(staged).await?;
        Ok(written)
    }
}

fn record_outcomes(service_report: &mut ServiceReport, outcomes: Vec<TemplateOutcome>) {
    for (template, outcome) in outcomes {
        match outcome {
            Ok(verdict) => {
                if let Verdict::Invalid { missing } = &verdict {
                    service_report.fail(ServiceFailure::MissingVariables {
                        template: template.clone(),
                        missing: missing.clone(),
                    });
                }
                service_report.verdicts.push(TemplateVerdict { template, verdict });
            }
            Err(e) => service_report.fail(ServiceFailure::TemplateSyntax(e)),
        }
    }
}

fn log_service(service_report: &ServiceReport) {
    if service_report.succeeded() {
        tracing::info!(
            "✅ {} ({} files)",
            service_report.name,
            service_report.artifacts.len()
        );
    } else {
        for failure in &service_report.failures {
            tracing::warn!("❌ {}: {}", service_report.name, failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(index: usize, names: &[&str]) -> ValidationJob {
        ValidationJob {
            index,
            context: Context::new(),
            templates: names.iter().map(|name| Template::new("svc", *name, "")).collect(),
        }
    }

    #[tokio::test]
    async fn test_dead_worker_only_loses_its_own_service() {
        let work = vec![job(0, &["a.j2"]), job(2, &["boom.j2"]), job(3, &["b.j2", "c.j2"])];
        let results = run_validation_pool(2, 4, work, |template, _| {
            if template.name == "boom.j2" {
                panic!("analyzer crashed on {}", template.name);
            }
            Ok(Verdict::Valid)
        })
        .await
        .unwrap();

        assert_eq!(results.len(), 4);
        assert!(matches!(&results[0], Some(Ok(outcomes)) if outcomes.len() == 1));
        assert!(results[1].is_none());
        match &results[2] {
            Some(Err(message)) => assert!(message.contains("panicked")),
            other => panic!("expected a worker failure, got {other:?}"),
        }
        let names: Vec<&str> = match &results[3] {
            Some(Ok(outcomes)) => outcomes.iter().map(|(name, _)| name.as_str()).collect(),
            other => panic!("expected outcomes, got {other:?}"),
        };
        assert_eq!(names, vec!["b.j2", "c.j2"]);
    }

    #[tokio::test]
    async fn test_single_worker_still_fills_every_slot() {
        let work = vec![job(1, &["x.j2"]), job(0, &["y.j2"])];
        let results = run_validation_pool(1, 2, work, |_, _| Ok(Verdict::Valid))
            .await
            .unwrap();
        assert!(results.iter().all(|slot| matches!(slot, Some(Ok(_)))));
    }
}

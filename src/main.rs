use clap::Parser;
use homelab_compiler::app::{default_manifest_emitters, default_service_emitters};
use homelab_compiler::core::ConfigProvider;
use homelab_compiler::utils::error::{CompileError, ErrorSeverity};
use homelab_compiler::utils::{logger, validation::Validate};
use homelab_compiler::{
    CliConfig, CompileOptions, CompileReport, Compiler, FsTemplateSource, HomelabConfig,
    LocalStorage,
};

fn exit_code(e: &CompileError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn fail(e: CompileError) -> ! {
    tracing::error!(
        "❌ Compilation aborted: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(exit_code(&e));
}

fn print_summary(report: &CompileReport) {
    println!(
        "{} service order: {}",
        if report.dry_run { "🔎" } else { "📋" },
        report.service_order.join(" -> ")
    );
    for service in &report.services {
        if service.succeeded() {
            println!("✅ {} on {} ({} files)", service.name, service.host, service.artifacts.len());
        } else {
            for failure in &service.failures {
                println!("❌ {} on {}: {}", service.name, service.host, failure);
            }
        }
    }
    for manifest in &report.manifests {
        if let Some(error) = &manifest.error {
            println!("❌ {}: {}", manifest.emitter, error);
        }
    }
    println!(
        "📊 {}/{} services succeeded, {} artifacts{}",
        report.summary.services_succeeded,
        report.summary.services_total,
        report.summary.artifacts,
        if report.dry_run { " (dry run)" } else { "" }
    );
}

#[tokio::main]
async fn main() {
    let config = CliConfig::parse();

    if config.json_logs {
        logger::init_json_logger(config.verbose);
    } else {
        logger::init_cli_logger(config.verbose);
    }
    tracing::info!("Starting homelab-compiler");
    tracing::debug!("CLI config: {:?}", config);

    if let Err(e) = config.validate() {
        fail(e);
    }

    let model = match HomelabConfig::from_file(config.config_path()).and_then(HomelabConfig::into_model) {
        Ok(model) => model,
        Err(e) => fail(e),
    };

    let options = CompileOptions::from_provider(&config, &model);
    let compiler = Compiler::new(
        LocalStorage::new(config.output_path()),
        FsTemplateSource::new(config.templates_path()),
        options,
    )
    .with_service_emitters(default_service_emitters())
    .with_manifest_emitters(default_manifest_emitters());

    let report = match compiler.compile(&model).await {
        Ok(report) => report,
        Err(e) => fail(e),
    };

    if let Some(path) = &config.report {
        let written = report.to_json().and_then(|json| {
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            Ok(std::fs::write(path, json)?)
        });
        match written {
            Ok(()) => tracing::info!("📁 Report saved to: {}", path),
            Err(e) => fail(e),
        }
    }

    print_summary(&report);
    if report.has_failures() {
        std::process::exit(1);
    }
}

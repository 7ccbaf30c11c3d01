use clap::Parser;
use homelab_compiler::core::inventory::variables_of;
use homelab_compiler::core::TemplateSource;
use homelab_compiler::utils::logger;
use homelab_compiler::FsTemplateSource;
use std::path::Path;

#[derive(Parser)]
#[command(name = "template-lint")]
#[command(about = "List the variables each service template reads and report syntax errors")]
struct Args {
    /// Template root, one directory per service
    #[arg(short, long, default_value = "templates")]
    templates: String,

    /// Only lint these services
    #[arg(short, long, value_delimiter = ',')]
    service: Vec<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

async fn service_dirs(root: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    let services = if args.service.is_empty() {
        match service_dirs(Path::new(&args.templates)).await {
            Ok(names) => names,
            Err(e) => {
                eprintln!("❌ Cannot read template root '{}': {}", args.templates, e);
                std::process::exit(1);
            }
        }
    } else {
        args.service.clone()
    };

    let source = FsTemplateSource::new(&args.templates);
    let mut errors = 0usize;
    for service in &services {
        let templates = match source.load_templates(service).await {
            Ok(Some(templates)) => templates,
            Ok(None) => {
                println!("❌ {}: no template directory at {}", service, source.location(service));
                errors += 1;
                continue;
            }
            Err(e) => {
                eprintln!("❌ {}: {}", service, e.user_friendly_message());
                std::process::exit(1);
            }
        };

        for template in &templates {
            match variables_of(template) {
                Ok(names) => {
                    let names: Vec<String> = names.into_iter().collect();
                    println!("✅ {}/{}: {}", service, template.name, names.join(", "));
                }
                Err(e) => {
                    errors += 1;
                    println!("❌ {}/{}: {}", service, template.name, e);
                    println!("   {}", e.fragment);
                }
            }
        }
    }

    tracing::info!("📊 Linted {} services, {} problems", services.len(), errors);
    if errors > 0 {
        std::process::exit(1);
    }
}

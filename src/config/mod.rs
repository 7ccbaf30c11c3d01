pub mod homelab_config;

pub use homelab_config::{HomelabConfig, SourceFormat};

#[cfg(feature = "cli")]
pub use cli_args::CliConfig;

#[cfg(feature = "cli")]
mod cli_args {
    use crate::core::compiler::MAX_JOBS;
    use crate::core::ConfigProvider;
    use crate::utils::error::Result;
    use crate::utils::validation::{self, Validate};
    use clap::Parser;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, Parser)]
    #[command(name = "homelab-compiler")]
    #[command(about = "Compile a homelab description into infrastructure and provisioning files")]
    pub struct CliConfig {
        #[arg(long, default_value = "config/homelab.yml")]
        pub config: String,

        /// One directory per service, holding its `*.j2` templates
        #[arg(long, default_value = "templates")]
        pub templates: String,

        #[arg(long, default_value = ".")]
        pub output: String,

        /// Validation workers (default 4, or `validation.jobs` from the config file)
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..=256))]
        pub jobs: Option<u16>,

        /// Extra names known to exist at deploy time
        #[arg(long = "allow-var", value_delimiter = ',')]
        pub allow_vars: Vec<String>,

        #[arg(long, help = "Validate and report without writing any file")]
        pub dry_run: bool,

        /// Write the JSON run report to this path
        #[arg(long)]
        pub report: Option<String>,

        #[arg(long, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, help = "Emit logs as JSON lines")]
        pub json_logs: bool,
    }

    impl ConfigProvider for CliConfig {
        fn config_path(&self) -> &str {
            &self.config
        }

        fn templates_path(&self) -> &str {
            &self.templates
        }

        fn output_path(&self) -> &str {
            &self.output
        }

        fn jobs(&self) -> Option<usize> {
            self.jobs.map(usize::from)
        }

        fn dry_run(&self) -> bool {
            self.dry_run
        }

        fn extra_external_names(&self) -> &[String] {
            &self.allow_vars
        }
    }

    impl Validate for CliConfig {
        fn validate(&self) -> Result<()> {
            validation::validate_path("config", &self.config)?;
            validation::validate_path("templates", &self.templates)?;
            validation::validate_path("output", &self.output)?;
            if let Some(jobs) = self.jobs() {
                validation::validate_range("jobs", jobs, 1, MAX_JOBS)?;
            }
            if let Some(report) = &self.report {
                validation::validate_path("report", report)?;
            }
            for name in &self.allow_vars {
                validation::validate_non_empty_string("allow-var", name)?;
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = CliConfig::parse_from(["homelab-compiler"]);
            assert_eq!(config.config_path(), "config/homelab.yml");
            assert_eq!(config.templates_path(), "templates");
            assert_eq!(config.output_path(), ".");
            assert_eq!(ConfigProvider::jobs(&config), None);
            assert!(!config.dry_run);
            assert!(config.validate().is_ok());
        }

        #[test]
        fn test_flags() {
            let config = CliConfig::parse_from([
                "homelab-compiler",
                "--jobs",
                "8",
                "--allow-var",
                "vault_token,backup_key",
                "--dry-run",
                "--report",
                "out/report.json",
            ]);
            assert_eq!(ConfigProvider::jobs(&config), Some(8));
            assert_eq!(config.extra_external_names(), ["vault_token", "backup_key"]);
            assert!(config.dry_run());
            assert_eq!(config.report.as_deref(), Some("out/report.json"));
        }

        #[test]
        fn test_jobs_out_of_range_rejected() {
            assert!(CliConfig::try_parse_from(["homelab-compiler", "--jobs", "0"]).is_err());
            assert!(CliConfig::try_parse_from(["homelab-compiler", "--jobs", "300"]).is_err());
        }

        #[test]
        fn test_empty_allow_var_rejected() {
            let mut config = CliConfig::parse_from(["homelab-compiler"]);
            config.allow_vars.push("  ".to_string());
            assert!(config.validate().is_err());
        }
    }
}

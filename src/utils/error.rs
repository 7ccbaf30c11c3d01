use crate::core::inventory::TemplateSyntaxError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Configuration parse error in {source_name}: {message}")]
    ConfigParseError { source_name: String, message: String },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Cyclic dependency between services: {}", .cycle.join(", "))]
    CyclicDependency {
        cycle: Vec<String>,
        blocked: Vec<String>,
    },

    #[error("{0}")]
    TemplateSyntax(#[from] TemplateSyntaxError),

    #[error("Writing {path} failed: {source}")]
    WriteError {
        path: String,
        source: std::io::Error,
    },

    #[error("Emitter '{emitter}' failed: {message}")]
    EmissionError { emitter: String, message: String },

    #[error("Validation worker failed: {0}")]
    WorkerError(#[from] tokio::task::JoinError),

    #[error("Worker pool error: {0}")]
    WorkerPoolError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Structural,
    Template,
    Emission,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CompileError {
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn write(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::WriteError {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn emission(emitter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmissionError {
            emitter: emitter.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigParseError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. }
            | Self::YamlError(_) => ErrorCategory::Configuration,
            Self::CyclicDependency { .. } => ErrorCategory::Structural,
            Self::TemplateSyntax(_) => ErrorCategory::Template,
            Self::EmissionError { .. } | Self::SerializationError(_) => ErrorCategory::Emission,
            Self::IoError(_)
            | Self::WriteError { .. }
            | Self::WorkerError(_)
            | Self::WorkerPoolError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Template => ErrorSeverity::Medium,
            ErrorCategory::Emission => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Structural => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// Structural errors abort the whole run before anything is written.
    pub fn is_structural(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Configuration | ErrorCategory::Structural
        )
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::ConfigParseError { .. } | Self::YamlError(_) => {
                "Check the configuration file syntax (YAML or TOML) and indentation".to_string()
            }
            Self::ConfigValidationError { field, .. }
            | Self::InvalidConfigValueError { field, .. }
            | Self::MissingConfigError { field } => {
                format!("Fix the '{}' entry in the configuration file", field)
            }
            Self::CyclicDependency { cycle, .. } => format!(
                "Remove one of the depends_on edges between: {}",
                cycle.join(", ")
            ),
            Self::TemplateSyntax(e) => format!(
                "Fix the template syntax in '{}' near line {}",
                e.template, e.line
            ),
            Self::EmissionError { emitter, .. } => {
                format!("Inspect the model fields consumed by the '{}' emitter", emitter)
            }
            Self::SerializationError(_) => "Check for non-serializable service parameters".to_string(),
            Self::IoError(_) => "Check file permissions and that the paths exist".to_string(),
            Self::WriteError { path, .. } => {
                format!("Check that {} is a writable file location in the output directory", path)
            }
            Self::WorkerError(_) | Self::WorkerPoolError(_) => {
                "Re-run with --jobs 1 and --verbose to isolate the failure".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::CyclicDependency { cycle, blocked } => {
                let mut msg = format!("Services form a dependency cycle: {}", cycle.join(" <-> "));
                if !blocked.is_empty() {
                    msg.push_str(&format!(" (also blocked: {})", blocked.join(", ")));
                }
                msg
            }
            Self::IoError(e) => format!("File system error: {}", e),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;

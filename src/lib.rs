pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{FsTemplateSource, InMemoryTemplateSource, LocalStorage};
pub use config::HomelabConfig;
pub use core::{CompileOptions, CompileReport, Compiler};
pub use domain::model::ConfigModel;
pub use utils::error::{CompileError, Result};

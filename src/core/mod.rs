pub mod compiler;
pub mod context;
pub mod graph;
pub mod inventory;
pub mod report;
pub mod validator;

pub use crate::domain::model::{ConfigModel, Service, Template};
pub use crate::domain::ports::{ConfigProvider, StagedFile, Storage, TemplateSource};
pub use crate::utils::error::Result;
pub use compiler::{CompileOptions, Compiler};
pub use report::CompileReport;

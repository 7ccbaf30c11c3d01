// Adapters: filesystem and in-memory implementations of the domain ports.

pub mod storage;
pub mod templates;

pub use storage::LocalStorage;
pub use templates::{FsTemplateSource, InMemoryTemplateSource};

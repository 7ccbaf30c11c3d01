// Application layer: the concrete artifact emitters plugged into the compiler.

pub mod emitters;

pub use emitters::{default_manifest_emitters, default_service_emitters};

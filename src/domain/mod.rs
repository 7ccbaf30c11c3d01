// Domain layer: model types and ports (interfaces) shared by the compiler core and the emitters.

pub mod model;
pub mod ports;

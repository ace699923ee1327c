// Domain layer: core models and ports (interfaces) the pipeline depends on.

pub mod model;
pub mod ports;

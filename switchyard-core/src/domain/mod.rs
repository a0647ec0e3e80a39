//! Domain models: target descriptors and the table that holds them.

pub mod routing;
pub mod target;

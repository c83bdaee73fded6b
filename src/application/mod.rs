// src/application/mod.rs
pub mod media_resolver;
pub mod package_builder;

pub use media_resolver::{MediaResolver, MediaStream};
pub use package_builder::PackageBuilder;

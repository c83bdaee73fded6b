// src/infrastructure/mod.rs
pub mod collection;
pub mod config;
pub mod identifier;
pub mod media;
pub mod package;
pub mod resolver;
pub mod schema;

pub use collection::CollectionAssembler;
pub use config::PackageDefinition;
pub use identifier::{derive_dedup_key, IdGenerator};
pub use media::{MediaFiles, MediaManifest};
pub use package::PackageWriter;
pub use resolver::{DirectoryResolver, MemoryResolver};

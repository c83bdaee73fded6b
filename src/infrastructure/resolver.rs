// src/infrastructure/resolver.rs
use crate::application::{MediaResolver, MediaStream};
use crate::domain::PackageError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, instrument};

/// Resolves media filenames against a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Only plain relative paths below the root are accepted
    fn locate(&self, filename: &str) -> Result<PathBuf, PackageError> {
        let relative = Path::new(filename);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if filename.is_empty() || !plain {
            return Err(PackageError::InvalidMediaPath(filename.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl MediaResolver for DirectoryResolver {
    #[instrument(level = "debug", skip(self))]
    async fn resolve(&self, filename: &str) -> Result<MediaStream, PackageError> {
        let path = self.locate(filename)?;

        match tokio::fs::File::open(&path).await {
            Ok(file) => {
                debug!(?path, "Opened media file");
                Ok(Box::pin(file))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PackageError::MediaNotFound(filename.to_string()))
            }
            Err(e) => Err(PackageError::Io(e)),
        }
    }
}

/// Media held in memory, keyed by filename
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(name, bytes);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(name.into(), bytes.into());
    }
}

#[async_trait]
impl MediaResolver for MemoryResolver {
    async fn resolve(&self, filename: &str) -> Result<MediaStream, PackageError> {
        let bytes = self
            .files
            .get(filename)
            .cloned()
            .ok_or_else(|| PackageError::MediaNotFound(filename.to_string()))?;
        Ok(Box::pin(Cursor::new(bytes)))
    }
}

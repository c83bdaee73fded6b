// src/application/media_resolver.rs
use crate::domain::PackageError;
use async_trait::async_trait;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Byte stream for one media file, consumed exactly once by the archive
pub type MediaStream = Pin<Box<dyn AsyncRead + Send + 'static>>;

/// Source of media bytes for a package build.
///
/// The builder calls `resolve` once per distinct filename, possibly for
/// several files at the same time. Retries and timeouts are the
/// implementation's business; a returned error fails the whole build.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, filename: &str) -> Result<MediaStream, PackageError>;
}

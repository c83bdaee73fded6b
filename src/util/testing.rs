// src/util/testing.rs

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::env;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::{debug, info};
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::application::{MediaResolver, MediaStream};
use crate::domain::PackageError;

enum MediaBehavior {
    Bytes(Vec<u8>),
    /// Yields `prefix`, then fails the read
    BrokenStream(Vec<u8>),
    Missing,
}

/// Shared mock resolver for testing builds that depend on MediaResolver
///
/// Unknown filenames resolve to `MediaNotFound`. Every call is counted so
/// tests can check a file was fetched once, and every stream handed out is
/// tracked until dropped so tests can bound how many are open at a time.
///
/// # Examples
///
/// ```
/// use apkgstream::util::testing::MockMediaResolver;
///
/// let resolver = MockMediaResolver::builder()
///     .with_media("a.mp3", b"sound".to_vec())
///     .with_broken_stream("b.png", b"partial".to_vec())
///     .build();
/// assert_eq!(resolver.calls(), 0);
/// ```
pub struct MockMediaResolver {
    media: HashMap<String, MediaBehavior>,
    calls: Arc<AtomicUsize>,
    open: Arc<OpenStreams>,
}

impl MockMediaResolver {
    pub fn builder() -> MockMediaResolverBuilder {
        MockMediaResolverBuilder::new()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Streams handed out and not yet dropped
    pub fn open_streams(&self) -> usize {
        self.open.current.load(Ordering::SeqCst)
    }

    /// Most streams that were open at the same time
    pub fn peak_open_streams(&self) -> usize {
        self.open.peak.load(Ordering::SeqCst)
    }

    fn track<R: AsyncRead + Send + 'static>(&self, inner: R) -> MediaStream {
        let now = self.open.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.open.peak.fetch_max(now, Ordering::SeqCst);
        Box::pin(TrackedStream {
            inner: Box::pin(inner),
            open: Arc::clone(&self.open),
        })
    }
}

#[derive(Default)]
struct OpenStreams {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct TrackedStream {
    inner: MediaStream,
    open: Arc<OpenStreams>,
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_read(cx, buf)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.open.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaResolver for MockMediaResolver {
    async fn resolve(&self, filename: &str) -> Result<MediaStream, PackageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.media.get(filename) {
            Some(MediaBehavior::Bytes(bytes)) => Ok(self.track(io::Cursor::new(bytes.clone()))),
            Some(MediaBehavior::BrokenStream(prefix)) => Ok(self.track(BrokenReader {
                prefix: Some(prefix.clone()),
            })),
            Some(MediaBehavior::Missing) | None => {
                Err(PackageError::MediaNotFound(filename.to_string()))
            }
        }
    }
}

/// Reader that hands out its prefix once and then errors
pub struct BrokenReader {
    prefix: Option<Vec<u8>>,
}

impl AsyncRead for BrokenReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.prefix.take() {
            Some(prefix) if !prefix.is_empty() => {
                let n = prefix.len().min(buf.remaining());
                buf.put_slice(&prefix[..n]);
                Poll::Ready(Ok(()))
            }
            _ => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "media source went away",
            ))),
        }
    }
}

/// Builder for MockMediaResolver
///
/// Provides a fluent interface for configuring mock behavior.
pub struct MockMediaResolverBuilder {
    media: HashMap<String, MediaBehavior>,
}

impl MockMediaResolverBuilder {
    pub fn new() -> Self {
        Self {
            media: HashMap::new(),
        }
    }

    /// Serve these bytes for filename
    pub fn with_media(mut self, filename: &str, bytes: Vec<u8>) -> Self {
        self.media
            .insert(filename.to_string(), MediaBehavior::Bytes(bytes));
        self
    }

    /// Resolve filename, but fail the stream after `prefix`
    pub fn with_broken_stream(mut self, filename: &str, prefix: Vec<u8>) -> Self {
        self.media
            .insert(filename.to_string(), MediaBehavior::BrokenStream(prefix));
        self
    }

    /// Fail resolution of filename with MediaNotFound
    pub fn with_missing(mut self, filename: &str) -> Self {
        self.media
            .insert(filename.to_string(), MediaBehavior::Missing);
        self
    }

    pub fn build(self) -> MockMediaResolver {
        MockMediaResolver {
            media: self.media,
            calls: Arc::new(AtomicUsize::new(0)),
            open: Arc::new(OpenStreams::default()),
        }
    }
}

impl Default for MockMediaResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Append-only sink that cannot seek; clones share the same bytes so a test
/// can inspect what was written after handing the sink away.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.bytes
            .lock()
            .map(|bytes| bytes.clone())
            .unwrap_or_default()
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .bytes
            .lock()
            .map_err(|_| io::Error::other("shared buffer lock poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn init_test_setup() -> Result<()> {
    // Set up logging first
    setup_test_logging();

    info!("Test Setup complete");
    Ok(())
}

fn setup_test_logging() {
    debug!("INIT: Attempting logger init from testing.rs");
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "trace");
    }

    // Create a filter for noisy modules
    let noisy_modules = ["mio", "tokio", "runtime"];
    let module_filter = filter_fn(move |metadata| {
        !noisy_modules
            .iter()
            .any(|name| metadata.target().starts_with(name))
    });

    // Set up the subscriber with environment filter
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    // Build and set the subscriber
    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(module_filter)
            .with_filter(env_filter),
    );

    // Only set if we haven't already set a global subscriber
    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[ctor::ctor]
    fn init() {
        init_test_setup().expect("Failed to initialize test setup");
    }

    #[tokio::test]
    async fn given_media_added_when_resolving_then_streams_bytes() {
        let resolver = MockMediaResolver::builder()
            .with_media("a.mp3", b"sound".to_vec())
            .build();

        let mut stream = resolver.resolve("a.mp3").await.expect("Media should exist");
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();

        assert_eq!(out, b"sound");
        assert_eq!(resolver.calls(), 1);
        assert_eq!(resolver.open_streams(), 1);
        drop(stream);
        assert_eq!(resolver.open_streams(), 0);
        assert_eq!(resolver.peak_open_streams(), 1);
    }

    #[tokio::test]
    async fn given_unknown_file_when_resolving_then_returns_not_found() {
        let resolver = MockMediaResolver::builder().with_missing("x.png").build();

        assert!(matches!(
            resolver.resolve("x.png").await,
            Err(PackageError::MediaNotFound(_))
        ));
        assert!(matches!(
            resolver.resolve("y.png").await,
            Err(PackageError::MediaNotFound(_))
        ));
        assert_eq!(resolver.calls(), 2);
    }

    #[tokio::test]
    async fn given_broken_stream_when_reading_then_fails_after_prefix() {
        let resolver = MockMediaResolver::builder()
            .with_broken_stream("b.png", b"par".to_vec())
            .build();

        let mut stream = resolver.resolve("b.png").await.unwrap();
        let mut buf = [0u8; 16];
        let n = stream.read(&mut buf).await.unwrap();
        let err = stream.read(&mut buf).await.unwrap_err();

        assert_eq!(&buf[..n], b"par");
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn given_shared_buffer_when_writing_through_clone_then_original_sees_bytes() {
        use std::io::Write;
        let buffer = SharedBuffer::new();
        let mut sink = buffer.clone();

        sink.write_all(b"abc").unwrap();

        assert_eq!(buffer.contents(), b"abc");
    }
}

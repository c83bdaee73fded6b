//! Streaming `.apkg` writer.
//!
//! The zip engine lives on a blocking thread and writes one entry at a time,
//! in the order entries are registered. It only ever appends to the sink:
//! entries carry data descriptors instead of being patched afterwards, so
//! pipes, sockets and request bodies work as well as files.
//!
//! Media streams are not read until the engine reaches their entry. Waiting
//! entries hold an open stream but no bytes, which keeps memory bounded by
//! one entry's chunk buffer regardless of how many files a deck has.

use crate::application::MediaStream;
use crate::constants::{
    COLLECTION_ENTRY, COMPRESSION_LEVEL, MEDIA_CHUNK_BUFFER, MEDIA_CHUNK_SIZE,
    MEDIA_MANIFEST_ENTRY,
};
use crate::domain::PackageError;
use crate::infrastructure::media::MediaManifest;
use std::io::{self, Seek, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zip::write::{SimpleFileOptions, StreamWriter};
use zip::{CompressionMethod, ZipWriter};

type Chunk = io::Result<Vec<u8>>;
type Ack = oneshot::Sender<Result<u64, PackageError>>;

enum EntryBody {
    Bytes(Vec<u8>),
    Stream {
        filename: String,
        /// Fired when the engine starts this entry; the producer reads nothing before
        turn: oneshot::Sender<()>,
        chunks: mpsc::Receiver<Chunk>,
    },
}

struct EntryCommand {
    name: String,
    body: EntryBody,
    ack: Ack,
}

/// Archive under construction. `Open` until [`finalize`](Self::finalize),
/// after which every call fails with `AlreadyFinalized`.
pub struct PackageWriter<W> {
    commands: Mutex<Option<mpsc::UnboundedSender<EntryCommand>>>,
    engine: Mutex<Option<JoinHandle<Result<W, PackageError>>>>,
    poisoned: Arc<AtomicBool>,
}

impl<W> PackageWriter<W>
where
    W: Write + Send + 'static,
{
    /// Start the archive engine on a blocking thread. Must be called from
    /// within a tokio runtime.
    pub fn new(sink: W) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let poisoned = Arc::new(AtomicBool::new(false));
        let guard = SinkGuard {
            inner: sink,
            poisoned: Arc::clone(&poisoned),
        };
        let engine = tokio::task::spawn_blocking(move || run_engine(guard, rx));

        Self {
            commands: Mutex::new(Some(tx)),
            engine: Mutex::new(Some(engine)),
            poisoned,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.commands
            .lock()
            .map(|commands| commands.is_none())
            .unwrap_or(true)
    }

    /// Append the exported collection as `collection.anki2`
    pub async fn add_database_payload(&self, bytes: Vec<u8>) -> Result<(), PackageError> {
        let done = self.submit(COLLECTION_ENTRY.to_string(), EntryBody::Bytes(bytes))?;
        acknowledged(done).await.map(|_| ())
    }

    /// Stream one media file into the entry named after its index.
    ///
    /// Registers the entry at once but reads nothing until the engine gets
    /// to it. Resolves once the engine has consumed the whole stream.
    pub async fn add_media_entry(
        &self,
        index: usize,
        filename: &str,
        mut stream: MediaStream,
    ) -> Result<(), PackageError> {
        let name = index.to_string();
        let (chunks, rx) = mpsc::channel(MEDIA_CHUNK_BUFFER);
        let (turn_tx, turn) = oneshot::channel();
        let done = self.submit(
            name.clone(),
            EntryBody::Stream {
                filename: filename.to_string(),
                turn: turn_tx,
                chunks: rx,
            },
        )?;

        if turn.await.is_err() {
            // engine stopped before reaching this entry
            return Err(engine_failure(done).await);
        }

        let mut buf = vec![0u8; MEDIA_CHUNK_SIZE];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if chunks.send(Ok(buf[..n].to_vec())).await.is_err() {
                        return Err(engine_failure(done).await);
                    }
                }
                Err(source) => {
                    warn!(entry = %name, filename, error = %source, "Media stream failed");
                    let _ = chunks
                        .send(Err(io::Error::new(source.kind(), source.to_string())))
                        .await;
                    return Err(PackageError::MediaStream {
                        filename: filename.to_string(),
                        source,
                    });
                }
            }
        }
        drop(chunks);

        let bytes = acknowledged(done).await?;
        debug!(entry = %name, filename, bytes, "Media entry written");
        Ok(())
    }

    /// Register every stream at once and wait for all of them.
    /// Returns the first failure; later ones are logged.
    pub async fn add_media_entries(
        &self,
        entries: Vec<(usize, String, MediaStream)>,
    ) -> Result<(), PackageError> {
        let pending = entries
            .into_iter()
            .map(|(index, filename, stream)| async move {
                self.add_media_entry(index, &filename, stream).await
            });
        first_failure(futures::future::join_all(pending).await)
    }

    /// Append the manifest as the `media` entry
    pub async fn add_manifest(&self, manifest: &MediaManifest) -> Result<(), PackageError> {
        let json = manifest.to_json()?;
        let done = self.submit(MEDIA_MANIFEST_ENTRY.to_string(), EntryBody::Bytes(json.into_bytes()))?;
        acknowledged(done).await.map(|_| ())
    }

    /// Close the archive and hand back the flushed sink.
    ///
    /// Phase one tells the engine no more entries are coming; phase two waits
    /// for it to write the central directory and flush the sink.
    pub async fn finalize(&self) -> Result<W, PackageError> {
        let commands = self
            .commands
            .lock()
            .map_err(|_| PackageError::EngineStopped)?
            .take()
            .ok_or(PackageError::AlreadyFinalized)?;
        drop(commands);

        let engine = self
            .engine
            .lock()
            .map_err(|_| PackageError::EngineStopped)?
            .take()
            .ok_or(PackageError::AlreadyFinalized)?;

        debug!("Waiting for archive engine to finish");
        let sink = engine.await.map_err(|e| PackageError::Io(io::Error::other(e)))??;
        info!("Package finalized");
        Ok(sink)
    }

    fn submit(
        &self,
        name: String,
        body: EntryBody,
    ) -> Result<oneshot::Receiver<Result<u64, PackageError>>, PackageError> {
        let sender = self
            .commands
            .lock()
            .map_err(|_| PackageError::EngineStopped)?
            .clone()
            .ok_or(PackageError::AlreadyFinalized)?;

        let (ack, done) = oneshot::channel();
        sender
            .send(EntryCommand { name, body, ack })
            .map_err(|_| PackageError::EngineStopped)?;
        Ok(done)
    }
}

impl<W> Drop for PackageWriter<W> {
    fn drop(&mut self) {
        // Abandoned before finalize: never let the engine write a central
        // directory for a half-built package.
        let open = self
            .commands
            .get_mut()
            .map(|commands| commands.is_some())
            .unwrap_or(false);
        if open {
            // poison first: the engine checks the flag once the channel closes
            self.poisoned.store(true, Ordering::SeqCst);
            warn!("Package writer dropped before finalize; archive left truncated");
        }
    }
}

async fn acknowledged(
    done: oneshot::Receiver<Result<u64, PackageError>>,
) -> Result<u64, PackageError> {
    done.await.map_err(|_| PackageError::EngineStopped)?
}

/// Why the engine stopped taking this entry's bytes
async fn engine_failure(done: oneshot::Receiver<Result<u64, PackageError>>) -> PackageError {
    match done.await {
        Ok(Err(e)) => e,
        _ => PackageError::EngineStopped,
    }
}

/// First error wins, except that `EngineStopped` gives way to the failure
/// that stopped the engine. The rest are logged rather than dropped silently.
pub(crate) fn first_failure(results: Vec<Result<(), PackageError>>) -> Result<(), PackageError> {
    let mut first: Option<PackageError> = None;
    for e in results.into_iter().filter_map(Result::err) {
        match first {
            Some(PackageError::EngineStopped) if !matches!(e, PackageError::EngineStopped) => {
                first = Some(e);
            }
            Some(_) => warn!(error = %e, "Additional package failure"),
            None => first = Some(e),
        }
    }
    first.map_or(Ok(()), Err)
}

/// Sink wrapper whose writes fail once the build is known to be broken, so a
/// failed package never ends up with a readable central directory.
struct SinkGuard<W> {
    inner: W,
    poisoned: Arc<AtomicBool>,
}

impl<W> SinkGuard<W> {
    fn check(&self) -> io::Result<()> {
        if self.poisoned.load(Ordering::SeqCst) {
            Err(io::Error::other("package build aborted"))
        } else {
            Ok(())
        }
    }
}

impl<W: Write> Write for SinkGuard<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check()?;
        self.inner.flush()
    }
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL))
}

fn run_engine<W: Write>(
    sink: SinkGuard<W>,
    mut commands: mpsc::UnboundedReceiver<EntryCommand>,
) -> Result<W, PackageError> {
    let poisoned = Arc::clone(&sink.poisoned);
    let mut zip = ZipWriter::new_stream(sink);

    while let Some(EntryCommand { name, body, ack }) = commands.blocking_recv() {
        match write_entry(&mut zip, &name, body) {
            Ok(bytes) => {
                debug!(entry = %name, bytes, "Entry complete");
                let _ = ack.send(Ok(bytes));
            }
            Err(e) => {
                poisoned.store(true, Ordering::SeqCst);
                let summary = format!("entry '{name}' failed: {e}");
                let _ = ack.send(Err(e));
                return Err(PackageError::Io(io::Error::other(summary)));
            }
        }
    }

    if poisoned.load(Ordering::SeqCst) {
        return Err(PackageError::EngineStopped);
    }

    let mut sink = zip.finish().map(StreamWriter::into_inner)?;
    sink.flush()?;
    Ok(sink.inner)
}

fn write_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    body: EntryBody,
) -> Result<u64, PackageError> {
    zip.start_file(name, entry_options())?;

    match body {
        EntryBody::Bytes(data) => {
            zip.write_all(&data)?;
            Ok(data.len() as u64)
        }
        EntryBody::Stream {
            filename,
            turn,
            mut chunks,
        } => {
            if turn.send(()).is_err() {
                return Err(PackageError::Io(io::Error::other(format!(
                    "media entry '{name}' abandoned by its producer"
                ))));
            }
            let mut total = 0u64;
            while let Some(chunk) = chunks.blocking_recv() {
                let chunk = chunk.map_err(|source| PackageError::MediaStream {
                    filename: filename.clone(),
                    source,
                })?;
                zip.write_all(&chunk)?;
                total += chunk.len() as u64;
            }
            Ok(total)
        }
    }
}

// src/application/package_builder.rs
use crate::application::MediaResolver;
use crate::constants::MEDIA_FETCH_CONCURRENCY;
use crate::domain::PackageError;
use crate::infrastructure::collection::CollectionAssembler;
use crate::infrastructure::config::PackageDefinition;
use crate::infrastructure::identifier::IdGenerator;
use crate::infrastructure::media::{self, build_manifest, MediaManifest};
use crate::infrastructure::package::{first_failure, PackageWriter};
use futures::stream::{self, StreamExt};
use std::io::Write;
use tracing::{debug, error, info, instrument};

/// Turns a package definition into a finished `.apkg` written to a sink
pub struct PackageBuilder<R: MediaResolver> {
    resolver: R,
    concurrency: usize,
}

impl<R: MediaResolver> PackageBuilder<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            concurrency: MEDIA_FETCH_CONCURRENCY,
        }
    }

    /// Cap on media files resolved and held open at once (at least one)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Build with ids seeded from the current time
    pub async fn build<W>(&self, definition: &PackageDefinition, sink: W) -> Result<W, PackageError>
    where
        W: Write + Send + 'static,
    {
        self.build_with_ids(definition, sink, IdGenerator::new())
            .await
    }

    pub async fn build_with_ids<W>(
        &self,
        definition: &PackageDefinition,
        sink: W,
        ids: IdGenerator,
    ) -> Result<W, PackageError>
    where
        W: Write + Send + 'static,
    {
        let mut collection = CollectionAssembler::new(ids);
        self.build_with_collection(definition, sink, &mut collection)
            .await
    }

    /// Build into a caller-owned assembler. The assembler is closed when this
    /// returns, whether or not the build succeeded.
    #[instrument(
        level = "info",
        skip_all,
        fields(deck = %definition.deck.name, notes = definition.notes.len())
    )]
    pub async fn build_with_collection<W>(
        &self,
        definition: &PackageDefinition,
        sink: W,
        collection: &mut CollectionAssembler,
    ) -> Result<W, PackageError>
    where
        W: Write + Send + 'static,
    {
        let result = self.assemble(collection, definition, sink).await;
        collection.close();

        match &result {
            Ok(_) => info!("Package built"),
            Err(e) => error!(error = %e, "Package build failed"),
        }
        result
    }

    async fn assemble<W>(
        &self,
        collection: &mut CollectionAssembler,
        definition: &PackageDefinition,
        sink: W,
    ) -> Result<W, PackageError>
    where
        W: Write + Send + 'static,
    {
        collection.init()?;
        let model_id = collection.add_model(definition.model.clone())?;
        let deck_id = collection.add_deck(definition.deck.clone())?;

        let files = media::collect(definition.notes.iter().map(|n| n.fields.iter()));
        let manifest = build_manifest(files.as_slice());
        debug!(media_files = files.len(), "Scanned notes for media references");

        for note in &definition.notes {
            collection.add_note(note, model_id, deck_id)?;
        }
        let payload = collection.export()?;
        info!(bytes = payload.len(), "Collection exported");

        let writer = PackageWriter::new(sink);
        let (media, database, listing) = tokio::join!(
            self.stream_media(&writer, &manifest),
            writer.add_database_payload(payload),
            writer.add_manifest(&manifest),
        );
        // A broken media stream stops the engine, which the other two then
        // report as EngineStopped; keep the root cause.
        first_failure(vec![media, database, listing])?;

        writer.finalize().await
    }

    /// Resolve files and hand their streams to the writer, at most
    /// `concurrency` at a time. A slot frees up once the engine has consumed
    /// that file's stream.
    async fn stream_media<W>(
        &self,
        writer: &PackageWriter<W>,
        manifest: &MediaManifest,
    ) -> Result<(), PackageError>
    where
        W: Write + Send + 'static,
    {
        let results: Vec<Result<(), PackageError>> = stream::iter(manifest.iter())
            .map(|(index, filename)| async move {
                let media = self.resolver.resolve(filename).await?;
                writer.add_media_entry(index, filename, media).await
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        first_failure(results)
    }
}

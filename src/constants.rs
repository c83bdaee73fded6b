// src/constants.rs
//
// Format constants shared across the package pipeline. Values here are part of
// the on-disk format Anki expects; changing any of them breaks compatibility.

/// Archive entry holding the exported SQLite database.
///
/// Used in: `infrastructure/package.rs`
pub const COLLECTION_ENTRY: &str = "collection.anki2";

/// Archive entry holding the JSON media manifest.
///
/// Used in: `infrastructure/package.rs`
pub const MEDIA_MANIFEST_ENTRY: &str = "media";

/// Separator between field values in `notes.flds`.
///
/// Used in: `infrastructure/collection.rs`
pub const FIELD_SEPARATOR: char = '\x1f';

/// Separator between field values when deriving a note guid.
///
/// Used in: `infrastructure/identifier.rs`
pub const DEDUP_KEY_SEPARATOR: &str = "__";

/// Symbol table for rendering note guids in base 91. Order must match Anki.
///
/// Used in: `infrastructure/identifier.rs`
pub const BASE91_ALPHABET: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!#$%&()*+,-./:;<=>?@[]^_`{|}~";

/// Legacy collection schema version written to `col.ver`.
///
/// Used in: `infrastructure/schema.rs`
pub const SCHEMA_VERSION: i64 = 11;

/// Id of Anki's built-in "Default" deck and deck options group.
///
/// Used in: `infrastructure/schema.rs`, `domain/model.rs`
pub const DEFAULT_DECK_ID: i64 = 1;

/// Update sequence number for rows that were never synced.
///
/// Used in: `infrastructure/collection.rs`, `domain/model.rs`, `domain/deck.rs`
pub const UNSYNCED_USN: i64 = -1;

/// Size of the read buffer when pumping a media stream into the archive.
///
/// Used in: `infrastructure/package.rs`
pub const MEDIA_CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered ahead of the archive engine for the entry it is writing.
/// Entries still waiting their turn buffer nothing.
///
/// Used in: `infrastructure/package.rs`
pub const MEDIA_CHUNK_BUFFER: usize = 8;

/// Deflate level applied to every archive entry.
///
/// Used in: `infrastructure/package.rs`
pub const COMPRESSION_LEVEL: i64 = 9;

/// Media files resolved and held open at the same time during a build.
///
/// Used in: `application/package_builder.rs`
pub const MEDIA_FETCH_CONCURRENCY: usize = 4;

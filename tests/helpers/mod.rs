use anyhow::{Context, Result};
use apkgstream::domain::{DeckDef, FieldDef, ModelDef, NoteDef, TemplateDef};
use apkgstream::infrastructure::PackageDefinition;
use rusqlite::Connection;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::ZipArchive;

pub const MODEL_ID: i64 = 1607392319;
pub const DECK_ID: i64 = 2059400110;

/// A finished package opened for inspection.
///
/// The embedded collection is unpacked into a temp dir so it can be queried
/// with plain SQL.
#[allow(dead_code)]
pub struct OpenedPackage {
    _temp_dir: TempDir,
    archive: ZipArchive<Cursor<Vec<u8>>>,
    pub collection_path: PathBuf,
}

#[allow(dead_code)]
impl OpenedPackage {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).context("Package is not a valid zip archive")?;

        let temp_dir = tempfile::tempdir().context("Failed to create temporary directory")?;
        let collection_path = temp_dir.path().join("collection.anki2");
        let mut db = Vec::new();
        archive
            .by_name("collection.anki2")
            .context("Package has no collection.anki2")?
            .read_to_end(&mut db)?;
        std::fs::write(&collection_path, db).context("Failed to unpack collection")?;

        Ok(Self {
            _temp_dir: temp_dir,
            archive,
            collection_path,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).context("Failed to read package file")?;
        Self::from_bytes(bytes)
    }

    /// Entry names sorted
    pub fn entry_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    pub fn entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.archive
            .by_name(name)
            .with_context(|| format!("Missing entry {name}"))?
            .read_to_end(&mut out)?;
        Ok(out)
    }

    pub fn manifest(&mut self) -> Result<serde_json::Value> {
        let bytes = self.entry("media")?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn connection(&self) -> Result<Connection> {
        Connection::open(&self.collection_path).context("Failed to open unpacked collection")
    }

    pub fn count(&self, table: &str) -> Result<i64> {
        let conn = self.connection()?;
        Ok(conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0))?)
    }

    /// Parsed JSON blob from the collection row (`models`, `decks`, ...)
    pub fn col_blob(&self, column: &str) -> Result<serde_json::Value> {
        let conn = self.connection()?;
        let text: String =
            conn.query_row(&format!("SELECT {column} FROM col WHERE id = 1"), [], |r| {
                r.get(0)
            })?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Basic two-field note type with fixed model and deck ids
#[allow(dead_code)]
pub fn basic_definition(notes: Vec<NoteDef>) -> PackageDefinition {
    PackageDefinition {
        model: ModelDef {
            id: Some(MODEL_ID),
            name: "Basic".to_string(),
            fields: vec![FieldDef::new("Front"), FieldDef::new("Back")],
            templates: vec![TemplateDef::new(
                "Card 1",
                "{{Front}}",
                "{{FrontSide}}<hr id=answer>{{Back}}",
            )],
            ..Default::default()
        },
        deck: DeckDef::new("Country Capitals").with_id(DECK_ID),
        notes,
    }
}

/// Same as `basic_definition` but with a reverse card template
#[allow(dead_code)]
pub fn reversed_definition(notes: Vec<NoteDef>) -> PackageDefinition {
    let mut definition = basic_definition(notes);
    definition
        .model
        .templates
        .push(TemplateDef::new("Card 2", "{{Back}}", "{{Front}}"));
    definition
}

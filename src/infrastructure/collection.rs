// src/infrastructure/collection.rs
use crate::constants::{COLLECTION_ENTRY, FIELD_SEPARATOR, UNSYNCED_USN};
use crate::domain::note::format_tags;
use crate::domain::{Card, Deck, DeckDef, Model, ModelDef, NoteDef, PackageError};
use crate::infrastructure::identifier::{derive_dedup_key, IdGenerator};
use crate::infrastructure::schema::{self, CollectionRow};
use chrono::{Timelike, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

enum State {
    Uninitialized,
    Open(Connection),
    Closed,
}

/// Builds the `collection.anki2` database for one package.
///
/// Owns the SQLite connection from `init()` until `close()`. Mutators must be
/// called sequentially; the orchestrator never shares an assembler.
pub struct CollectionAssembler {
    state: State,
    ids: IdGenerator,
    models: Vec<Model>,
    decks: Vec<Deck>,
    exported: bool,
}

impl CollectionAssembler {
    pub fn new(ids: IdGenerator) -> Self {
        Self {
            state: State::Uninitialized,
            ids,
            models: Vec::new(),
            decks: Vec::new(),
            exported: false,
        }
    }

    /// Create the in-memory database, schema and collection row.
    /// A second call is a no-op.
    #[instrument(level = "debug", skip(self))]
    pub fn init(&mut self) -> Result<(), PackageError> {
        match self.state {
            State::Open(_) => {
                debug!("Collection already initialized");
                return Ok(());
            }
            State::Closed => return Err(PackageError::Closed),
            State::Uninitialized => {}
        }

        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::SCHEMA_DDL)?;

        let now = Utc::now();
        let day_start = now
            .with_hour(0)
            .and_then(|t| t.with_minute(0))
            .and_then(|t| t.with_second(0))
            .map(|t| t.timestamp())
            .unwrap_or_else(|| now.timestamp());
        let row = CollectionRow::new(day_start, now.timestamp_millis());

        conn.execute(
            schema::INSERT_COLLECTION,
            params![
                row.created,
                row.modified,
                row.schema_modified,
                row.version,
                row.conf.to_string(),
                row.decks.to_string(),
                row.deck_conf.to_string(),
            ],
        )?;

        self.decks = vec![Deck::builtin_default(now.timestamp())];
        self.state = State::Open(conn);
        info!("Initialized in-memory collection");
        Ok(())
    }

    /// Register a note type. Re-adding an id replaces the earlier model and
    /// rewrites the whole `models` blob.
    #[instrument(level = "debug", skip(self, def), fields(name = %def.name))]
    pub fn add_model(&mut self, def: ModelDef) -> Result<i64, PackageError> {
        self.connection()?;

        let id = def.id.unwrap_or_else(|| self.ids.random_large_id());
        let model = Model::from_def(id, def, Utc::now().timestamp())?;
        let mut models = self.models.clone();
        upsert(&mut models, model, |m| m.id == id);

        let blob = keyed_blob(&models, |m| m.id)?;
        self.connection()?.execute(
            schema::UPDATE_MODELS,
            params![blob, Utc::now().timestamp_millis()],
        )?;
        self.models = models;

        debug!(model_id = id, "Stored model");
        Ok(id)
    }

    /// Register a deck, rewriting the whole `decks` blob
    #[instrument(level = "debug", skip(self, def), fields(name = %def.name))]
    pub fn add_deck(&mut self, def: DeckDef) -> Result<i64, PackageError> {
        self.connection()?;

        let id = def.id.unwrap_or_else(|| self.ids.random_large_id());
        let deck = Deck::from_def(id, def, Utc::now().timestamp());
        let mut decks = self.decks.clone();
        upsert(&mut decks, deck, |d| d.id == id);

        let blob = keyed_blob(&decks, |d| d.id)?;
        self.connection()?.execute(
            schema::UPDATE_DECKS,
            params![blob, Utc::now().timestamp_millis()],
        )?;
        self.decks = decks;

        debug!(deck_id = id, "Stored deck");
        Ok(id)
    }

    /// Insert a note and one new card per template of its model.
    ///
    /// Every template yields a card. Validation happens before any id is
    /// allocated or row written; note and cards share one transaction.
    #[instrument(level = "debug", skip(self, note))]
    pub fn add_note(
        &mut self,
        note: &NoteDef,
        model_id: i64,
        deck_id: i64,
    ) -> Result<i64, PackageError> {
        self.connection()?;

        let model = self
            .models
            .iter()
            .find(|m| m.id == model_id)
            .ok_or(PackageError::ModelNotFound(model_id))?;
        if !self.decks.iter().any(|d| d.id == deck_id) {
            return Err(PackageError::DeckNotFound(deck_id));
        }
        if note.fields.len() != model.fields.len() {
            return Err(PackageError::FieldCountMismatch {
                model_id,
                expected: model.fields.len(),
                actual: note.fields.len(),
            });
        }

        let template_ords: Vec<usize> = model.templates.iter().map(|t| t.ord).collect();
        let sort_value = note.fields[model.sort_field].clone();

        let now = Utc::now().timestamp();
        let note_id = self.ids.next_id();
        let guid = note
            .guid
            .clone()
            .unwrap_or_else(|| derive_dedup_key(&note.fields));
        let flds = note.fields.join(&FIELD_SEPARATOR.to_string());

        let cards: Vec<Card> = template_ords
            .into_iter()
            .map(|ord| Card::new(self.ids.next_id(), note_id, deck_id, ord, now))
            .collect();

        let conn = match &mut self.state {
            State::Open(conn) => conn,
            State::Uninitialized => return Err(PackageError::NotInitialized),
            State::Closed => return Err(PackageError::Closed),
        };
        let tx = conn.transaction()?;
        tx.execute(
            schema::INSERT_NOTE,
            params![
                note_id,
                guid,
                model_id,
                now,
                UNSYNCED_USN,
                format_tags(&note.tags),
                flds,
                sort_value,
                // checksum placeholder; Anki accepts 0 for freshly created notes
                0_i64,
            ],
        )?;
        for card in &cards {
            tx.execute(
                schema::INSERT_CARD,
                params![
                    card.id,
                    card.note_id,
                    card.deck_id,
                    card.ord as i64,
                    card.modified,
                    UNSYNCED_USN,
                    Card::TYPE_NEW,
                    Card::QUEUE_NEW,
                    card.due,
                ],
            )?;
        }
        tx.commit()?;

        debug!(note_id, cards = cards.len(), "Inserted note");
        Ok(note_id)
    }

    /// Serialize the database to its on-disk byte layout
    #[instrument(level = "debug", skip(self))]
    pub fn export(&mut self) -> Result<Vec<u8>, PackageError> {
        let conn = self.connection()?;

        let scratch = tempfile::tempdir()?;
        let path = scratch.path().join(COLLECTION_ENTRY);
        conn.execute("VACUUM INTO ?1", params![path.to_string_lossy().into_owned()])?;
        let bytes = std::fs::read(&path)?;

        self.exported = true;
        info!(bytes = bytes.len(), "Exported collection");
        Ok(bytes)
    }

    /// Release the connection. Safe to call any number of times.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Open(conn) => {
                if let Err((_, e)) = conn.close() {
                    warn!(error = %e, "Failed to close collection cleanly");
                } else {
                    debug!("Closed collection");
                }
            }
            State::Uninitialized | State::Closed => {}
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    pub fn is_exported(&self) -> bool {
        self.exported
    }

    pub fn model(&self, id: i64) -> Option<&Model> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn deck(&self, id: i64) -> Option<&Deck> {
        self.decks.iter().find(|d| d.id == id)
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    fn connection(&self) -> Result<&Connection, PackageError> {
        match &self.state {
            State::Open(conn) => Ok(conn),
            State::Uninitialized => Err(PackageError::NotInitialized),
            State::Closed => Err(PackageError::Closed),
        }
    }
}

impl Drop for CollectionAssembler {
    fn drop(&mut self) {
        self.close();
    }
}

/// Replace in place when the key exists, append otherwise
fn upsert<T>(items: &mut Vec<T>, item: T, same_key: impl Fn(&T) -> bool) {
    match items.iter().position(same_key) {
        Some(i) => items[i] = item,
        None => items.push(item),
    }
}

/// `{"<id>": {...}, ...}` in insertion order
fn keyed_blob<T: Serialize>(items: &[T], id: impl Fn(&T) -> i64) -> Result<String, PackageError> {
    let mut map = Map::new();
    for item in items {
        map.insert(id(item).to_string(), serde_json::to_value(item)?);
    }
    Ok(Value::Object(map).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldDef, TemplateDef};

    fn basic_model(id: i64) -> ModelDef {
        ModelDef {
            id: Some(id),
            name: "Basic".to_string(),
            fields: vec![FieldDef::new("Front"), FieldDef::new("Back")],
            templates: vec![TemplateDef::new("Card 1", "{{Front}}", "{{Back}}")],
            ..Default::default()
        }
    }

    fn ready_assembler() -> CollectionAssembler {
        let mut asm = CollectionAssembler::new(IdGenerator::with_seed(1000));
        asm.init().unwrap();
        asm.add_model(basic_model(10)).unwrap();
        asm.add_deck(DeckDef::new("Deck").with_id(20)).unwrap();
        asm
    }

    fn count(asm: &CollectionAssembler, table: &str) -> i64 {
        asm.connection()
            .unwrap()
            .query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    fn col_blob(asm: &CollectionAssembler, column: &str) -> Value {
        let text: String = asm
            .connection()
            .unwrap()
            .query_row(&format!("SELECT {column} FROM col"), [], |r| r.get(0))
            .unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn given_new_assembler_when_adding_model_then_returns_not_initialized() {
        let mut asm = CollectionAssembler::new(IdGenerator::with_seed(1));

        let result = asm.add_model(basic_model(10));

        assert!(matches!(result, Err(PackageError::NotInitialized)));
    }

    #[test]
    fn given_initialized_assembler_when_init_again_then_is_noop() {
        let mut asm = ready_assembler();

        asm.init().unwrap();

        assert_eq!(count(&asm, "col"), 1);
        assert!(asm.model(10).is_some());
    }

    #[test]
    fn given_initialized_assembler_when_checking_tables_then_has_single_collection_row() {
        let asm = ready_assembler();

        assert_eq!(count(&asm, "col"), 1);
        assert_eq!(count(&asm, "notes"), 0);
        assert_eq!(count(&asm, "revlog"), 0);
        assert_eq!(count(&asm, "graves"), 0);
    }

    #[test]
    fn given_note_when_adding_then_inserts_note_and_card_rows() {
        let mut asm = ready_assembler();

        let note_id = asm
            .add_note(&NoteDef::new(["France", "Paris"]).with_tags(["geo"]), 10, 20)
            .unwrap();

        assert_eq!(note_id, 1000);
        assert_eq!(count(&asm, "notes"), 1);
        assert_eq!(count(&asm, "cards"), 1);

        let (guid, flds, sfld, tags, csum, usn): (String, String, String, String, i64, i64) = asm
            .connection()
            .unwrap()
            .query_row(
                "SELECT guid, flds, sfld, tags, csum, usn FROM notes WHERE id = ?1",
                [note_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)),
            )
            .unwrap();
        assert_eq!(guid, "ID!#kyrD%b");
        assert_eq!(flds, "France\x1fParis");
        assert_eq!(sfld, "France");
        assert_eq!(tags, " geo ");
        assert_eq!(csum, 0);
        assert_eq!(usn, -1);

        let (card_id, nid, did, due, queue): (i64, i64, i64, i64, i64) = asm
            .connection()
            .unwrap()
            .query_row("SELECT id, nid, did, due, queue FROM cards", [], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
            })
            .unwrap();
        assert_eq!(card_id, 1001);
        assert_eq!(nid, note_id);
        assert_eq!(did, 20);
        assert_eq!(due, card_id);
        assert_eq!(queue, 0);
    }

    #[test]
    fn given_explicit_guid_when_adding_note_then_keeps_it() {
        let mut asm = ready_assembler();

        let id = asm
            .add_note(&NoteDef::new(["a", "b"]).with_guid("custom"), 10, 20)
            .unwrap();

        let guid: String = asm
            .connection()
            .unwrap()
            .query_row("SELECT guid FROM notes WHERE id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(guid, "custom");
    }

    #[test]
    fn given_field_count_mismatch_when_adding_note_then_fails_without_rows() {
        let mut asm = ready_assembler();
        let before = asm.ids().peek();

        let result = asm.add_note(&NoteDef::new(["only one"]), 10, 20);

        assert!(matches!(
            result,
            Err(PackageError::FieldCountMismatch {
                model_id: 10,
                expected: 2,
                actual: 1
            })
        ));
        assert_eq!(count(&asm, "notes"), 0);
        assert_eq!(count(&asm, "cards"), 0);
        assert_eq!(asm.ids().peek(), before);
    }

    #[test]
    fn given_unknown_model_when_adding_note_then_returns_model_not_found() {
        let mut asm = ready_assembler();

        let result = asm.add_note(&NoteDef::new(["a", "b"]), 999, 20);

        assert!(matches!(result, Err(PackageError::ModelNotFound(999))));
    }

    #[test]
    fn given_unknown_deck_when_adding_note_then_returns_deck_not_found() {
        let mut asm = ready_assembler();

        let result = asm.add_note(&NoteDef::new(["a", "b"]), 10, 999);

        assert!(matches!(result, Err(PackageError::DeckNotFound(999))));
    }

    #[test]
    fn given_model_with_two_templates_when_adding_note_then_creates_card_per_template() {
        let mut asm = ready_assembler();
        let mut def = basic_model(11);
        def.templates
            .push(TemplateDef::new("Card 2", "{{Back}}", "{{Front}}"));
        asm.add_model(def).unwrap();

        asm.add_note(&NoteDef::new(["a", "b"]), 11, 20).unwrap();

        let ords: Vec<i64> = {
            let conn = asm.connection().unwrap();
            let mut stmt = conn.prepare("SELECT ord FROM cards ORDER BY id").unwrap();
            let rows = stmt.query_map([], |r| r.get(0)).unwrap();
            rows.collect::<Result<_, _>>().unwrap()
        };
        assert_eq!(ords, vec![0, 1]);
    }

    #[test]
    fn given_existing_model_id_when_readding_then_blob_holds_replacement() {
        let mut asm = ready_assembler();
        let mut def = basic_model(10);
        def.name = "Renamed".to_string();

        asm.add_model(def).unwrap();

        let models = col_blob(&asm, "models");
        let map = models.as_object().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(models["10"]["name"], "Renamed");
    }

    #[test]
    fn given_added_deck_when_reading_blob_then_default_deck_is_kept() {
        let asm = ready_assembler();

        let decks = col_blob(&asm, "decks");

        assert_eq!(decks["1"]["name"], "Default");
        assert_eq!(decks["20"]["name"], "Deck");
    }

    #[test]
    fn given_model_without_id_when_adding_then_assigns_large_random_id() {
        let mut asm = ready_assembler();
        let mut def = basic_model(0);
        def.id = None;

        let id = asm.add_model(def).unwrap();

        assert!((1 << 30..1 << 31).contains(&id));
    }

    #[test]
    fn given_initialized_collection_when_exporting_then_returns_sqlite_file() {
        let mut asm = ready_assembler();
        asm.add_note(&NoteDef::new(["a", "b"]), 10, 20).unwrap();

        let bytes = asm.export().unwrap();

        assert!(bytes.starts_with(b"SQLite format 3\0"));
        assert!(asm.is_exported());
    }

    #[test]
    fn given_uninitialized_collection_when_exporting_then_returns_not_initialized() {
        let mut asm = CollectionAssembler::new(IdGenerator::with_seed(1));

        assert!(matches!(asm.export(), Err(PackageError::NotInitialized)));
    }

    #[test]
    fn given_closed_collection_when_mutating_then_returns_closed() {
        let mut asm = ready_assembler();
        asm.close();
        asm.close();

        assert!(!asm.is_initialized());
        assert!(asm.is_closed());
        let err = asm.add_deck(DeckDef::new("x")).unwrap_err();
        assert!(matches!(err, PackageError::Closed));
        assert!(err.is_lifecycle());
        assert!(matches!(
            asm.add_note(&NoteDef::new(["a", "b"]), 10, 20),
            Err(PackageError::Closed)
        ));
        assert!(matches!(asm.init(), Err(PackageError::Closed)));
        // in-memory state survives the failed calls
        assert!(asm.model(10).is_some());
    }

    #[test]
    fn given_failing_blob_update_when_adding_then_in_memory_state_is_unchanged() {
        // Arrange
        let mut asm = ready_assembler();
        asm.connection().unwrap().execute_batch("DROP TABLE col").unwrap();
        let mut renamed = basic_model(10);
        renamed.name = "Renamed".to_string();

        // Act
        let model_result = asm.add_model(renamed);
        let deck_result = asm.add_deck(DeckDef::new("Other").with_id(30));

        // Assert
        assert!(matches!(model_result, Err(PackageError::Database(_))));
        assert!(matches!(deck_result, Err(PackageError::Database(_))));
        assert_eq!(asm.model(10).map(|m| m.name.as_str()), Some("Basic"));
        assert!(asm.deck(30).is_none());
        assert!(asm.deck(20).is_some());
    }
}

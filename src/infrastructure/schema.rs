//! Legacy (schema 11) collection layout and the default JSON payloads that
//! go into the single `col` row.

use crate::constants::{DEFAULT_DECK_ID, SCHEMA_VERSION};
use crate::domain::Deck;
use serde_json::{json, Map, Value};

pub const SCHEMA_DDL: &str = r#"
CREATE TABLE col (
    id              integer primary key,
    crt             integer not null,
    mod             integer not null,
    scm             integer not null,
    ver             integer not null,
    dty             integer not null,
    usn             integer not null,
    ls              integer not null,
    conf            text not null,
    models          text not null,
    decks           text not null,
    dconf           text not null,
    tags            text not null
);
CREATE TABLE notes (
    id              integer primary key,
    guid            text not null,
    mid             integer not null,
    mod             integer not null,
    usn             integer not null,
    tags            text not null,
    flds            text not null,
    -- integer affinity so numeric sort fields sort numerically
    sfld            integer not null,
    csum            integer not null,
    flags           integer not null,
    data            text not null
);
CREATE TABLE cards (
    id              integer primary key,
    nid             integer not null,
    did             integer not null,
    ord             integer not null,
    mod             integer not null,
    usn             integer not null,
    type            integer not null,
    queue           integer not null,
    due             integer not null,
    ivl             integer not null,
    factor          integer not null,
    reps            integer not null,
    lapses          integer not null,
    left            integer not null,
    odue            integer not null,
    odid            integer not null,
    flags           integer not null,
    data            text not null
);
CREATE TABLE revlog (
    id              integer primary key,
    cid             integer not null,
    usn             integer not null,
    ease            integer not null,
    ivl             integer not null,
    lastIvl         integer not null,
    factor          integer not null,
    time            integer not null,
    type            integer not null
);
CREATE TABLE graves (
    usn             integer not null,
    oid             integer not null,
    type            integer not null
);
CREATE INDEX ix_notes_usn on notes (usn);
CREATE INDEX ix_cards_usn on cards (usn);
CREATE INDEX ix_revlog_usn on revlog (usn);
CREATE INDEX ix_cards_nid on cards (nid);
CREATE INDEX ix_cards_sched on cards (did, queue, due);
CREATE INDEX ix_revlog_cid on revlog (cid);
CREATE INDEX ix_notes_csum on notes (csum);
"#;

pub const INSERT_COLLECTION: &str = "INSERT INTO col \
    (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags) \
    VALUES (1, ?1, ?2, ?3, ?4, 0, 0, 0, ?5, '{}', ?6, ?7, '{}')";

pub const UPDATE_MODELS: &str = "UPDATE col SET models = ?1, mod = ?2 WHERE id = 1";
pub const UPDATE_DECKS: &str = "UPDATE col SET decks = ?1, mod = ?2 WHERE id = 1";

pub const INSERT_NOTE: &str = "INSERT INTO notes \
    (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, '')";

pub const INSERT_CARD: &str = "INSERT INTO cards \
    (id, nid, did, ord, mod, usn, type, queue, due, ivl, factor, reps, lapses, left, odue, odid, flags, data) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 0, 0, 0, 0, 0, 0, 0, '')";

/// Column values of the single `col` row, minus the models blob which
/// starts empty.
#[derive(Debug, Clone)]
pub struct CollectionRow {
    /// Creation day, seconds
    pub created: i64,
    /// Milliseconds
    pub modified: i64,
    pub schema_modified: i64,
    pub version: i64,
    pub conf: Value,
    pub decks: Value,
    pub deck_conf: Value,
}

impl CollectionRow {
    pub fn new(created: i64, now_millis: i64) -> Self {
        let now_secs = now_millis / 1000;
        Self {
            created,
            modified: now_millis,
            schema_modified: now_millis,
            version: SCHEMA_VERSION,
            conf: default_conf(),
            decks: default_decks(now_secs),
            deck_conf: default_deck_conf(),
        }
    }
}

/// Global collection preferences
pub fn default_conf() -> Value {
    json!({
        "activeDecks": [DEFAULT_DECK_ID],
        "addToCur": true,
        "collapseTime": 1200,
        "curDeck": DEFAULT_DECK_ID,
        "curModel": null,
        "dueCounts": true,
        "estTimes": true,
        "newBury": true,
        "newSpread": 0,
        "nextPos": 1,
        "sortBackwards": false,
        "sortType": "noteFld",
        "timeLim": 0
    })
}

/// The `decks` blob always carries deck 1
pub fn default_decks(now_secs: i64) -> Value {
    let mut decks = Map::new();
    let deck = Deck::builtin_default(now_secs);
    decks.insert(
        deck.id.to_string(),
        serde_json::to_value(&deck).unwrap_or(Value::Null),
    );
    Value::Object(decks)
}

/// Options group 1, referenced by every deck via `conf`
pub fn default_deck_conf() -> Value {
    let group = json!({
        "autoplay": true,
        "id": DEFAULT_DECK_ID,
        "lapse": {
            "delays": [10],
            "leechAction": 0,
            "leechFails": 8,
            "minInt": 1,
            "mult": 0
        },
        "maxTaken": 60,
        "mod": 0,
        "name": "Default",
        "new": {
            "bury": true,
            "delays": [1, 10],
            "initialFactor": 2500,
            "ints": [1, 4, 7],
            "order": 1,
            "perDay": 20,
            "separate": true
        },
        "replayq": true,
        "rev": {
            "bury": true,
            "ease4": 1.3,
            "fuzz": 0.05,
            "ivlFct": 1,
            "maxIvl": 36500,
            "minSpace": 1,
            "perDay": 100
        },
        "timer": 0,
        "usn": 0
    });

    let mut dconf = Map::new();
    dconf.insert(DEFAULT_DECK_ID.to_string(), group);
    Value::Object(dconf)
}

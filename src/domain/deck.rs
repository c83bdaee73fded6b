// src/domain/deck.rs
use crate::constants::{DEFAULT_DECK_ID, UNSYNCED_USN};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeckDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DeckDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}

/// Deck entry of the `decks` blob. Counters describe a deck nobody has
/// studied yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: i64,
    pub name: String,
    pub desc: String,
    #[serde(rename = "mod")]
    pub modified: i64,
    pub usn: i64,
    pub collapsed: bool,
    pub browser_collapsed: bool,
    #[serde(rename = "dyn")]
    pub dynamic: i64,
    pub conf: i64,
    pub extend_new: i64,
    pub extend_rev: i64,
    pub new_today: [i64; 2],
    pub rev_today: [i64; 2],
    pub lrn_today: [i64; 2],
    pub time_today: [i64; 2],
}

impl Deck {
    pub fn from_def(id: i64, def: DeckDef, modified: i64) -> Self {
        Self {
            id,
            name: def.name,
            desc: def.description.unwrap_or_default(),
            modified,
            usn: UNSYNCED_USN,
            collapsed: false,
            browser_collapsed: false,
            dynamic: 0,
            conf: DEFAULT_DECK_ID,
            extend_new: 10,
            extend_rev: 50,
            new_today: [0, 0],
            rev_today: [0, 0],
            lrn_today: [0, 0],
            time_today: [0, 0],
        }
    }

    /// Anki refuses collections without deck 1
    pub fn builtin_default(modified: i64) -> Self {
        Self::from_def(DEFAULT_DECK_ID, DeckDef::new("Default"), modified)
    }
}

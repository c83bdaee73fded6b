// src/domain/card.rs

/// Card in the "new" state with no review history
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub id: i64,
    pub note_id: i64,
    pub deck_id: i64,
    pub ord: usize,
    pub modified: i64,
    /// New-card position; equals the card id so insertion order breaks ties
    pub due: i64,
}

impl Card {
    pub const TYPE_NEW: i64 = 0;
    pub const QUEUE_NEW: i64 = 0;

    pub fn new(id: i64, note_id: i64, deck_id: i64, ord: usize, modified: i64) -> Self {
        Self {
            id,
            note_id,
            deck_id,
            ord,
            modified,
            due: id,
        }
    }
}

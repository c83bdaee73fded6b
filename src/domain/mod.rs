// src/domain/mod.rs
pub mod card;
pub mod deck;
pub mod error;
pub mod model;
pub mod note;

pub use card::Card;
pub use deck::{Deck, DeckDef};
pub use error::PackageError;
pub use model::{FieldDef, Model, ModelDef, ModelKind, TemplateDef};
pub use note::NoteDef;

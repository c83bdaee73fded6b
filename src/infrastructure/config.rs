// src/infrastructure/config.rs
use crate::domain::{DeckDef, FieldDef, ModelDef, NoteDef, TemplateDef};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One package: a note type, the deck its cards land in, and the notes
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct PackageDefinition {
    pub model: ModelDef,
    pub deck: DeckDef,
    #[serde(default)]
    pub notes: Vec<NoteDef>,
}

impl PackageDefinition {
    /// Load a definition from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read package definition {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid package definition {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let definition: PackageDefinition =
            toml::from_str(content).context("Failed to parse TOML package definition")?;
        Ok(definition)
    }

    /// Save definition to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize package definition")?;

        std::fs::write(path.as_ref(), toml_string)
            .context("Failed to write package definition")?;

        Ok(())
    }

    /// Starter definition with a Basic note type and one note
    pub fn example() -> Self {
        Self {
            model: ModelDef {
                name: "Basic".to_string(),
                fields: vec![FieldDef::new("Front"), FieldDef::new("Back")],
                templates: vec![TemplateDef::new(
                    "Card 1",
                    "{{Front}}",
                    "{{FrontSide}}<hr id=answer>{{Back}}",
                )],
                ..Default::default()
            },
            deck: DeckDef::new("Country Capitals"),
            notes: vec![NoteDef::new(["France", "Paris"]).with_tags(["geo"])],
        }
    }

    /// Write the starter definition to path
    pub fn create_example(path: impl AsRef<Path>) -> Result<Self> {
        let definition = Self::example();
        definition.save(path)?;
        Ok(definition)
    }
}

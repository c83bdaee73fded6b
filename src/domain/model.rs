// src/domain/model.rs
use crate::constants::{DEFAULT_DECK_ID, UNSYNCED_USN};
use crate::domain::PackageError;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;

pub const DEFAULT_FONT: &str = "Liberation Sans";
pub const DEFAULT_FONT_SIZE: u32 = 20;

pub const DEFAULT_CSS: &str = ".card {
  font-family: arial;
  font-size: 20px;
  text-align: center;
  color: black;
  background-color: white;
}
";

pub const DEFAULT_LATEX_PRE: &str = "\\documentclass[12pt]{article}
\\special{papersize=3in,5in}
\\usepackage[utf8]{inputenc}
\\usepackage{amssymb,amsmath}
\\pagestyle{empty}
\\setlength{\\parindent}{0in}
\\begin{document}
";

pub const DEFAULT_LATEX_POST: &str = "\\end{document}";

/// Note type discriminator; the models blob stores it as a number under `type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Standard,
    Cloze,
}

impl ModelKind {
    pub fn code(self) -> i64 {
        match self {
            ModelKind::Standard => 0,
            ModelKind::Cloze => 1,
        }
    }
}

fn serialize_kind_code<S: Serializer>(kind: &ModelKind, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(kind.code())
}

/// Field as supplied by the caller; display hints are optional
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtl: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticky: Option<bool>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateDef {
    pub name: String,
    pub qfmt: String,
    pub afmt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bqfmt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bafmt: Option<String>,
}

impl TemplateDef {
    pub fn new(name: impl Into<String>, qfmt: impl Into<String>, afmt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qfmt: qfmt.into(),
            afmt: afmt.into(),
            ..Default::default()
        }
    }
}

/// Note type as supplied by the caller.
///
/// Everything except the name, fields and templates may be left out;
/// [`Model::from_def`] fills in the defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub templates: Vec<TemplateDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ModelKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_field: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latex_pre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latex_post: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub ord: usize,
    pub font: String,
    pub size: u32,
    pub rtl: bool,
    pub sticky: bool,
    pub media: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    pub name: String,
    pub ord: usize,
    pub qfmt: String,
    pub afmt: String,
    pub bqfmt: String,
    pub bafmt: String,
    pub did: Option<i64>,
}

/// `[template_ord, "any", [field_ords...]]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Requirement(pub usize, pub String, pub Vec<usize>);

/// Fully populated note type, serialised as one entry of the `models` blob
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Model {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type", serialize_with = "serialize_kind_code")]
    pub kind: ModelKind,
    #[serde(rename = "mod")]
    pub modified: i64,
    pub usn: i64,
    #[serde(rename = "sortf")]
    pub sort_field: usize,
    pub did: i64,
    #[serde(rename = "tmpls")]
    pub templates: Vec<Template>,
    #[serde(rename = "flds")]
    pub fields: Vec<Field>,
    pub css: String,
    #[serde(rename = "latexPre")]
    pub latex_pre: String,
    #[serde(rename = "latexPost")]
    pub latex_post: String,
    #[serde(rename = "latexsvg")]
    pub latex_svg: bool,
    pub req: Vec<Requirement>,
    pub tags: Vec<String>,
    pub vers: Vec<i64>,
}

impl Model {
    /// Fill defaults and validate.
    ///
    /// Ordinals come from list position. Every template requires "any field
    /// non-empty"; no per-template field analysis is attempted.
    pub fn from_def(id: i64, def: ModelDef, modified: i64) -> Result<Self, PackageError> {
        if def.fields.is_empty() {
            return Err(PackageError::InvalidModel(format!(
                "model '{}' has no fields",
                def.name
            )));
        }
        if def.templates.is_empty() {
            return Err(PackageError::InvalidModel(format!(
                "model '{}' has no templates",
                def.name
            )));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = def.fields.iter().find(|f| !seen.insert(f.name.as_str())) {
            return Err(PackageError::InvalidModel(format!(
                "model '{}' has duplicate field '{}'",
                def.name, dup.name
            )));
        }

        let sort_field = def.sort_field.unwrap_or(0);
        if sort_field >= def.fields.len() {
            return Err(PackageError::InvalidModel(format!(
                "model '{}' sort field {} out of range (fields: {})",
                def.name,
                sort_field,
                def.fields.len()
            )));
        }

        let fields: Vec<Field> = def
            .fields
            .into_iter()
            .enumerate()
            .map(|(ord, f)| Field {
                name: f.name,
                ord,
                font: f.font.unwrap_or_else(|| DEFAULT_FONT.to_string()),
                size: f.size.unwrap_or(DEFAULT_FONT_SIZE),
                rtl: f.rtl.unwrap_or(false),
                sticky: f.sticky.unwrap_or(false),
                media: vec![],
            })
            .collect();

        let templates: Vec<Template> = def
            .templates
            .into_iter()
            .enumerate()
            .map(|(ord, t)| Template {
                name: t.name,
                ord,
                qfmt: t.qfmt,
                afmt: t.afmt,
                bqfmt: t.bqfmt.unwrap_or_default(),
                bafmt: t.bafmt.unwrap_or_default(),
                did: None,
            })
            .collect();

        let all_fields: Vec<usize> = (0..fields.len()).collect();
        let req = templates
            .iter()
            .map(|t| Requirement(t.ord, "any".to_string(), all_fields.clone()))
            .collect();

        Ok(Self {
            id,
            name: def.name,
            kind: def.kind.unwrap_or_default(),
            modified,
            usn: UNSYNCED_USN,
            sort_field,
            did: DEFAULT_DECK_ID,
            templates,
            fields,
            css: def.css.unwrap_or_else(|| DEFAULT_CSS.to_string()),
            latex_pre: def.latex_pre.unwrap_or_else(|| DEFAULT_LATEX_PRE.to_string()),
            latex_post: def
                .latex_post
                .unwrap_or_else(|| DEFAULT_LATEX_POST.to_string()),
            latex_svg: false,
            req,
            tags: vec![],
            vers: vec![],
        })
    }
}

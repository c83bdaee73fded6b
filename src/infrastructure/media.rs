use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

lazy_static! {
    // One alternation so matches come back in document order:
    //   [sound:file.mp3]
    //   <img src="file.png">  or  <img src='file.png'>
    static ref MEDIA_REF_REGEX: Regex = Regex::new(
        r#"\[sound:([^\]]+)\]|<img[^>]*?\ssrc\s*=\s*"([^"]*)"|<img[^>]*?\ssrc\s*=\s*'([^']*)'"#
    )
    .expect("Failed to compile media reference regex");
}

/// Filenames referenced by `[sound:...]` and `<img src=...>`, left to right
pub fn extract_references(text: &str) -> Vec<String> {
    MEDIA_REF_REGEX
        .captures_iter(text)
        .filter_map(|cap| cap.get(1).or_else(|| cap.get(2)).or_else(|| cap.get(3)))
        .map(|m| m.as_str().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Ordered set of media filenames; first occurrence wins
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaFiles {
    ordered: Vec<String>,
    seen: HashSet<String>,
}

impl MediaFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the name was already present
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.seen.contains(&name) {
            return false;
        }
        self.seen.insert(name.clone());
        self.ordered.push(name);
        true
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Scan notes in order, fields in order, references left to right
pub fn collect<'a, N, F>(notes: N) -> MediaFiles
where
    N: IntoIterator<Item = F>,
    F: IntoIterator<Item = &'a String>,
{
    let mut files = MediaFiles::new();
    for fields in notes {
        for field in fields {
            for name in extract_references(field) {
                files.insert(name);
            }
        }
    }
    files
}

/// `media` entry contents: stringified archive index -> original filename
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MediaManifest {
    entries: BTreeMap<usize, String>,
}

impl MediaManifest {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(&index).map(String::as_str)
    }

    /// (index, filename) in index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.entries.iter().map(|(i, name)| (*i, name.as_str()))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

pub fn build_manifest(ordered: &[String]) -> MediaManifest {
    MediaManifest {
        entries: ordered.iter().cloned().enumerate().collect(),
    }
}

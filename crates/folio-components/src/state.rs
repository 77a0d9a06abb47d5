//! Expansion state of collapsible sections.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Whether collapsible sections start open or closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expansion {
    Expanded,
    #[default]
    Collapsed,
}

impl Expansion {
    /// Parse a front-matter or config value.
    pub fn from_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "expanded" | "open" | "true" => Some(Self::Expanded),
            "collapsed" | "closed" | "false" => Some(Self::Collapsed),
            _ => None,
        }
    }

    pub fn is_open(self) -> bool {
        self == Self::Expanded
    }
}

/// Default expansion per document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExpansionPolicy {
    /// Used when nothing more specific applies
    pub default: Expansion,

    /// Overrides keyed by `category/slug`
    pub documents: HashMap<String, Expansion>,
}

impl ExpansionPolicy {
    /// Default expansion for one document.
    ///
    /// A valid `sections` front-matter value wins over the per-document
    /// override, which wins over the site default.
    pub fn resolve(&self, document: &str, front_matter: Option<&str>) -> Expansion {
        if let Some(expansion) = front_matter.and_then(Expansion::from_value) {
            return expansion;
        }
        self.documents
            .get(document)
            .copied()
            .unwrap_or(self.default)
    }
}

/// Open/closed state a reader has chosen for individual sections.
#[derive(Debug, Clone, Default)]
pub struct SectionStore {
    documents: HashMap<String, HashMap<String, bool>>,
}

impl SectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, document: &str, section: &str, open: bool) {
        self.documents
            .entry(document.to_string())
            .or_default()
            .insert(section.to_string(), open);
    }

    pub fn get(&self, document: &str, section: &str) -> Option<bool> {
        self.documents.get(document)?.get(section).copied()
    }

    pub fn is_open(&self, document: &str, section: &str, default: bool) -> bool {
        self.get(document, section).unwrap_or(default)
    }
}

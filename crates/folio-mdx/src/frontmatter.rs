//! Front matter extraction.
//!
//! Articles may open with a flat `key: value` block fenced by `---` marker
//! lines. Extraction never fails: a missing or malformed block simply yields
//! an empty [`FrontMatter`] and leaves the whole source as body.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Marker line that opens and closes a front matter block.
const MARKER: &str = "---";

/// Flat string metadata from the head of an article.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrontMatter {
    fields: BTreeMap<String, String>,
}

impl FrontMatter {
    /// Create an empty front matter mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a raw field value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Article title.
    pub fn title(&self) -> Option<&str> {
        self.non_empty("title")
    }

    /// Article author.
    pub fn author(&self) -> Option<&str> {
        self.non_empty("author")
    }

    /// Unparsed date value.
    pub fn date(&self) -> Option<&str> {
        self.non_empty("date")
    }

    /// Display category.
    pub fn category(&self) -> Option<&str> {
        self.non_empty("category")
    }

    /// Default expansion of collapsible sections (`expanded` / `collapsed`).
    pub fn sections(&self) -> Option<&str> {
        self.non_empty("sections")
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FrontMatter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Split raw article text into front matter and body.
///
/// The block must begin on the very first line. Without a closing marker the
/// block is treated as absent and the entire text is returned as body.
pub fn split_front_matter(source: &str) -> (FrontMatter, &str) {
    let text = source.strip_prefix('\u{feff}').unwrap_or(source);

    let Some((first, mut rest)) = split_line(text) else {
        return (FrontMatter::new(), source);
    };
    if first.trim_end() != MARKER {
        return (FrontMatter::new(), source);
    }

    let mut block = Vec::new();
    loop {
        let Some((line, after)) = split_line(rest) else {
            // Ran out of input before the closing marker.
            return (FrontMatter::new(), source);
        };
        if line.trim_end() == MARKER {
            return (parse_block(&block), after);
        }
        block.push(line);
        rest = after;
    }
}

/// Parse `key: value` lines. Lines without a colon or with an empty key are skipped.
fn parse_block(lines: &[&str]) -> FrontMatter {
    let mut fm = FrontMatter::new();

    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        fm.insert(key, strip_quotes(value.trim()));
    }

    fm
}

/// Remove one layer of matching surrounding quotes.
fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Split off the first line, accepting `\n` and `\r\n` endings.
///
/// Returns `None` when the input is exhausted.
fn split_line(text: &str) -> Option<(&str, &str)> {
    if text.is_empty() {
        return None;
    }
    match text.find('\n') {
        Some(pos) => {
            let line = &text[..pos];
            Some((line.strip_suffix('\r').unwrap_or(line), &text[pos + 1..]))
        }
        None => Some((text, "")),
    }
}

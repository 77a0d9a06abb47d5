//! Article document parsing.

use crate::frontmatter::{split_front_matter, FrontMatter};

/// An article split into metadata and body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDoc {
    /// Parsed front matter (empty if absent or malformed)
    pub front_matter: FrontMatter,

    /// Markdown and component markup after the front matter
    pub body: String,
}

/// A table of contents entry.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TocEntry {
    /// Heading text
    pub title: String,
    /// Anchor ID
    pub id: String,
    /// Heading level (1-6)
    pub level: u8,
}

/// Parse raw article text. Never fails.
pub fn parse_document(source: &str) -> ParsedDoc {
    let (front_matter, body) = split_front_matter(source);

    ParsedDoc {
        front_matter,
        body: body.to_string(),
    }
}

/// Convert a heading to a URL-safe slug.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c
            } else if c.is_whitespace() || c == '-' || c == '_' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|c| *c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_front_matter() {
        let doc = parse_document("---\ntitle: Foo\n---\n# Foo\n");

        assert_eq!(doc.front_matter.title(), Some("Foo"));
        assert_eq!(doc.body, "# Foo\n");
    }

    #[test]
    fn parses_without_front_matter() {
        let source = "# Just Markdown\n\nNo front matter.";

        let doc = parse_document(source);

        assert!(doc.front_matter.is_empty());
        assert_eq!(doc.body, source);
    }

    #[test]
    fn slugify_works() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("RAG & CoT: The Dynamic Duo"), "rag-cot-the-dynamic-duo");
        assert_eq!(slugify("Button (Primary)"), "button-primary");
        assert_eq!(slugify("  Multiple   Spaces  "), "multiple-spaces");
    }
}

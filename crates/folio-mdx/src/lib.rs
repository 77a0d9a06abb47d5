//! Article parsing for folio.
//!
//! This crate splits article sources into front matter and body, scans the
//! body for component markup, and provides the date and title helpers used by
//! the article banner.

pub mod date;
pub mod frontmatter;
pub mod markup;
pub mod parser;

pub use date::{capitalize, format_long_date, format_optional_date, title_from_slug, MISSING_DATE};
pub use frontmatter::{split_front_matter, FrontMatter};
pub use markup::{parse_markup, Element, MarkupError, MarkupNode, PropValue};
pub use parser::{parse_document, slugify, ParsedDoc, TocEntry};

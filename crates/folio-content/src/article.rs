use serde::Serialize;

use folio_components::{CompileStatus, Compiled, CompiledRender};
use folio_mdx::{title_from_slug, FrontMatter};

use crate::store::ArticleKey;

/// A compiled article, ready to display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledArticle {
    /// Category segment of the key
    pub category: String,

    /// Slug segment of the key
    pub slug: String,

    /// Metadata from the article head
    pub front_matter: FrontMatter,

    /// Executable body
    pub render: CompiledRender,

    /// Whether the body compiled or fell back
    pub status: CompileStatus,
}

impl CompiledArticle {
    pub fn new(key: &ArticleKey, compiled: Compiled) -> Self {
        Self {
            category: key.category().to_string(),
            slug: key.slug().to_string(),
            front_matter: compiled.front_matter,
            render: compiled.render,
            status: compiled.status,
        }
    }

    /// Display title: front matter title, else derived from the slug.
    pub fn title(&self) -> String {
        self.front_matter
            .title()
            .map(str::to_string)
            .unwrap_or_else(|| title_from_slug(&self.slug))
    }

    pub fn is_fallback(&self) -> bool {
        self.status.is_fallback()
    }

    pub fn url(&self) -> String {
        format!("/article/{}/{}", self.category, self.slug)
    }
}

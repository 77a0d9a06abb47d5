//! Content store: raw article sources addressed by category and slug.
//!
//! Articles live at `{root}/{category}/{slug}.mdx` (or `.md`). Keys are
//! validated when they are constructed, so a store never sees a path segment
//! that could escape its root.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

/// Source extensions, in lookup order.
pub const EXTENSIONS: [&str; 2] = ["mdx", "md"];

/// Identifies one article.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ArticleKey {
    category: String,
    slug: String,
}

impl ArticleKey {
    /// Build a key, rejecting segments that are not safe as a single path
    /// component.
    pub fn new(category: impl Into<String>, slug: impl Into<String>) -> Result<Self, StoreError> {
        let category = category.into();
        let slug = slug.into();
        check_segment(&category)?;
        check_segment(&slug)?;
        Ok(Self { category, slug })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// URL path of the article page.
    pub fn url(&self) -> String {
        format!("/article/{}/{}", self.category, self.slug)
    }
}

impl fmt::Display for ArticleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.slug)
    }
}

fn check_segment(segment: &str) -> Result<(), StoreError> {
    let unsafe_char = segment.contains(['/', '\\', '\0']);
    if segment.is_empty() || segment.starts_with('.') || unsafe_char {
        return Err(StoreError::InvalidKey(segment.to_string()));
    }
    Ok(())
}

/// Errors that can occur when reading from a content store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Article not found: {0}")]
    NotFound(ArticleKey),

    #[error("Invalid article key segment: {0:?}")]
    InvalidKey(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Read-only access to article sources.
pub trait ContentStore: Send + Sync {
    /// Read the raw source of an article.
    fn fetch(&self, key: &ArticleKey) -> Result<String, StoreError>;

    /// Every article key in the store.
    ///
    /// Each call walks the store again. Unreadable directories contribute no
    /// keys instead of failing the walk.
    fn enumerate(&self) -> Box<dyn Iterator<Item = ArticleKey> + '_>;
}

/// Content store backed by a directory tree.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Key for a source path inside this store, if it names an article.
    pub fn key_for_path(&self, path: &Path) -> Option<ArticleKey> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut parts = relative.iter();
        let category = parts.next()?.to_str()?;
        let file = Path::new(parts.next()?);
        if parts.next().is_some() {
            return None;
        }

        let ext = file.extension()?.to_str()?;
        if !EXTENSIONS.contains(&ext) {
            return None;
        }
        let slug = file.file_stem()?.to_str()?;
        ArticleKey::new(category, slug).ok()
    }

    fn candidate(&self, key: &ArticleKey, ext: &str) -> PathBuf {
        self.root
            .join(&key.category)
            .join(format!("{}.{}", key.slug, ext))
    }
}

impl ContentStore for FsStore {
    fn fetch(&self, key: &ArticleKey) -> Result<String, StoreError> {
        for ext in EXTENSIONS {
            let path = self.candidate(key, ext);
            match fs::read(&path) {
                Ok(bytes) => return Ok(decode(&path, bytes)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => return Err(StoreError::Io { path, source }),
            }
        }
        Err(StoreError::NotFound(key.clone()))
    }

    fn enumerate(&self) -> Box<dyn Iterator<Item = ArticleKey> + '_> {
        let mut seen = HashSet::new();

        let keys = WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping unreadable content entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.key_for_path(entry.path()))
            .filter(move |key| seen.insert(key.clone()));

        Box::new(keys)
    }
}

/// Decode a source file, replacing invalid UTF-8 rather than rejecting it.
fn decode(path: &Path, bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!(
                "{} is not valid UTF-8 (at byte {}); decoding lossily",
                path.display(),
                e.utf8_error().valid_up_to()
            );
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    }
}

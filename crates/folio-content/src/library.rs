//! Compiled article library.
//!
//! [`Library`] ties a [`ContentStore`] to the document compiler and an
//! [`ArticleCache`]. It serves both the request-time interface
//! ([`Library::get_compiled_article`]) and the build-time one
//! ([`Library::enumerate_all_articles`], [`Library::precompile_all`]).

use std::sync::Arc;

use rayon::prelude::*;

use folio_components::Compiler;
use folio_mdx::parse_document;

use crate::article::CompiledArticle;
use crate::cache::{ArticleCache, ArticleState, Claim, Ticket};
use crate::store::{ArticleKey, ContentStore, StoreError};

/// Errors returned by the request-time interface.
#[derive(Debug, thiserror::Error)]
pub enum ArticleError {
    #[error("Article not found: {0}")]
    NotFound(ArticleKey),

    #[error("Invalid article key segment: {0:?}")]
    InvalidKey(String),

    #[error("Failed to load article {key}: {source}")]
    Io {
        key: ArticleKey,
        #[source]
        source: StoreError,
    },
}

impl ArticleError {
    fn from_store(key: &ArticleKey, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => Self::NotFound(key),
            StoreError::InvalidKey(segment) => Self::InvalidKey(segment),
            source => Self::Io {
                key: key.clone(),
                source,
            },
        }
    }

    /// Whether the article does not exist (including unsafe keys, which
    /// can never name an article).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::InvalidKey(_))
    }
}

/// Compiles and caches articles from a content store.
pub struct Library {
    store: Arc<dyn ContentStore>,
    compiler: Compiler,
    cache: ArticleCache,
}

impl Library {
    /// Create a library with the standard compiler.
    pub fn new(store: impl ContentStore + 'static) -> Self {
        Self::with_compiler(store, Compiler::new())
    }

    pub fn with_compiler(store: impl ContentStore + 'static, compiler: Compiler) -> Self {
        Self {
            store: Arc::new(store),
            compiler,
            cache: ArticleCache::new(),
        }
    }

    pub fn store(&self) -> &dyn ContentStore {
        self.store.as_ref()
    }

    pub fn cache(&self) -> &ArticleCache {
        &self.cache
    }

    /// Request-time lookup by raw path segments.
    ///
    /// Never returns fallback content for a missing article: a compile
    /// failure yields a fallback [`CompiledArticle`], a missing file yields
    /// [`ArticleError::NotFound`].
    pub fn get_compiled_article(
        &self,
        category: &str,
        slug: &str,
    ) -> Result<Arc<CompiledArticle>, ArticleError> {
        let key = ArticleKey::new(category, slug).map_err(|e| match e {
            StoreError::InvalidKey(segment) => ArticleError::InvalidKey(segment),
            other => ArticleError::InvalidKey(other.to_string()),
        })?;
        self.get(&key)
    }

    /// Cached article for a key, compiling it on a miss.
    ///
    /// If another caller is already compiling the key, this waits for that
    /// compilation instead of starting a second one.
    pub fn get(&self, key: &ArticleKey) -> Result<Arc<CompiledArticle>, ArticleError> {
        loop {
            match self.cache.claim(key) {
                Claim::Ready(article) => {
                    tracing::debug!("Cache hit for {}", key);
                    return Ok(article);
                }
                Claim::Compile(ticket) => return self.compile_with(key, ticket),
                Claim::InFlight => {
                    tracing::debug!("Waiting for in-flight compile of {}", key);
                    if let Some(article) = self.cache.wait(key) {
                        return Ok(article);
                    }
                }
            }
        }
    }

    /// Fetch, parse and compile an article, replacing any cached entry.
    pub fn compile(&self, key: &ArticleKey) -> Result<Arc<CompiledArticle>, ArticleError> {
        let ticket = self.cache.begin(key);
        self.compile_with(key, ticket)
    }

    fn compile_with(
        &self,
        key: &ArticleKey,
        ticket: Ticket,
    ) -> Result<Arc<CompiledArticle>, ArticleError> {
        let _pending = PendingSlot {
            cache: &self.cache,
            key,
            ticket,
        };

        let source = match self.store.fetch(key) {
            Ok(source) => source,
            Err(StoreError::NotFound(_)) => {
                self.cache.invalidate(key);
                return Err(ArticleError::NotFound(key.clone()));
            }
            Err(e) => return Err(ArticleError::from_store(key, e)),
        };

        let label = key.to_string();
        let compiled = self.compiler.compile_document(&label, parse_document(&source));
        let article = Arc::new(CompiledArticle::new(key, compiled));

        if !self.cache.finish(key, ticket, Arc::clone(&article)) {
            tracing::debug!("Discarded stale compile of {}", key);
        }
        Ok(article)
    }

    /// Every article key in the store, sorted.
    ///
    /// An unreadable store yields an empty list.
    pub fn enumerate_all_articles(&self) -> Vec<ArticleKey> {
        let mut keys: Vec<_> = self.store.enumerate().collect();
        keys.sort();
        if keys.is_empty() {
            tracing::warn!("No articles found in content store");
        }
        keys
    }

    /// Compile every article in parallel and cache the results.
    ///
    /// Articles that cannot be read are skipped with a warning.
    pub fn precompile_all(&self) -> Vec<Arc<CompiledArticle>> {
        let keys = self.enumerate_all_articles();
        tracing::info!("Compiling {} articles", keys.len());

        keys.par_iter()
            .filter_map(|key| match self.compile(key) {
                Ok(article) => Some(article),
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", key, e);
                    None
                }
            })
            .collect()
    }

    /// Current cache state of an article.
    pub fn state(&self, key: &ArticleKey) -> Option<ArticleState> {
        self.cache.get(key)
    }

    /// Drop the cached entry for an article.
    pub fn invalidate(&self, key: &ArticleKey) -> bool {
        let removed = self.cache.invalidate(key);
        if removed {
            tracing::debug!("Invalidated {}", key);
        }
        removed
    }
}

/// Releases a pending slot that never received an article, so waiters are
/// not stranded by a failed or panicking compilation.
struct PendingSlot<'a> {
    cache: &'a ArticleCache,
    key: &'a ArticleKey,
    ticket: Ticket,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.cache.abandon(self.key, self.ticket);
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("compiler", &self.compiler)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsStore;
    use folio_components::{CompileStatus, CompiledRender, FALLBACK_MESSAGE};
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn library_with(files: &[(&str, &str)]) -> (TempDir, Library) {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let path = dir.path().join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let library = Library::new(FsStore::new(dir.path()));
        (dir, library)
    }

    fn key(category: &str, slug: &str) -> ArticleKey {
        ArticleKey::new(category, slug).unwrap()
    }

    #[test]
    fn existing_article_compiles() {
        let (_dir, library) = library_with(&[(
            "software/hello.mdx",
            "---\ntitle: Foo\ndate: 2024-01-05\nauthor: Bar\n---\n\n# Hello\n",
        )]);

        let article = library.get_compiled_article("software", "hello").unwrap();

        assert_eq!(article.front_matter.title(), Some("Foo"));
        assert_eq!(article.front_matter.date(), Some("2024-01-05"));
        assert_eq!(article.front_matter.author(), Some("Bar"));
        assert_eq!(article.status, CompileStatus::Success);
        assert_eq!(article.render.toc.len(), 1);
    }

    #[test]
    fn missing_article_is_not_found() {
        let (_dir, library) = library_with(&[("software/hello.mdx", "Hi")]);

        let err = library.get_compiled_article("software", "nope").unwrap_err();

        assert!(matches!(err, ArticleError::NotFound(ref k) if *k == key("software", "nope")));
        assert!(library.state(&key("software", "nope")).is_none());
    }

    #[test]
    fn unsafe_segments_are_rejected() {
        let (_dir, library) = library_with(&[("software/hello.mdx", "Hi")]);

        for (category, slug) in [("..", "hello"), ("software", "../etc"), ("", "hello")] {
            let err = library.get_compiled_article(category, slug).unwrap_err();
            assert!(matches!(err, ArticleError::InvalidKey(_)));
            assert!(err.is_not_found());
        }
    }

    #[test]
    fn unknown_component_falls_back() {
        let (_dir, library) = library_with(&[(
            "software/broken.mdx",
            "---\ntitle: Broken\n---\n\n<Chart data=\"x\" />\n",
        )]);

        let article = library.get_compiled_article("software", "broken").unwrap();

        assert!(article.is_fallback());
        assert_eq!(article.render, CompiledRender::fallback());
        assert_eq!(article.title(), "Broken");
        let json = serde_json::to_string(&*article).unwrap();
        assert!(json.contains(FALLBACK_MESSAGE));
        assert!(json.contains("\"status\":\"fallback\""));
    }

    #[test]
    fn article_without_front_matter() {
        let (_dir, library) = library_with(&[("software/my-first-post.md", "Just *text*.\n")]);

        let article = library.get_compiled_article("software", "my-first-post").unwrap();

        assert!(article.front_matter.is_empty());
        assert_eq!(article.title(), "My First Post");
    }

    #[test]
    fn serves_from_cache_until_invalidated() {
        let (dir, library) = library_with(&[("a/x.mdx", "First")]);

        let first = library.get_compiled_article("a", "x").unwrap();
        let again = library.get_compiled_article("a", "x").unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        fs::write(dir.path().join("a/x.mdx"), "Second").unwrap();
        assert!(library.invalidate(&key("a", "x")));

        let updated = library.get_compiled_article("a", "x").unwrap();
        assert!(!Arc::ptr_eq(&first, &updated));
        assert!(matches!(&updated.render.nodes[0], folio_components::Node::Html(h) if h.contains("Second")));
    }

    #[test]
    fn deleted_article_leaves_cache() {
        let (dir, library) = library_with(&[("a/x.mdx", "Hi")]);
        library.get_compiled_article("a", "x").unwrap();

        fs::remove_file(dir.path().join("a/x.mdx")).unwrap();
        let err = library.compile(&key("a", "x")).unwrap_err();

        assert!(matches!(err, ArticleError::NotFound(_)));
        assert!(library.state(&key("a", "x")).is_none());
    }

    #[test]
    fn enumerates_all_articles() {
        let (_dir, library) = library_with(&[
            ("b/z.mdx", ""),
            ("a/x.mdx", ""),
            ("b/y.mdx", ""),
        ]);

        assert_eq!(
            library.enumerate_all_articles(),
            vec![key("a", "x"), key("b", "y"), key("b", "z")]
        );
    }

    #[test]
    fn unreadable_root_enumerates_empty() {
        let dir = TempDir::new().unwrap();
        let file_root = dir.path().join("content");
        fs::write(&file_root, "not a directory").unwrap();

        assert!(Library::new(FsStore::new(&file_root)).enumerate_all_articles().is_empty());
        assert!(Library::new(FsStore::new(dir.path().join("missing")))
            .enumerate_all_articles()
            .is_empty());
    }

    #[test]
    fn precompiles_everything() {
        let (_dir, library) = library_with(&[
            ("a/x.mdx", "# X"),
            ("b/y.mdx", "<Nope />"),
            ("b/z.md", "z"),
        ]);

        let articles = library.precompile_all();

        let slugs: Vec<_> = articles.iter().map(|a| a.slug.as_str()).collect();
        assert_eq!(slugs, vec!["x", "y", "z"]);
        assert_eq!(articles.iter().filter(|a| a.is_fallback()).count(), 1);
        assert_eq!(library.cache().len(), 3);
    }

    #[test]
    fn concurrent_requests_agree() {
        let (_dir, library) = library_with(&[("a/x.mdx", "<Image src=\"/a.png\" />")]);

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| library.get_compiled_article("a", "x").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for article in &results {
            assert_eq!(article.render, results[0].render);
        }
        assert!(library.cache().ready(&key("a", "x")).is_some());
    }

    #[test]
    fn invalid_utf8_article_still_renders() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(
            dir.path().join("a/x.mdx"),
            b"---\ntitle: Caf\xe9\n---\n\nBody \xff text\n",
        )
        .unwrap();
        let library = Library::new(FsStore::new(dir.path()));

        let article = library.get_compiled_article("a", "x").unwrap();

        assert_eq!(article.title(), "Caf\u{FFFD}");
        assert_eq!(article.status, CompileStatus::Success);
        assert_eq!(library.precompile_all().len(), 1);
    }

    /// Store whose every fetch takes a while.
    struct SlowStore {
        fetches: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl ContentStore for SlowStore {
        fn fetch(&self, _key: &ArticleKey) -> Result<String, StoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok("Slow body".to_string())
        }

        fn enumerate(&self) -> Box<dyn Iterator<Item = ArticleKey> + '_> {
            Box::new(std::iter::once(ArticleKey::new("a", "x").unwrap()))
        }
    }

    #[test]
    fn repeated_requests_join_the_running_compile() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let library = Library::new(SlowStore {
            fetches: Arc::clone(&fetches),
            delay: Duration::from_millis(300),
        });

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..6)
                .map(|i| {
                    let library = &library;
                    s.spawn(move || {
                        std::thread::sleep(Duration::from_millis(40 * i));
                        library.get(&key("a", "x")).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        for article in &results {
            assert!(Arc::ptr_eq(article, &results[0]));
        }
        assert!(library.cache().ready(&key("a", "x")).is_some());
    }

    /// Store that panics on its first fetch.
    struct FlakyStore {
        fetches: AtomicUsize,
    }

    impl ContentStore for FlakyStore {
        fn fetch(&self, _key: &ArticleKey) -> Result<String, StoreError> {
            if self.fetches.fetch_add(1, Ordering::SeqCst) == 0 {
                std::thread::sleep(Duration::from_millis(100));
                panic!("store exploded");
            }
            Ok("Recovered".to_string())
        }

        fn enumerate(&self) -> Box<dyn Iterator<Item = ArticleKey> + '_> {
            Box::new(std::iter::empty())
        }
    }

    #[test]
    fn failed_compile_does_not_strand_waiters() {
        let library = Library::new(FlakyStore {
            fetches: AtomicUsize::new(0),
        });

        std::thread::scope(|s| {
            let first = s.spawn(|| library.get(&key("a", "x")));
            std::thread::sleep(Duration::from_millis(30));
            let second = s.spawn(|| library.get(&key("a", "x")));

            assert!(first.join().is_err());
            let article = second.join().unwrap().unwrap();
            assert!(matches!(&article.render.nodes[0], folio_components::Node::Html(h) if h.contains("Recovered")));
        });
    }

    struct BrokenStore;

    impl ContentStore for BrokenStore {
        fn fetch(&self, _key: &ArticleKey) -> Result<String, StoreError> {
            Err(StoreError::Io {
                path: PathBuf::from("/content/a/x.mdx"),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            })
        }

        fn enumerate(&self) -> Box<dyn Iterator<Item = ArticleKey> + '_> {
            Box::new(std::iter::once(ArticleKey::new("a", "x").unwrap()))
        }
    }

    #[test]
    fn read_failures_are_io_errors() {
        let library = Library::new(BrokenStore);

        let err = library.get_compiled_article("a", "x").unwrap_err();
        assert!(matches!(err, ArticleError::Io { .. }));
        assert!(!err.is_not_found());
        assert!(library.state(&key("a", "x")).is_none());

        assert!(library.precompile_all().is_empty());
    }
}

//! Static site builder.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use folio_components::{ExpansionPolicy, Node, SectionStore, WidgetTemplates};
use folio_content::{ArticleKey, CompiledArticle, FsStore, Library};
use folio_mdx::format_optional_date;

use crate::assets::AssetPipeline;
use crate::host::{PageShellConfig, RenderHost};

/// Configuration for building a static site.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Source content directory
    pub content_dir: PathBuf,

    /// Output directory
    pub output_dir: PathBuf,

    /// Minify CSS output
    pub minify: bool,

    /// Page shell settings
    pub shell: PageShellConfig,

    /// Stylesheets appended to the main CSS
    pub styles: Vec<PathBuf>,

    /// Directory of widget template overrides
    pub widget_templates: Option<PathBuf>,

    /// Default expansion of collapsible sections
    pub expansion: ExpansionPolicy,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("content"),
            output_dir: PathBuf::from("dist"),
            minify: true,
            shell: PageShellConfig::default(),
            styles: vec![],
            widget_templates: None,
            expansion: ExpansionPolicy::default(),
        }
    }
}

/// Result of a build operation.
#[derive(Debug)]
pub struct BuildResult {
    /// Number of article pages generated
    pub pages: usize,

    /// Articles whose body fell back to the fixed message
    pub fallbacks: usize,

    /// Articles whose body failed during rendering
    pub render_failures: usize,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

/// Errors that can occur during build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to render template: {0}")]
    TemplateError(String),

    #[error("Failed to serialize {name}: {message}")]
    SerializeError { name: &'static str, message: String },

    #[error("Failed to write {path}: {message}")]
    WriteError { path: PathBuf, message: String },
}

/// Outcome of writing one article page.
struct PageStats {
    fallback: bool,
    render_failed: bool,
}

/// Static site builder.
pub struct StaticBuilder {
    config: BuildConfig,
    library: Library,
    host: RenderHost,
}

impl StaticBuilder {
    /// Create a new static builder.
    pub fn new(config: BuildConfig) -> Self {
        let widgets = match &config.widget_templates {
            Some(dir) => WidgetTemplates::with_overrides(dir),
            None => WidgetTemplates::new(),
        };
        let host = RenderHost::new(config.shell.clone())
            .with_widgets(widgets)
            .with_policy(config.expansion.clone());

        Self {
            library: Library::new(FsStore::new(&config.content_dir)),
            host,
            config,
        }
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    /// Build the static site.
    pub async fn build(&self) -> Result<BuildResult, BuildError> {
        let start = Instant::now();

        create_dir(&self.config.output_dir)?;

        if !self.config.content_dir.is_dir() {
            tracing::warn!(
                "Content directory not found: {}; building an empty site",
                self.config.content_dir.display()
            );
        }

        let articles = self.library.precompile_all();

        // Render and write pages in parallel
        let results: Vec<Result<PageStats, BuildError>> = articles
            .par_iter()
            .map(|article| self.build_page(article))
            .collect();

        let mut fallbacks = 0;
        let mut render_failures = 0;
        for result in results {
            let stats = result?;
            fallbacks += usize::from(stats.fallback);
            render_failures += usize::from(stats.render_failed);
        }

        self.generate_index(&articles)?;
        self.generate_manifest(&articles)?;
        self.generate_search_index(&articles)?;
        self.generate_sitemap(&articles)?;
        self.generate_assets()?;

        let duration = start.elapsed();
        tracing::info!(
            "Built {} articles ({} fallbacks, {} render failures)",
            articles.len(),
            fallbacks,
            render_failures
        );

        Ok(BuildResult {
            pages: articles.len(),
            fallbacks,
            render_failures,
            duration_ms: duration.as_millis() as u64,
            output_dir: self.config.output_dir.clone(),
        })
    }

    /// Output path of an article page.
    pub fn output_path(&self, category: &str, slug: &str) -> PathBuf {
        self.config
            .output_dir
            .join("article")
            .join(category)
            .join(slug)
            .join("index.html")
    }

    fn build_page(&self, article: &CompiledArticle) -> Result<PageStats, BuildError> {
        let page = self
            .host
            .render_article(article, &SectionStore::new())
            .map_err(|e| BuildError::TemplateError(e.to_string()))?;

        let path = self.output_path(&article.category, &article.slug);
        if let Some(parent) = path.parent() {
            create_dir(parent)?;
        }
        write(&path, &page.html)?;

        Ok(PageStats {
            fallback: article.is_fallback(),
            render_failed: page.body_failed(),
        })
    }

    fn generate_index(&self, articles: &[Arc<CompiledArticle>]) -> Result<(), BuildError> {
        let index = self
            .host
            .render_index(articles)
            .map_err(|e| BuildError::TemplateError(e.to_string()))?;
        write(&self.config.output_dir.join("index.html"), index)?;

        let not_found = self
            .host
            .render_not_found("")
            .map_err(|e| BuildError::TemplateError(e.to_string()))?;
        write(&self.config.output_dir.join("404.html"), not_found)
    }

    /// Write the list of article paths for other site generators.
    fn generate_manifest(&self, articles: &[Arc<CompiledArticle>]) -> Result<(), BuildError> {
        let keys: Vec<ArticleKey> = articles
            .iter()
            .filter_map(|a| ArticleKey::new(&a.category, &a.slug).ok())
            .collect();

        let json = serde_json::to_string_pretty(&keys).map_err(|e| BuildError::SerializeError {
            name: "articles.json",
            message: e.to_string(),
        })?;
        write(&self.config.output_dir.join("articles.json"), json)
    }

    fn generate_search_index(&self, articles: &[Arc<CompiledArticle>]) -> Result<(), BuildError> {
        let index: Vec<serde_json::Value> = articles
            .iter()
            .map(|article| {
                serde_json::json!({
                    "title": article.title(),
                    "url": self.page_url(article),
                    "category": article.category,
                    "date": format_optional_date(article.front_matter.date()),
                    "content": excerpt(&article.render.nodes, 300),
                })
            })
            .collect();

        let json = serde_json::to_string_pretty(&index).map_err(|e| BuildError::SerializeError {
            name: "search-index.json",
            message: e.to_string(),
        })?;
        write(&self.config.output_dir.join("search-index.json"), json)
    }

    fn generate_sitemap(&self, articles: &[Arc<CompiledArticle>]) -> Result<(), BuildError> {
        let base = self.config.shell.base_url.trim_end_matches('/');

        let urls: Vec<String> = std::iter::once(format!("{}/", base))
            .chain(articles.iter().map(|a| format!("{}{}", base, self.page_path(a))))
            .map(|loc| format!("  <url>\n    <loc>{}</loc>\n  </url>", loc))
            .collect();

        let sitemap = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
{}
</urlset>"#,
            urls.join("\n")
        );
        write(&self.config.output_dir.join("sitemap.xml"), sitemap)?;

        let robots = format!("User-agent: *\nAllow: /\nSitemap: {}/sitemap.xml", base);
        write(&self.config.output_dir.join("robots.txt"), robots)
    }

    fn generate_assets(&self) -> Result<(), BuildError> {
        let assets_dir = self.config.output_dir.join("assets");
        create_dir(&assets_dir)?;

        let css = AssetPipeline::bundle_css(&self.config.styles);
        let css = if self.config.minify {
            AssetPipeline::minify_css(&css).unwrap_or_else(|e| {
                tracing::warn!("Keeping unminified CSS: {}", e);
                css
            })
        } else {
            css
        };
        write(&assets_dir.join("main.css"), css)
    }

    /// Site-relative path of an article page.
    fn page_path(&self, article: &CompiledArticle) -> String {
        format!("/article/{}/{}/", article.category, article.slug)
    }

    fn page_url(&self, article: &CompiledArticle) -> String {
        format!(
            "{}{}",
            self.config.shell.base_url.trim_end_matches('/'),
            self.page_path(article)
        )
    }
}

fn create_dir(path: &Path) -> Result<(), BuildError> {
    fs::create_dir_all(path).map_err(|e| BuildError::WriteError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn write(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), BuildError> {
    fs::write(path, contents).map_err(|e| BuildError::WriteError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Plain text from the start of an article body.
fn excerpt(nodes: &[Node], max_chars: usize) -> String {
    let mut text = String::new();
    for node in nodes {
        if let Node::Html(html) = node {
            strip_tags(html, &mut text);
            text.push(' ');
        }
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    let mut out = String::new();
    for word in words {
        if out.chars().count() + word.chars().count() > max_chars {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

fn strip_tags(html: &str, out: &mut String) {
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_article(content: &Path, path: &str, source: &str) {
        let path = content.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, source).unwrap();
    }

    #[tokio::test]
    async fn builds_article_pages() {
        let temp = tempdir().unwrap();
        let content = temp.path().join("content");
        let out = temp.path().join("dist");

        write_article(&content, "a/x.mdx", "---\ntitle: X\ndate: 2024-01-05\n---\n# Hello\n");
        write_article(&content, "b/y.mdx", "Plain body");
        write_article(&content, "b/z.md", "<Unknown />");

        let builder = StaticBuilder::new(BuildConfig {
            content_dir: content,
            output_dir: out.clone(),
            ..Default::default()
        });
        let result = builder.build().await.unwrap();

        assert_eq!(result.pages, 3);
        assert_eq!(result.fallbacks, 1);
        assert_eq!(result.render_failures, 0);

        let x = fs::read_to_string(out.join("article/a/x/index.html")).unwrap();
        assert!(x.contains("Date: January 5, 2024"));
        assert!(x.contains("<h1 id=\"hello\">Hello</h1>"));

        let z = fs::read_to_string(out.join("article/b/z/index.html")).unwrap();
        assert!(z.contains(folio_components::FALLBACK_MESSAGE));

        for file in ["index.html", "404.html", "sitemap.xml", "robots.txt", "assets/main.css"] {
            assert!(out.join(file).exists(), "{file} missing");
        }
    }

    #[tokio::test]
    async fn writes_article_manifest() {
        let temp = tempdir().unwrap();
        let content = temp.path().join("content");
        let out = temp.path().join("dist");

        write_article(&content, "a/x.mdx", "");
        write_article(&content, "b/y.mdx", "");
        write_article(&content, "b/z.mdx", "");

        StaticBuilder::new(BuildConfig {
            content_dir: content,
            output_dir: out.clone(),
            ..Default::default()
        })
        .build()
        .await
        .unwrap();

        let manifest: Vec<serde_json::Value> =
            serde_json::from_str(&fs::read_to_string(out.join("articles.json")).unwrap()).unwrap();
        let pairs: Vec<(String, String)> = manifest
            .iter()
            .map(|v| {
                (
                    v["category"].as_str().unwrap().to_string(),
                    v["slug"].as_str().unwrap().to_string(),
                )
            })
            .collect();

        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "x".to_string()),
                ("b".to_string(), "y".to_string()),
                ("b".to_string(), "z".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn missing_content_builds_empty_site() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("dist");

        let result = StaticBuilder::new(BuildConfig {
            content_dir: temp.path().join("nope"),
            output_dir: out.clone(),
            ..Default::default()
        })
        .build()
        .await
        .unwrap();

        assert_eq!(result.pages, 0);
        assert_eq!(fs::read_to_string(out.join("articles.json")).unwrap(), "[]");
        assert!(fs::read_to_string(out.join("index.html"))
            .unwrap()
            .contains("No articles yet."));
    }

    #[tokio::test]
    async fn generates_search_index() {
        let temp = tempdir().unwrap();
        let content = temp.path().join("content");
        let out = temp.path().join("dist");

        write_article(&content, "ml/trees.mdx", "---\ntitle: Trees\n---\nSearchable *content* here");

        StaticBuilder::new(BuildConfig {
            content_dir: content,
            output_dir: out.clone(),
            minify: false,
            ..Default::default()
        })
        .build()
        .await
        .unwrap();

        let index = fs::read_to_string(out.join("search-index.json")).unwrap();
        assert!(index.contains("\"title\": \"Trees\""));
        assert!(index.contains("Searchable content here"));

        let sitemap = fs::read_to_string(out.join("sitemap.xml")).unwrap();
        assert!(sitemap.contains("<loc>/article/ml/trees/</loc>"));
    }

    #[test]
    fn excerpt_strips_markup() {
        let nodes = vec![
            Node::Html("<h1 id=\"a\">Title</h1>\n<p>One <em>two</em></p>".to_string()),
            Node::Html("<p>three four</p>".to_string()),
        ];

        assert_eq!(excerpt(&nodes, 100), "Title One two three four");
        assert_eq!(excerpt(&nodes, 9), "Title One");
    }
}

//! Render host: displays compiled articles inside the page shell.
//!
//! The shell (title, author, date, category) always renders. The article
//! body is executed behind a boundary: if execution fails or panics, the body
//! is replaced by a fixed error block and the rest of the page is unaffected.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;

use folio_components::{
    Execute, ExpansionPolicy, RenderContext, SectionStore, WidgetTemplates,
};
use folio_content::{ArticleKey, ArticleState, CompiledArticle};
use folio_mdx::{capitalize, format_optional_date, title_from_slug};

use crate::templates::{CategoryGroup, Context, IndexEntry, TemplateEngine};

/// Shown in place of an article body whose execution failed.
pub const RENDER_ERROR_MESSAGE: &str = "Error loading content. Please refresh.";

/// Seconds before the loading page asks the browser to retry.
const LOADING_REFRESH_SECONDS: u32 = 2;

/// Site-wide settings for the page shell.
#[derive(Debug, Clone)]
pub struct PageShellConfig {
    /// Site title
    pub site_title: String,

    /// Base URL, with trailing slash
    pub base_url: String,

    /// Author shown when an article has none
    pub default_author: String,

    /// Category shown when an article has none
    pub default_category: String,

    /// URLs of extra stylesheets
    pub styles: Vec<String>,

    /// Include the hot reload client
    pub hot_reload: bool,
}

impl Default for PageShellConfig {
    fn default() -> Self {
        Self {
            site_title: "folio".to_string(),
            base_url: "/".to_string(),
            default_author: "Anonymous".to_string(),
            default_category: "software".to_string(),
            styles: vec![],
            hot_reload: false,
        }
    }
}

/// The banner shown above an article body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageShell {
    pub title: String,
    pub author: String,
    pub date: String,
    pub category: String,
}

/// What happened to the article body during display.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyOutcome {
    Rendered,
    Failed { reason: String },
}

/// A fully rendered article page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub shell: PageShell,
    pub body: BodyOutcome,
    pub html: String,
}

impl RenderedPage {
    pub fn body_failed(&self) -> bool {
        matches!(self.body, BodyOutcome::Failed { .. })
    }
}

/// Errors in the page templates themselves.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Failed to render page template {template}: {source}")]
    Template {
        template: &'static str,
        #[source]
        source: minijinja::Error,
    },
}

/// Renders article, loading, not-found and index pages.
pub struct RenderHost {
    config: PageShellConfig,
    pages: TemplateEngine,
    widgets: WidgetTemplates,
    policy: ExpansionPolicy,
}

impl RenderHost {
    pub fn new(config: PageShellConfig) -> Self {
        Self {
            config,
            pages: TemplateEngine::new(),
            widgets: WidgetTemplates::new(),
            policy: ExpansionPolicy::default(),
        }
    }

    /// Use custom widget templates.
    pub fn with_widgets(mut self, widgets: WidgetTemplates) -> Self {
        self.widgets = widgets;
        self
    }

    /// Set the default expansion of collapsible sections.
    pub fn with_policy(mut self, policy: ExpansionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &PageShellConfig {
        &self.config
    }

    /// Banner values for an article, with defaults applied.
    pub fn shell(&self, article: &CompiledArticle) -> PageShell {
        let fm = &article.front_matter;
        PageShell {
            title: fm
                .title()
                .map(str::to_string)
                .unwrap_or_else(|| title_from_slug(&article.slug)),
            author: fm.author().unwrap_or(&self.config.default_author).to_string(),
            date: format_optional_date(fm.date()),
            category: fm
                .category()
                .unwrap_or(&self.config.default_category)
                .to_string(),
        }
    }

    /// Render an article page.
    pub fn render_article(
        &self,
        article: &CompiledArticle,
        sections: &SectionStore,
    ) -> Result<RenderedPage, HostError> {
        self.render_article_with(article, &article.render, sections)
    }

    /// Render an article page using `body` in place of the article's own
    /// render tree.
    pub fn render_article_with(
        &self,
        article: &CompiledArticle,
        body: &dyn Execute,
        sections: &SectionStore,
    ) -> Result<RenderedPage, HostError> {
        let document = format!("{}/{}", article.category, article.slug);
        let shell = self.shell(article);

        let ctx = RenderContext {
            document: &document,
            templates: &self.widgets,
            sections,
            expansion: self.policy.resolve(&document, article.front_matter.sections()),
        };

        let (content, outcome) = match execute_guarded(body, &ctx) {
            Ok(html) => (html, BodyOutcome::Rendered),
            Err(reason) => {
                tracing::warn!("Failed to render {}: {}", document, reason);
                (
                    format!("<div class=\"content-error render-error\">{RENDER_ERROR_MESSAGE}</div>"),
                    BodyOutcome::Failed { reason },
                )
            }
        };

        let toc = match outcome {
            BodyOutcome::Rendered => article.render.toc.clone(),
            BodyOutcome::Failed { .. } => Vec::new(),
        };

        let context = Context {
            title: shell.title.clone(),
            document: Some(document),
            shell: Some(shell.clone()),
            content,
            toc,
            ..self.base_context()
        };
        let html = self.render("article.html", &context)?;

        Ok(RenderedPage {
            shell,
            body: outcome,
            html,
        })
    }

    /// Skeleton page for an article that is still compiling.
    pub fn render_loading(&self, key: &ArticleKey) -> Result<String, HostError> {
        let context = Context {
            title: title_from_slug(key.slug()),
            document: Some(key.to_string()),
            refresh_seconds: Some(LOADING_REFRESH_SECONDS),
            ..self.base_context()
        };
        self.render("loading.html", &context)
    }

    /// Page for a cache state: the skeleton while pending, the article once
    /// ready.
    pub fn display(
        &self,
        key: &ArticleKey,
        state: &ArticleState,
        sections: &SectionStore,
    ) -> Result<String, HostError> {
        match state {
            ArticleState::Pending => self.render_loading(key),
            ArticleState::Ready(article) => Ok(self.render_article(article, sections)?.html),
        }
    }

    pub fn render_not_found(&self, path: &str) -> Result<String, HostError> {
        let context = Context {
            title: "Not found".to_string(),
            missing_path: Some(path.to_string()),
            ..self.base_context()
        };
        self.render("not_found.html", &context)
    }

    /// Listing of all articles, grouped by category.
    pub fn render_index(&self, articles: &[Arc<CompiledArticle>]) -> Result<String, HostError> {
        let mut groups: BTreeMap<&str, Vec<IndexEntry>> = BTreeMap::new();
        for article in articles {
            groups
                .entry(article.category.as_str())
                .or_default()
                .push(IndexEntry {
                    title: article.title(),
                    url: format!(
                        "{}article/{}/{}",
                        self.config.base_url, article.category, article.slug
                    ),
                    date: format_optional_date(article.front_matter.date()),
                });
        }

        let context = Context {
            title: "Articles".to_string(),
            groups: groups
                .into_iter()
                .map(|(name, articles)| CategoryGroup {
                    name: name.to_string(),
                    title: capitalize(&name.replace('-', " ")),
                    articles,
                })
                .collect(),
            ..self.base_context()
        };
        self.render("index.html", &context)
    }

    fn base_context(&self) -> Context {
        Context {
            site_title: self.config.site_title.clone(),
            base_url: self.config.base_url.clone(),
            styles: self.config.styles.clone(),
            hot_reload: self.config.hot_reload,
            ..Default::default()
        }
    }

    fn render(&self, template: &'static str, context: &Context) -> Result<String, HostError> {
        self.pages
            .render_page(template, context)
            .map_err(|source| HostError::Template { template, source })
    }
}

impl Default for RenderHost {
    fn default() -> Self {
        Self::new(PageShellConfig::default())
    }
}

/// Execute a body, turning both errors and panics into a reason string.
fn execute_guarded(body: &dyn Execute, ctx: &RenderContext<'_>) -> Result<String, String> {
    match panic::catch_unwind(AssertUnwindSafe(|| body.execute(ctx))) {
        Ok(Ok(html)) => Ok(html),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

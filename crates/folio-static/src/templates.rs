//! Template engine for rendering site pages.

use minijinja::Environment;
use serde::Serialize;

use folio_mdx::TocEntry;

use crate::host::PageShell;

/// One article in the index listing.
#[derive(Debug, Clone, Serialize)]
pub struct IndexEntry {
    /// Display title
    pub title: String,
    /// URL path
    pub url: String,
    /// Formatted date
    pub date: String,
}

/// Articles of one category in the index listing.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryGroup {
    /// Category segment
    pub name: String,
    /// Display heading
    pub title: String,
    pub articles: Vec<IndexEntry>,
}

/// Context for rendering a page template.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Context {
    /// Page title
    pub title: String,
    /// Site title
    pub site_title: String,
    /// Base URL
    pub base_url: String,
    /// Paths to extra CSS stylesheets
    pub styles: Vec<String>,
    /// Include the hot reload client
    pub hot_reload: bool,
    /// Ask the browser to reload after this many seconds
    pub refresh_seconds: Option<u32>,
    /// Document key of the article, `category/slug`
    pub document: Option<String>,
    /// Article banner
    pub shell: Option<PageShell>,
    /// Rendered body HTML
    pub content: String,
    /// Table of contents
    pub toc: Vec<TocEntry>,
    /// Index listing
    pub groups: Vec<CategoryGroup>,
    /// Requested path of a missing page
    pub missing_path: Option<String>,
}

/// Template engine using minijinja.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create a new template engine with the page templates.
    pub fn new() -> Self {
        let mut env = Environment::new();

        for (name, source) in [
            ("base.html", BASE_TEMPLATE),
            ("article.html", ARTICLE_TEMPLATE),
            ("loading.html", LOADING_TEMPLATE),
            ("not_found.html", NOT_FOUND_TEMPLATE),
            ("index.html", INDEX_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("Failed to add page template");
        }

        Self { env }
    }

    /// Render a page using the specified template.
    pub fn render_page(&self, template: &str, context: &Context) -> Result<String, minijinja::Error> {
        self.env.get_template(template)?.render(context)
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

const BASE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  {% if refresh_seconds %}<meta http-equiv="refresh" content="{{ refresh_seconds }}">
  {% endif %}<title>{{ title }} - {{ site_title }}</title>
  {% for style in styles %}<link rel="stylesheet" href="{{ style }}">
  {% endfor %}<link rel="stylesheet" href="{{ base_url }}assets/main.css">
</head>
<body>
  <header class="site-header">
    <a href="{{ base_url }}" class="site-title">{{ site_title }}</a>
  </header>
  <main class="main">
    {% block content %}{% endblock %}
  </main>
  {% if hot_reload %}<script src="/__hmr.js"></script>
  {% endif %}
</body>
</html>"##;

const ARTICLE_TEMPLATE: &str = r##"{% extends "base.html" %}

{% block content %}
<article class="article" data-document="{{ document }}">
  <header class="article-banner">
    <h1 class="article-title">{{ shell.title }}</h1>
    <div class="article-meta">
      <span class="article-author">Author: {{ shell.author }}</span>
      <span class="article-date">Date: {{ shell.date }}</span>
      <span class="article-category">Category: {{ shell.category }}</span>
    </div>
  </header>
  {% if toc %}
  <nav class="toc">
    <h2>On this page</h2>
    <ul>
    {% for entry in toc %}
      <li class="toc-level-{{ entry.level }}"><a href="#{{ entry.id }}">{{ entry.title }}</a></li>
    {% endfor %}
    </ul>
  </nav>
  {% endif %}
  <div class="article-body">
    {{ content | safe }}
  </div>
</article>
{% endblock %}"##;

const LOADING_TEMPLATE: &str = r##"{% extends "base.html" %}

{% block content %}
<article class="article article-loading" data-document="{{ document }}" aria-busy="true">
  <div class="skeleton skeleton-back"></div>
  <div class="skeleton skeleton-title"></div>
  <div class="article-meta">
    <div class="skeleton skeleton-meta"></div>
    <div class="skeleton skeleton-meta"></div>
    <div class="skeleton skeleton-meta"></div>
  </div>
  <div class="article-body">
    <div class="skeleton skeleton-heading"></div>
    <div class="skeleton skeleton-block"></div>
    <div class="skeleton skeleton-heading"></div>
    <div class="skeleton skeleton-block"></div>
  </div>
  <p class="loading-hint">Loading article&hellip;</p>
</article>
{% endblock %}"##;

const NOT_FOUND_TEMPLATE: &str = r##"{% extends "base.html" %}

{% block content %}
<section class="not-found">
  <h1>Article not found</h1>
  {% if missing_path %}<p>Nothing is published at <code>{{ missing_path }}</code>.</p>{% endif %}
  <p><a href="{{ base_url }}">Back to all articles</a></p>
</section>
{% endblock %}"##;

const INDEX_TEMPLATE: &str = r##"{% extends "base.html" %}

{% block content %}
<section class="article-index">
  <h1>{{ site_title }}</h1>
  {% for group in groups %}
  <section class="category" id="category-{{ group.name }}">
    <h2>{{ group.title }}</h2>
    <ul>
    {% for article in group.articles %}
      <li><a href="{{ article.url }}">{{ article.title }}</a> <span class="article-date">{{ article.date }}</span></li>
    {% endfor %}
    </ul>
  </section>
  {% else %}
  <p class="empty">No articles yet.</p>
  {% endfor %}
</section>
{% endblock %}"##;

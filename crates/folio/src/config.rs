//! Site configuration (folio.toml).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use folio_components::{Expansion, ExpansionPolicy};
use folio_static::PageShellConfig;

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub content: ContentConfig,
    pub build: BuildSettings,
    pub render: RenderConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub title: String,
    /// Author shown when an article has none
    pub author: String,
    pub base_url: String,
    /// Category shown when an article has none
    pub default_category: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        let shell = PageShellConfig::default();
        Self {
            title: shell.site_title,
            author: shell.default_author,
            base_url: shell.base_url,
            default_category: shell.default_category,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub dir: PathBuf,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("content"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    pub output: PathBuf,
    pub minify: bool,
    /// Stylesheets appended to the main CSS
    pub styles: Vec<PathBuf>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            output: PathBuf::from("dist"),
            minify: true,
            styles: vec![],
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RenderConfig {
    /// Whether collapsible sections start open
    pub default_expansion: Expansion,
    /// Directory of widget template overrides
    pub widget_templates: Option<PathBuf>,
    /// Per-article settings keyed by `category/slug`
    pub documents: HashMap<String, DocumentRender>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentRender {
    pub expansion: Expansion,
}

impl Config {
    /// Load configuration from `path` if it exists.
    ///
    /// Returns an error if the file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No {} found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Page shell settings for the render host.
    pub fn shell(&self) -> PageShellConfig {
        PageShellConfig {
            site_title: self.site.title.clone(),
            base_url: normalize_base_url(&self.site.base_url),
            default_author: self.site.author.clone(),
            default_category: self.site.default_category.clone(),
            ..Default::default()
        }
    }

    pub fn expansion_policy(&self) -> ExpansionPolicy {
        ExpansionPolicy {
            default: self.render.default_expansion,
            documents: self
                .render
                .documents
                .iter()
                .map(|(key, doc)| (key.clone(), doc.expansion))
                .collect(),
        }
    }
}

fn normalize_base_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

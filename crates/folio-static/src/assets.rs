//! Asset pipeline for the site stylesheet.

use std::fs;
use std::path::Path;

/// Asset pipeline utilities.
pub struct AssetPipeline;

impl AssetPipeline {
    /// Generate the main CSS file.
    pub fn generate_css() -> String {
        DEFAULT_CSS.to_string()
    }

    /// Generate the main CSS file followed by extra stylesheets.
    ///
    /// Stylesheets that cannot be read are skipped with a warning.
    pub fn bundle_css<P: AsRef<Path>>(styles: &[P]) -> String {
        let mut css = Self::generate_css();
        for path in styles {
            let path = path.as_ref();
            match fs::read_to_string(path) {
                Ok(extra) => {
                    css.push('\n');
                    css.push_str(&extra);
                    tracing::info!("Bundled stylesheet {}", path.display());
                }
                Err(e) => tracing::warn!("Stylesheet {} not bundled: {}", path.display(), e),
            }
        }
        css
    }

    /// Minify CSS using lightningcss.
    pub fn minify_css(css: &str) -> Result<String, String> {
        use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};

        let stylesheet = StyleSheet::parse(css, ParserOptions::default())
            .map_err(|e| format!("CSS parse error: {}", e))?;

        let minified = stylesheet
            .to_css(PrinterOptions {
                minify: true,
                ..Default::default()
            })
            .map_err(|e| format!("CSS minify error: {}", e))?;

        Ok(minified.code)
    }
}

// Structural styles only; sites restyle through the `styles` setting.
const DEFAULT_CSS: &str = r#"/* folio base styles */

:root {
  --content-max-width: 48rem;
  --muted: #e5e7eb;
  --border: #d1d5db;
  --error: #dc2626;
}

* {
  box-sizing: border-box;
}

body {
  margin: 0;
  font-family: system-ui, -apple-system, sans-serif;
  line-height: 1.6;
}

.site-header {
  padding: 1rem;
  border-bottom: 1px solid var(--border);
}

.main {
  max-width: var(--content-max-width);
  margin: 0 auto;
  padding: 2rem 1rem;
}

/* Article banner */
.article-meta {
  display: flex;
  flex-wrap: wrap;
  justify-content: space-between;
  gap: 0.5rem;
  margin-bottom: 1.5rem;
}

.article-body img,
.article-body iframe {
  max-width: 100%;
}

.toc ul {
  list-style: none;
  padding-left: 0;
}

.toc-level-3 {
  padding-left: 1rem;
}

.toc-level-4 {
  padding-left: 2rem;
}

/* Widgets */
.video-embed {
  position: relative;
  aspect-ratio: 16 / 9;
}

.video-embed iframe {
  position: absolute;
  inset: 0;
  width: 100%;
  height: 100%;
}

.accordion-item,
.collapsible {
  border-bottom: 1px solid var(--border);
}

.accordion-trigger,
.collapsible-trigger {
  cursor: pointer;
  padding: 0.75rem 0;
}

/* Error blocks */
.content-error {
  padding: 1.5rem;
  border: 1px solid var(--error);
  color: var(--error);
}

/* Loading skeleton */
.skeleton {
  background: var(--muted);
  border-radius: 0.25rem;
  margin-bottom: 0.75rem;
  animation: pulse 1.5s ease-in-out infinite;
}

.skeleton-back { height: 2.5rem; width: 6rem; }
.skeleton-title { height: 3rem; width: 75%; }
.skeleton-meta { height: 2rem; width: 25%; }
.skeleton-heading { height: 2rem; width: 50%; }
.skeleton-block { height: 5rem; }

@keyframes pulse {
  50% { opacity: 0.5; }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generates_css() {
        let css = AssetPipeline::generate_css();
        assert!(css.contains(":root"));
        assert!(css.contains(".content-error"));
        assert!(css.contains(".skeleton"));
    }

    #[test]
    fn bundles_extra_styles() {
        let dir = tempdir().unwrap();
        let theme = dir.path().join("theme.css");
        fs::write(&theme, ".article-title { color: teal; }").unwrap();

        let css = AssetPipeline::bundle_css(&[theme, dir.path().join("missing.css")]);

        assert!(css.contains("color: teal"));
        assert!(css.starts_with(DEFAULT_CSS));
    }

    #[test]
    fn minifies_css() {
        let minified = AssetPipeline::minify_css(DEFAULT_CSS).unwrap();

        assert!(!minified.contains('\n'));
        assert!(minified.contains(".content-error"));
    }
}

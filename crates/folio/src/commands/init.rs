//! Create a config file and a sample article.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Run the init command.
pub async fn run(config_path: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing folio...");
    scaffold(config_path, Path::new("content"), yes)?;

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'folio dev' to start the development server.");

    Ok(())
}

fn scaffold(config_path: &Path, content_dir: &Path, yes: bool) -> Result<()> {
    if content_dir.exists() && !yes {
        tracing::warn!(
            "{} already exists. Use --yes to overwrite.",
            content_dir.display()
        );
        return Ok(());
    }

    let category_dir = content_dir.join("software");
    fs::create_dir_all(&category_dir).context("Failed to create content directory")?;

    if !config_path.exists() || yes {
        fs::write(config_path, DEFAULT_CONFIG)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        tracing::info!("Created {}", config_path.display());
    }

    let article_path = category_dir.join("hello-world.mdx");
    if !article_path.exists() || yes {
        fs::write(&article_path, DEFAULT_ARTICLE).context("Failed to write hello-world.mdx")?;
        tracing::info!("Created {}", article_path.display());
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# folio configuration

[site]
title = "My Site"
# Shown when an article has no author
author = "Anonymous"
base_url = "/"
# Shown when an article has no category
default_category = "software"

[content]
# Articles live at {dir}/{category}/{slug}.mdx
dir = "content"

[build]
output = "dist"
minify = true
# Extra stylesheets appended to the main CSS
styles = []

[render]
# "expanded" or "collapsed"
default_expansion = "collapsed"

# Per-article overrides
# [render.documents."software/hello-world"]
# expansion = "expanded"
"#;

const DEFAULT_ARTICLE: &str = r#"---
title: Hello World
date: 2024-01-05
category: software
---

# Hello World

This article is written in **MDX**: markdown plus a small set of components.

<Image src="/images/hello.png" alt="A friendly greeting" width={640} />

<Collapsible id="details">
<CollapsibleTrigger>More details</CollapsibleTrigger>
<CollapsibleContent>

Sections start collapsed unless the article or the config says otherwise.

</CollapsibleContent>
</Collapsible>

<Accordion type="single" defaultValue="video">
  <AccordionItem value="video">
    <AccordionTrigger>A video</AccordionTrigger>
    <AccordionContent>
      <YouTubeEmbed videoId="dQw4w9WgXcQ" title="Demo video" />
    </AccordionContent>
  </AccordionItem>
</Accordion>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use folio_components::Compiler;
    use tempfile::tempdir;

    #[test]
    fn scaffolds_config_and_article() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("folio.toml");
        let content = dir.path().join("content");

        scaffold(&config_path, &content, false).unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.site.title, "My Site");
        assert!(content.join("software/hello-world.mdx").exists());
    }

    #[test]
    fn keeps_existing_content_without_yes() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("folio.toml");
        let content = dir.path().join("content");
        fs::create_dir_all(&content).unwrap();

        scaffold(&config_path, &content, false).unwrap();

        assert!(!config_path.exists());
    }

    #[test]
    fn sample_article_compiles() {
        let doc = folio_mdx::parse_document(DEFAULT_ARTICLE);

        assert_eq!(doc.front_matter.title(), Some("Hello World"));
        assert!(Compiler::new().compile(&doc.body).is_ok());
    }
}

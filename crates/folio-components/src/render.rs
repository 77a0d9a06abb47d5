//! Compiled render trees and their execution.

use std::fs;
use std::path::PathBuf;

use minijinja::{context, Environment, Error, ErrorKind};
use serde::Serialize;

use folio_mdx::TocEntry;

use crate::state::{Expansion, SectionStore};
use crate::traits::{Execute, RenderError};
use crate::widgets::{Accordion, Collapsible, Widget};

/// Message shown in place of an article body that failed to compile.
pub const FALLBACK_MESSAGE: &str = "Article content could not be loaded properly.";

/// A node of a compiled article body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Node {
    /// Pre-rendered markdown
    Html(String),
    /// An allow-listed widget
    Widget(Widget),
}

/// The executable form of an article body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompiledRender {
    /// Body nodes in document order
    pub nodes: Vec<Node>,

    /// Table of contents
    pub toc: Vec<TocEntry>,
}

impl CompiledRender {
    /// The fixed render substituted when compilation fails.
    pub fn fallback() -> Self {
        Self {
            nodes: vec![Node::Html(format!(
                "<div class=\"content-error\">{FALLBACK_MESSAGE}</div>"
            ))],
            toc: Vec::new(),
        }
    }
}

impl Execute for CompiledRender {
    fn execute(&self, ctx: &RenderContext<'_>) -> Result<String, RenderError> {
        render_nodes(&self.nodes, ctx)
    }
}

/// Everything a render tree needs at display time.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Document key, `category/slug`
    pub document: &'a str,

    /// Widget templates
    pub templates: &'a WidgetTemplates,

    /// Open/closed state of collapsible sections
    pub sections: &'a SectionStore,

    /// Default expansion for this document
    pub expansion: Expansion,
}

fn render_nodes(nodes: &[Node], ctx: &RenderContext<'_>) -> Result<String, RenderError> {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Html(html) => out.push_str(html),
            Node::Widget(widget) => out.push_str(&render_widget(widget, ctx)?),
        }
    }
    Ok(out)
}

fn render_widget(widget: &Widget, ctx: &RenderContext<'_>) -> Result<String, RenderError> {
    match widget {
        Widget::Image(image) => ctx.templates.render(
            IMAGE,
            context! {
                src => &image.src,
                alt => &image.alt,
                width => image.width,
                height => image.height,
                caption => &image.caption,
            },
        ),
        Widget::VideoEmbed(video) => ctx.templates.render(
            VIDEO_EMBED,
            context! {
                video_id => &video.video_id,
                src => video.embed_url(),
                title => &video.title,
                class_name => &video.class_name,
            },
        ),
        Widget::Accordion(accordion) => render_accordion(accordion, ctx),
        Widget::Collapsible(section) => render_collapsible(section, ctx),
    }
}

#[derive(Serialize)]
struct ItemView {
    value: String,
    trigger: String,
    content: String,
    open: bool,
}

fn render_accordion(accordion: &Accordion, ctx: &RenderContext<'_>) -> Result<String, RenderError> {
    let mut items = Vec::with_capacity(accordion.items.len());
    for item in &accordion.items {
        items.push(ItemView {
            value: item.value.clone(),
            trigger: render_nodes(&item.trigger, ctx)?,
            content: render_nodes(&item.content, ctx)?,
            open: accordion.default_value.as_deref() == Some(item.value.as_str()),
        });
    }

    ctx.templates.render(
        ACCORDION,
        context! {
            group => &accordion.group,
            multiple => accordion.multiple,
            items => items,
        },
    )
}

fn render_collapsible(section: &Collapsible, ctx: &RenderContext<'_>) -> Result<String, RenderError> {
    let default_open = section.default_open.unwrap_or(ctx.expansion.is_open());
    let open = ctx.sections.is_open(ctx.document, &section.id, default_open);

    ctx.templates.render(
        COLLAPSIBLE,
        context! {
            id => &section.id,
            document => ctx.document,
            open => open,
            trigger => render_nodes(&section.trigger, ctx)?,
            content => render_nodes(&section.content, ctx)?,
        },
    )
}

const IMAGE: &str = "image.html";
const VIDEO_EMBED: &str = "video_embed.html";
const ACCORDION: &str = "accordion.html";
const COLLAPSIBLE: &str = "collapsible.html";

/// Names of the widget templates, as looked up in an override directory.
pub const WIDGET_TEMPLATES: [&str; 4] = [IMAGE, VIDEO_EMBED, ACCORDION, COLLAPSIBLE];

/// Templates used to display widgets.
///
/// Built-in templates can be replaced per widget by placing a file with the
/// same name in an override directory.
pub struct WidgetTemplates {
    env: Environment<'static>,
    overrides: Option<PathBuf>,
}

impl WidgetTemplates {
    /// Create templates using only the built-in defaults.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create templates that prefer files in `dir` over the built-ins.
    pub fn with_overrides(dir: impl Into<PathBuf>) -> Self {
        Self::build(Some(dir.into()))
    }

    fn build(overrides: Option<PathBuf>) -> Self {
        let mut env = Environment::new();
        let dir = overrides.clone();

        env.set_loader(move |name| {
            if let Some(dir) = &dir {
                match fs::read_to_string(dir.join(name)) {
                    Ok(source) => return Ok(Some(source)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(Error::new(
                            ErrorKind::InvalidOperation,
                            format!("failed to read widget template {name}"),
                        )
                        .with_source(e))
                    }
                }
            }
            Ok(builtin(name).map(str::to_string))
        });

        Self { env, overrides }
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String, RenderError> {
        self.env
            .get_template(name)
            .and_then(|tmpl| tmpl.render(ctx))
            .map_err(|source| RenderError::Template {
                template: name.to_string(),
                source,
            })
    }
}

impl Default for WidgetTemplates {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WidgetTemplates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetTemplates")
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

fn builtin(name: &str) -> Option<&'static str> {
    match name {
        IMAGE => Some(IMAGE_TEMPLATE),
        VIDEO_EMBED => Some(VIDEO_EMBED_TEMPLATE),
        ACCORDION => Some(ACCORDION_TEMPLATE),
        COLLAPSIBLE => Some(COLLAPSIBLE_TEMPLATE),
        _ => None,
    }
}

const IMAGE_TEMPLATE: &str = r##"<figure class="article-image">
  <img src="{{ src }}" alt="{{ alt }}"{% if width %} width="{{ width }}"{% endif %}{% if height %} height="{{ height }}"{% endif %} loading="lazy">
  {% if caption %}<figcaption>{{ caption }}</figcaption>{% endif %}
</figure>
"##;

const VIDEO_EMBED_TEMPLATE: &str = r##"<div class="video-embed">
  <iframe width="560" height="315" src="{{ src }}" title="{{ title }}" frameborder="0" allow="accelerometer; autoplay; clipboard-write; encrypted-media; gyroscope; picture-in-picture" allowfullscreen loading="lazy"{% if class_name %} class="{{ class_name }}"{% endif %}></iframe>
</div>
"##;

const ACCORDION_TEMPLATE: &str = r##"<div class="accordion" data-type="{% if multiple %}multiple{% else %}single{% endif %}">
{% for item in items %}  <details class="accordion-item" data-value="{{ item.value }}"{% if not multiple %} name="{{ group }}"{% endif %}{% if item.open %} open{% endif %}>
    <summary class="accordion-trigger">{{ item.trigger | safe }}</summary>
    <div class="accordion-content">{{ item.content | safe }}</div>
  </details>
{% endfor %}</div>
"##;

const COLLAPSIBLE_TEMPLATE: &str = r##"<details class="collapsible" id="{{ id }}" data-document="{{ document }}" data-section="{{ id }}"{% if open %} open{% endif %}>
  <summary class="collapsible-trigger">{{ trigger | safe }}</summary>
  <div class="collapsible-content">{{ content | safe }}</div>
</details>
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use std::fs;
    use tempfile::tempdir;

    const BODY: &str = r#"Before

<Image src="/cover.png" alt="Cover" width={640} />

<Collapsible id="intro">
<CollapsibleTrigger>Intro</CollapsibleTrigger>
<CollapsibleContent>Hidden *text*</CollapsibleContent>
</Collapsible>

<Accordion defaultValue="b">
  <AccordionItem value="a">
    <AccordionTrigger>A</AccordionTrigger>
    <AccordionContent>Alpha</AccordionContent>
  </AccordionItem>
  <AccordionItem value="b">
    <AccordionTrigger>B</AccordionTrigger>
    <AccordionContent>Beta</AccordionContent>
  </AccordionItem>
</Accordion>
"#;

    fn run(render: &CompiledRender, templates: &WidgetTemplates, sections: &SectionStore, expansion: Expansion) -> Result<String, RenderError> {
        render.execute(&RenderContext {
            document: "software/test",
            templates,
            sections,
            expansion,
        })
    }

    #[test]
    fn executes_widgets_in_order() {
        let render = Compiler::new().compile(BODY).unwrap();
        let templates = WidgetTemplates::new();

        let html = run(&render, &templates, &SectionStore::new(), Expansion::Collapsed).unwrap();

        let before = html.find("<p>Before</p>").unwrap();
        let image = html.find("<img src=\"&#x2f;cover.png\"").unwrap();
        let section = html.find("data-section=\"intro\"").unwrap();
        let accordion = html.find("class=\"accordion\"").unwrap();
        assert!(before < image && image < section && section < accordion);
        assert!(html.contains("width=\"640\""));
        assert!(html.contains("<em>text</em>"));
        assert!(html.contains(r#"data-value="b" name="accordion-1" open"#));
        assert!(html.contains(r#"data-value="a" name="accordion-1">"#));
    }

    #[test]
    fn escapes_prop_values() {
        let render = Compiler::new()
            .compile(r#"<Image src="/x.png" alt="<b>bold</b>" />"#)
            .unwrap();

        let html = run(&render, &WidgetTemplates::new(), &SectionStore::new(), Expansion::Collapsed).unwrap();

        assert!(html.contains("alt=\"&lt;b&gt;bold&lt;&#x2f;b&gt;\""));
    }

    #[test]
    fn section_state_follows_policy_then_store() {
        let render = Compiler::new().compile(BODY).unwrap();
        let templates = WidgetTemplates::new();
        let mut sections = SectionStore::new();

        let collapsed = run(&render, &templates, &sections, Expansion::Collapsed).unwrap();
        assert!(collapsed.contains(r#"data-section="intro">"#));

        let expanded = run(&render, &templates, &sections, Expansion::Expanded).unwrap();
        assert!(expanded.contains(r#"data-section="intro" open>"#));

        sections.set("software/test", "intro", false);
        let stored = run(&render, &templates, &sections, Expansion::Expanded).unwrap();
        assert!(stored.contains(r#"data-section="intro">"#));
    }

    #[test]
    fn execution_is_deterministic() {
        let compiler = Compiler::new();
        let templates = WidgetTemplates::new();
        let sections = SectionStore::new();

        let a = run(&compiler.compile(BODY).unwrap(), &templates, &sections, Expansion::Collapsed).unwrap();
        let b = run(&compiler.compile(BODY).unwrap(), &templates, &sections, Expansion::Collapsed).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn override_templates_replace_builtins() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("image.html"), "<img data-custom src=\"{{ src }}\">").unwrap();

        let templates = WidgetTemplates::with_overrides(dir.path());
        let render = Compiler::new().compile("<Image src=\"/a.png\" />").unwrap();

        let html = run(&render, &templates, &SectionStore::new(), Expansion::Collapsed).unwrap();

        assert_eq!(html, "<img data-custom src=\"&#x2f;a.png\">");
    }

    #[test]
    fn broken_override_is_a_render_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("video_embed.html"), "{% if %}").unwrap();

        let templates = WidgetTemplates::with_overrides(dir.path());
        let render = Compiler::new()
            .compile("<YouTubeEmbed videoId=\"abc123\" />")
            .unwrap();

        let err = run(&render, &templates, &SectionStore::new(), Expansion::Collapsed).unwrap_err();

        assert!(matches!(err, RenderError::Template { ref template, .. } if template == "video_embed.html"));
    }

    #[test]
    fn fallback_shows_fixed_message() {
        let html = run(
            &CompiledRender::fallback(),
            &WidgetTemplates::new(),
            &SectionStore::new(),
            Expansion::Collapsed,
        )
        .unwrap();

        assert!(html.contains(FALLBACK_MESSAGE));
    }
}

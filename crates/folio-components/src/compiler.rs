//! Document compiler.
//!
//! Turns an article body into a [`CompiledRender`]: markdown segments become
//! HTML, component elements are resolved against an [`AllowList`] and built
//! into typed widgets. Compilation holds no state between calls, so the same
//! body always compiles to the same render tree.

use std::collections::HashMap;

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};

use folio_mdx::{
    parse_markup, slugify, Element, FrontMatter, MarkupError, MarkupNode, ParsedDoc, PropValue,
    TocEntry,
};

use crate::registry::{AllowList, Resolution};
use crate::render::{CompiledRender, Node};
use crate::safety::{has_unsafe_scheme, unsafe_html};

/// Errors that can occur when compiling an article body.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("Malformed markup: {0}")]
    Markup(#[from] MarkupError),

    #[error("line {line}: <{name}> is not an allowed component")]
    UnknownComponent { name: String, line: usize },

    #[error("line {line}: <{name}> must be used inside <{parent}>")]
    MisplacedPart {
        name: String,
        parent: &'static str,
        line: usize,
    },

    #[error("line {line}: <{component}> is missing required prop `{prop}`")]
    MissingProp {
        component: String,
        prop: String,
        line: usize,
    },

    #[error("line {line}: <{component}> prop `{prop}` is invalid: {message}")]
    InvalidProp {
        component: String,
        prop: String,
        line: usize,
        message: String,
    },

    #[error("line {line}: <{component}> prop `{prop}` uses an expression; only literals are allowed")]
    ExpressionProp {
        component: String,
        prop: String,
        line: usize,
    },

    #[error("line {line}: <{component}> {message}")]
    Structure {
        component: String,
        line: usize,
        message: String,
    },

    #[error("Raw HTML is not allowed: {0}")]
    UnsafeHtml(String),

    #[error("URL {url:?} uses a disallowed scheme")]
    UnsafeUrl { url: String },
}

/// Outcome of compiling a parsed document.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompileStatus {
    /// The body compiled
    Success,
    /// The body failed to compile; the fallback render is used
    Fallback { reason: String },
}

impl CompileStatus {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// A compiled document: front matter plus the render tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub front_matter: FrontMatter,
    pub render: CompiledRender,
    pub status: CompileStatus,
}

/// Compiles article bodies against an allow-list.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compiler {
    allow_list: AllowList,
}

impl Compiler {
    /// Create a compiler with the standard allow-list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compiler with a specific allow-list.
    pub fn with_allow_list(allow_list: AllowList) -> Self {
        Self { allow_list }
    }

    /// Compile a body into a render tree.
    pub fn compile(&self, body: &str) -> Result<CompiledRender, CompileError> {
        let markup = parse_markup(body)?;
        let mut lowering = Lowering::new(&self.allow_list);
        let nodes = lowering.lower(&markup)?;

        Ok(CompiledRender {
            nodes,
            toc: lowering.toc,
        })
    }

    /// Compile a parsed document, substituting the fallback render on failure.
    ///
    /// `label` identifies the document in logs.
    pub fn compile_document(&self, label: &str, doc: ParsedDoc) -> Compiled {
        match self.compile(&doc.body) {
            Ok(render) => Compiled {
                front_matter: doc.front_matter,
                render,
                status: CompileStatus::Success,
            },
            Err(e) => {
                tracing::warn!("Failed to compile {}: {}", label, e);
                Compiled {
                    front_matter: doc.front_matter,
                    render: CompiledRender::fallback(),
                    status: CompileStatus::Fallback {
                        reason: e.to_string(),
                    },
                }
            }
        }
    }
}

/// Per-compilation state: table of contents and id allocation.
pub struct Lowering<'a> {
    allow_list: &'a AllowList,
    toc: Vec<TocEntry>,
    heading_ids: HashMap<String, usize>,
    section_ids: HashMap<String, usize>,
    accordions: usize,
}

impl<'a> Lowering<'a> {
    fn new(allow_list: &'a AllowList) -> Self {
        Self {
            allow_list,
            toc: Vec::new(),
            heading_ids: HashMap::new(),
            section_ids: HashMap::new(),
            accordions: 0,
        }
    }

    /// Lower block-level markup into render nodes.
    pub fn lower(&mut self, nodes: &[MarkupNode]) -> Result<Vec<Node>, CompileError> {
        let mut out = Vec::new();
        for node in nodes {
            match node {
                MarkupNode::Text(text) if text.trim().is_empty() => {}
                MarkupNode::Text(text) => out.push(Node::Html(self.render_markdown(text)?)),
                MarkupNode::Element(el) => out.push(Node::Widget(self.build(el)?)),
            }
        }
        Ok(out)
    }

    /// Lower markup that is displayed inline, such as a trigger label.
    pub fn lower_inline(&mut self, nodes: &[MarkupNode]) -> Result<Vec<Node>, CompileError> {
        let mut out = Vec::new();
        for node in nodes {
            match node {
                MarkupNode::Text(text) if text.trim().is_empty() => {}
                MarkupNode::Text(text) => {
                    let html = self.render_markdown(text.trim())?;
                    out.push(Node::Html(unwrap_paragraph(&html)));
                }
                MarkupNode::Element(el) => out.push(Node::Widget(self.build(el)?)),
            }
        }
        Ok(out)
    }

    /// Reject expression props on any element.
    pub fn check_props(&self, el: &Element) -> Result<(), CompileError> {
        for (prop, value) in &el.props {
            if matches!(value, PropValue::Expression(_)) {
                return Err(CompileError::ExpressionProp {
                    component: el.name.clone(),
                    prop: prop.clone(),
                    line: el.line,
                });
            }
        }
        Ok(())
    }

    /// Allocate a unique section id derived from `base`.
    pub fn unique_section_id(&mut self, base: &str) -> String {
        let base = if base.is_empty() { "section" } else { base };
        unique(&mut self.section_ids, base)
    }

    /// Allocate the group name of the next accordion.
    pub fn next_accordion_group(&mut self) -> String {
        self.accordions += 1;
        format!("accordion-{}", self.accordions)
    }

    fn build(&mut self, el: &Element) -> Result<crate::widgets::Widget, CompileError> {
        match self.allow_list.resolve(&el.name) {
            Resolution::Component(spec) => {
                self.check_props(el)?;
                (spec.build)(el, self)
            }
            Resolution::Part(spec) => Err(CompileError::MisplacedPart {
                name: el.name.clone(),
                parent: spec.names[0],
                line: el.line,
            }),
            Resolution::Unknown => Err(CompileError::UnknownComponent {
                name: el.name.clone(),
                line: el.line,
            }),
        }
    }

    /// Render a markdown segment, assigning heading anchors and collecting the TOC.
    fn render_markdown(&mut self, text: &str) -> Result<String, CompileError> {
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS;

        let mut events: Vec<Event> = Parser::new_ext(text, options).collect();
        check_safety(&events)?;

        let mut i = 0;
        while i < events.len() {
            if let Event::Start(Tag::Heading { level, .. }) = &events[i] {
                let level = *level as u8;
                let mut title = String::new();
                let mut j = i + 1;
                while j < events.len() {
                    match &events[j] {
                        Event::End(TagEnd::Heading(_)) => break,
                        Event::Text(t) | Event::Code(t) => title.push_str(t),
                        _ => {}
                    }
                    j += 1;
                }

                let base = slugify(&title);
                let base = if base.is_empty() { "heading" } else { base.as_str() };
                let id = unique(&mut self.heading_ids, base);

                if let Event::Start(Tag::Heading { id: anchor, .. }) = &mut events[i] {
                    *anchor = Some(CowStr::from(id.clone()));
                }
                self.toc.push(TocEntry { title, id, level });
            }
            i += 1;
        }

        let mut html_output = String::new();
        html::push_html(&mut html_output, events.into_iter());
        Ok(html_output)
    }
}

/// Reject raw HTML and link targets that could run code.
fn check_safety(events: &[Event]) -> Result<(), CompileError> {
    let mut run = String::new();
    for event in events {
        match event {
            Event::Html(raw) | Event::InlineHtml(raw) => {
                run.push_str(raw);
                continue;
            }
            Event::Start(Tag::Link { dest_url, .. }) | Event::Start(Tag::Image { dest_url, .. })
                if has_unsafe_scheme(dest_url) =>
            {
                return Err(CompileError::UnsafeUrl {
                    url: dest_url.to_string(),
                });
            }
            _ => {}
        }
        check_html_run(&mut run)?;
    }
    check_html_run(&mut run)
}

fn check_html_run(run: &mut String) -> Result<(), CompileError> {
    if let Some(reason) = unsafe_html(run) {
        return Err(CompileError::UnsafeHtml(reason));
    }
    run.clear();
    Ok(())
}

/// Return `base`, or `base-N` if it was already handed out.
fn unique(seen: &mut HashMap<String, usize>, base: &str) -> String {
    let count = seen.entry(base.to_string()).or_insert(0);
    *count += 1;
    if *count == 1 {
        base.to_string()
    } else {
        format!("{}-{}", base, *count - 1)
    }
}

/// Strip the wrapper from a single rendered paragraph.
fn unwrap_paragraph(html: &str) -> String {
    let trimmed = html.trim_end();
    match trimmed
        .strip_prefix("<p>")
        .and_then(|s| s.strip_suffix("</p>"))
    {
        Some(inner) if !inner.contains("<p>") => inner.to_string(),
        _ => html.to_string(),
    }
}

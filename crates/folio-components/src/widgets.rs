//! Typed widgets that articles may embed.
//!
//! Each widget family has a factory that validates an [`Element`] and builds
//! the typed value. Factories are registered in the allow-list
//! ([`crate::registry`]); nothing else can produce a [`Widget`].

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use folio_mdx::{slugify, Element, MarkupNode, PropValue};

use crate::compiler::{CompileError, Lowering};
use crate::render::Node;
use crate::safety::has_unsafe_scheme;

/// An allow-listed widget with validated props.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "component", rename_all = "snake_case")]
pub enum Widget {
    Image(Image),
    VideoEmbed(VideoEmbed),
    Accordion(Accordion),
    Collapsible(Collapsible),
}

/// `<Image src="…" alt="…" width={…} height={…} caption="…" />`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image {
    pub src: String,
    pub alt: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub caption: Option<String>,
}

/// `<YouTubeEmbed videoId="…" title="…" />`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoEmbed {
    pub video_id: String,
    pub title: String,
    pub class_name: Option<String>,
}

impl VideoEmbed {
    /// Embed URL for the player iframe.
    pub fn embed_url(&self) -> String {
        format!("https://www.youtube.com/embed/{}", self.video_id)
    }
}

/// `<Accordion type="single|multiple" defaultValue="…">` with items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Accordion {
    /// Group name shared by items of a single-open accordion
    pub group: String,
    /// Whether several items may be open at once
    pub multiple: bool,
    /// Value of the item open on first display
    pub default_value: Option<String>,
    pub items: Vec<AccordionItem>,
}

/// One `<AccordionItem>` with its trigger and content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccordionItem {
    pub value: String,
    pub trigger: Vec<Node>,
    pub content: Vec<Node>,
}

/// `<Collapsible id="…" defaultOpen>` with a trigger and content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collapsible {
    /// Section id, unique within the article
    pub id: String,
    /// Explicit initial state; `None` defers to the document policy
    pub default_open: Option<bool>,
    pub trigger: Vec<Node>,
    pub content: Vec<Node>,
}

pub(crate) fn build_image(el: &Element, _cx: &mut Lowering<'_>) -> Result<Widget, CompileError> {
    let src = required_string(el, "src")?;
    if has_unsafe_scheme(&src) {
        return Err(invalid(el, "src", "scheme is not allowed"));
    }
    reject_children(el)?;

    Ok(Widget::Image(Image {
        src,
        alt: string_prop(el, "alt")?.unwrap_or_default(),
        width: dimension_prop(el, "width")?,
        height: dimension_prop(el, "height")?,
        caption: string_prop(el, "caption")?,
    }))
}

pub(crate) fn build_video_embed(
    el: &Element,
    _cx: &mut Lowering<'_>,
) -> Result<Widget, CompileError> {
    static VIDEO_ID: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("Invalid video id regex"));

    let video_id = required_string(el, "videoId")?;
    if !VIDEO_ID.is_match(&video_id) {
        return Err(invalid(el, "videoId", "must be 1-64 letters, digits, '-' or '_'"));
    }
    reject_children(el)?;

    Ok(Widget::VideoEmbed(VideoEmbed {
        video_id,
        title: string_prop(el, "title")?.unwrap_or_else(|| "YouTube video".to_string()),
        class_name: string_prop(el, "className")?,
    }))
}

pub(crate) fn build_accordion(
    el: &Element,
    cx: &mut Lowering<'_>,
) -> Result<Widget, CompileError> {
    let multiple = match string_prop(el, "type")?.as_deref() {
        None | Some("single") => false,
        Some("multiple") => true,
        Some(_) => return Err(invalid(el, "type", "expected \"single\" or \"multiple\"")),
    };
    let default_value = string_prop(el, "defaultValue")?;

    let mut items = Vec::new();
    for child in part_children(el)? {
        if child.name != "AccordionItem" {
            return Err(structure(el, format!("<{}> cannot appear directly inside", child.name)));
        }
        cx.check_props(child)?;

        let value = string_prop(child, "value")?
            .unwrap_or_else(|| format!("item-{}", items.len() + 1));
        let (trigger, content) =
            trigger_and_content(child, "AccordionTrigger", "AccordionContent", cx)?;

        items.push(AccordionItem {
            value,
            trigger,
            content,
        });
    }

    if items.is_empty() {
        return Err(structure(el, "needs at least one <AccordionItem>".to_string()));
    }

    Ok(Widget::Accordion(Accordion {
        group: cx.next_accordion_group(),
        multiple,
        default_value,
        items,
    }))
}

pub(crate) fn build_collapsible(
    el: &Element,
    cx: &mut Lowering<'_>,
) -> Result<Widget, CompileError> {
    let default_open = match bool_prop(el, "defaultOpen")? {
        Some(open) => Some(open),
        None => bool_prop(el, "open")?,
    };

    let base_id = match string_prop(el, "id")? {
        Some(id) => slugify(&id),
        None => part_children(el)?
            .into_iter()
            .find(|c| c.name == "CollapsibleTrigger")
            .map(|t| slugify(&plain_text(&t.children)))
            .unwrap_or_default(),
    };

    let (trigger, content) =
        trigger_and_content(el, "CollapsibleTrigger", "CollapsibleContent", cx)?;

    Ok(Widget::Collapsible(Collapsible {
        id: cx.unique_section_id(&base_id),
        default_open,
        trigger,
        content,
    }))
}

/// Lower the trigger and content parts of an accordion item or collapsible.
fn trigger_and_content(
    el: &Element,
    trigger_name: &str,
    content_name: &str,
    cx: &mut Lowering<'_>,
) -> Result<(Vec<Node>, Vec<Node>), CompileError> {
    let mut trigger = None;
    let mut content = None;

    for child in part_children(el)? {
        cx.check_props(child)?;
        let slot = if child.name == trigger_name {
            &mut trigger
        } else if child.name == content_name {
            &mut content
        } else {
            return Err(structure(el, format!("<{}> cannot appear directly inside", child.name)));
        };
        if slot.is_some() {
            return Err(structure(el, format!("more than one <{}>", child.name)));
        }
        *slot = Some(child);
    }

    let trigger = trigger.ok_or_else(|| structure(el, format!("missing <{trigger_name}>")))?;
    let content = content.ok_or_else(|| structure(el, format!("missing <{content_name}>")))?;

    Ok((
        cx.lower_inline(&trigger.children)?,
        cx.lower(&content.children)?,
    ))
}

/// Element children of a container, rejecting stray non-whitespace text.
fn part_children(el: &Element) -> Result<Vec<&Element>, CompileError> {
    let mut parts = Vec::new();
    for child in &el.children {
        match child {
            MarkupNode::Element(e) => parts.push(e),
            MarkupNode::Text(t) if t.trim().is_empty() => {}
            MarkupNode::Text(_) => {
                return Err(structure(el, "text must be wrapped in a trigger or content part".into()))
            }
        }
    }
    Ok(parts)
}

fn reject_children(el: &Element) -> Result<(), CompileError> {
    let has_content = el.children.iter().any(|c| match c {
        MarkupNode::Text(t) => !t.trim().is_empty(),
        MarkupNode::Element(_) => true,
    });
    if has_content {
        return Err(structure(el, "does not accept children".into()));
    }
    Ok(())
}

/// Concatenated text of markup nodes, used to derive section ids.
fn plain_text(nodes: &[MarkupNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            MarkupNode::Text(t) => out.push_str(t),
            MarkupNode::Element(e) => out.push_str(&plain_text(&e.children)),
        }
    }
    out
}

fn string_prop(el: &Element, prop: &str) -> Result<Option<String>, CompileError> {
    match el.prop(prop) {
        None => Ok(None),
        Some(PropValue::String(s)) => Ok(Some(s.clone())),
        Some(PropValue::Number(n)) => Ok(Some(n.to_string())),
        Some(PropValue::Boolean(_)) => Err(invalid(el, prop, "expected a string")),
        Some(PropValue::Expression(_)) => Err(CompileError::ExpressionProp {
            component: el.name.clone(),
            prop: prop.to_string(),
            line: el.line,
        }),
    }
}

fn required_string(el: &Element, prop: &str) -> Result<String, CompileError> {
    string_prop(el, prop)?
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| CompileError::MissingProp {
            component: el.name.clone(),
            prop: prop.to_string(),
            line: el.line,
        })
}

fn dimension_prop(el: &Element, prop: &str) -> Result<Option<u32>, CompileError> {
    match el.prop(prop) {
        None => Ok(None),
        Some(PropValue::Number(n)) if *n >= 0.0 && n.fract() == 0.0 && *n <= f64::from(u32::MAX) => {
            Ok(Some(*n as u32))
        }
        Some(PropValue::String(s)) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| invalid(el, prop, "expected a whole number of pixels")),
        Some(_) => Err(invalid(el, prop, "expected a whole number of pixels")),
    }
}

fn bool_prop(el: &Element, prop: &str) -> Result<Option<bool>, CompileError> {
    match el.prop(prop) {
        None => Ok(None),
        Some(PropValue::Boolean(b)) => Ok(Some(*b)),
        Some(PropValue::String(s)) if s == "true" => Ok(Some(true)),
        Some(PropValue::String(s)) if s == "false" => Ok(Some(false)),
        Some(_) => Err(invalid(el, prop, "expected true or false")),
    }
}

fn invalid(el: &Element, prop: &str, message: &str) -> CompileError {
    CompileError::InvalidProp {
        component: el.name.clone(),
        prop: prop.to_string(),
        line: el.line,
        message: message.to_string(),
    }
}

fn structure(el: &Element, message: String) -> CompileError {
    CompileError::Structure {
        component: el.name.clone(),
        line: el.line,
        message,
    }
}

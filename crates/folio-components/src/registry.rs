//! Allow-list of components an article may reference.
//!
//! The allow-list is a static table from element names to typed factories.
//! The compiler resolves every element against it and rejects anything that
//! doesn't resolve; there is no dynamic lookup beyond this table.

use folio_mdx::Element;

use crate::compiler::{CompileError, Lowering};
use crate::widgets::{self, Widget};

/// Builds a typed widget from a validated element.
pub type Factory = fn(&Element, &mut Lowering<'_>) -> Result<Widget, CompileError>;

/// A widget family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Image,
    VideoEmbed,
    Accordion,
    CollapsibleSection,
}

impl ComponentKind {
    /// Stable identifier used in logs and docs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::VideoEmbed => "video-embed",
            Self::Accordion => "accordion",
            Self::CollapsibleSection => "collapsible-section",
        }
    }
}

/// One allow-list entry.
#[derive(Clone, Copy)]
pub struct ComponentSpec {
    /// Widget family
    pub kind: ComponentKind,

    /// Element names that create this widget
    pub names: &'static [&'static str],

    /// Element names only valid inside this widget
    pub parts: &'static [&'static str],

    /// Typed constructor
    pub build: Factory,
}

impl std::fmt::Debug for ComponentSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentSpec")
            .field("kind", &self.kind)
            .field("names", &self.names)
            .field("parts", &self.parts)
            .finish_non_exhaustive()
    }
}

/// How an element name resolves against an allow-list.
#[derive(Debug, Clone, Copy)]
pub enum Resolution {
    /// Creates a widget
    Component(&'static ComponentSpec),
    /// Part of a widget, only valid inside it
    Part(&'static ComponentSpec),
    /// Not allowed
    Unknown,
}

static STANDARD: [ComponentSpec; 4] = [
    ComponentSpec {
        kind: ComponentKind::Image,
        names: &["Image"],
        parts: &[],
        build: widgets::build_image,
    },
    ComponentSpec {
        kind: ComponentKind::VideoEmbed,
        names: &["YouTubeEmbed", "VideoEmbed"],
        parts: &[],
        build: widgets::build_video_embed,
    },
    ComponentSpec {
        kind: ComponentKind::Accordion,
        names: &["Accordion"],
        parts: &["AccordionItem", "AccordionTrigger", "AccordionContent"],
        build: widgets::build_accordion,
    },
    ComponentSpec {
        kind: ComponentKind::CollapsibleSection,
        names: &["Collapsible", "CollapsibleSection"],
        parts: &["CollapsibleTrigger", "CollapsibleContent"],
        build: widgets::build_collapsible,
    },
];

/// A fixed set of components.
#[derive(Debug, Clone, Copy)]
pub struct AllowList {
    specs: &'static [ComponentSpec],
}

impl AllowList {
    /// Build an allow-list from a static table.
    pub const fn new(specs: &'static [ComponentSpec]) -> Self {
        Self { specs }
    }

    /// The site's allow-list: image, video-embed, accordion, collapsible-section.
    pub fn standard() -> Self {
        Self::new(&STANDARD)
    }

    /// Entries of the standard table, for building restricted allow-lists.
    pub fn standard_specs() -> &'static [ComponentSpec] {
        &STANDARD
    }

    /// Resolve an element name (case-sensitive, as in JSX).
    pub fn resolve(&self, name: &str) -> Resolution {
        for spec in self.specs {
            if spec.names.contains(&name) {
                return Resolution::Component(spec);
            }
            if spec.parts.contains(&name) {
                return Resolution::Part(spec);
            }
        }
        Resolution::Unknown
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::standard()
    }
}

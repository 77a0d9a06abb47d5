//! Article components for folio.
//!
//! This crate holds the component allow-list, the document compiler that
//! turns article bodies into render trees, and the execution of those trees.

pub mod compiler;
pub mod registry;
pub mod render;
mod safety;
pub mod state;
pub mod traits;
pub mod widgets;

pub use compiler::{CompileError, CompileStatus, Compiled, Compiler, Lowering};
pub use registry::{AllowList, ComponentKind, ComponentSpec, Resolution};
pub use render::{
    CompiledRender, Node, RenderContext, WidgetTemplates, FALLBACK_MESSAGE, WIDGET_TEMPLATES,
};
pub use state::{Expansion, ExpansionPolicy, SectionStore};
pub use traits::{Execute, RenderError};
pub use widgets::Widget;

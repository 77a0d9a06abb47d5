//! Execution seam for compiled renders.

use crate::render::RenderContext;

/// Errors raised while executing a render tree.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Template error in {template}: {source}")]
    Template {
        template: String,
        #[source]
        source: minijinja::Error,
    },
}

/// Something that can be displayed as HTML.
pub trait Execute {
    /// Produce the HTML for this render.
    fn execute(&self, ctx: &RenderContext<'_>) -> Result<String, RenderError>;
}

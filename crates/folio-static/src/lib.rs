//! Page rendering and static site generation for folio.
//!
//! The [`RenderHost`] displays compiled articles inside the page shell; the
//! [`StaticBuilder`] enumerates every article and writes the whole site.

pub mod assets;
pub mod builder;
pub mod host;
pub mod templates;

pub use assets::AssetPipeline;
pub use builder::{BuildConfig, BuildError, BuildResult, StaticBuilder};
pub use host::{
    BodyOutcome, HostError, PageShell, PageShellConfig, RenderHost, RenderedPage,
    RENDER_ERROR_MESSAGE,
};
pub use templates::TemplateEngine;

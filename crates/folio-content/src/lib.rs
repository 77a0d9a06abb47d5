//! Article content for folio.
//!
//! This crate reads article sources from a [`ContentStore`], compiles them
//! into [`CompiledArticle`]s and caches the results in a [`Library`].

pub mod article;
pub mod cache;
pub mod library;
pub mod store;

pub use article::CompiledArticle;
pub use cache::{ArticleCache, ArticleState, Claim, Ticket};
pub use library::{ArticleError, Library};
pub use store::{ArticleKey, ContentStore, FsStore, StoreError, EXTENSIONS};

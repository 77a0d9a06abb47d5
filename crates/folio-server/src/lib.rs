//! Development server with hot reload for folio sites.
//!
//! Serves article pages straight from the content directory, shows a loading
//! page while an article compiles, and reloads browsers when articles change.

pub mod server;
pub mod watcher;
pub mod websocket;

pub use server::{router, AppState, DevServer, DevServerConfig, ServerError};
pub use watcher::{FileWatcher, WatchEvent};
pub use websocket::{HmrHub, HmrMessage};

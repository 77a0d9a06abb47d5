//! Development server implementation.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use folio_components::{ExpansionPolicy, SectionStore, WidgetTemplates};
use folio_content::{ArticleError, ArticleKey, CompiledArticle, FsStore, Library};
use folio_static::{AssetPipeline, PageShellConfig, RenderHost};

use crate::watcher::{FileWatcher, WatchEvent};
use crate::websocket::{hmr_client_script, HmrHub, HmrMessage};

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory containing articles
    pub content_dir: PathBuf,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,

    /// Page shell settings
    pub shell: PageShellConfig,

    /// Stylesheets appended to the main CSS
    pub styles: Vec<PathBuf>,

    /// Directory of widget template overrides
    pub widget_templates: Option<PathBuf>,

    /// Default expansion of collapsible sections
    pub expansion: ExpansionPolicy,

    /// How long a request waits for compilation before the loading page is served
    pub compile_grace: Duration,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("content"),
            port: 7777,
            host: "127.0.0.1".to_string(),
            open: true,
            shell: PageShellConfig::default(),
            styles: vec![],
            widget_templates: None,
            expansion: ExpansionPolicy::default(),
            compile_grace: Duration::from_millis(300),
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid listen address {0}")]
    AddressError(String),

    #[error("Failed to bind to {0}: {1}")]
    BindError(SocketAddr, String),

    #[error("File watch error: {0}")]
    WatchError(String),
}

/// Shared server state.
pub struct AppState {
    library: Arc<Library>,
    host: RenderHost,
    hmr: HmrHub,
    css: String,
    hmr_url: String,
    compile_grace: Duration,
}

impl AppState {
    pub fn new(library: Arc<Library>, host: RenderHost, css: String, hmr_url: String) -> Self {
        Self {
            library,
            host,
            hmr: HmrHub::new(),
            css,
            hmr_url,
            compile_grace: DevServerConfig::default().compile_grace,
        }
    }

    pub fn with_compile_grace(mut self, grace: Duration) -> Self {
        self.compile_grace = grace;
        self
    }

    pub fn hmr(&self) -> &HmrHub {
        &self.hmr
    }
}

/// Build the router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/articles", get(list_handler))
        .route("/api/articles/{category}/{slug}", get(article_json_handler))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/", get(index_handler))
        .route("/article/{category}/{slug}", get(article_handler))
        .route("/assets/main.css", get(css_handler))
        .route("/__hmr", get(ws_handler))
        .route("/__hmr.js", get(hmr_script_handler))
        .merge(api)
        .fallback(not_found_handler)
        .with_state(state)
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
}

impl DevServer {
    /// Create a new development server.
    pub fn new(config: DevServerConfig) -> Self {
        Self { config }
    }

    /// Start the development server.
    pub async fn start(self) -> Result<(), ServerError> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        let addr: SocketAddr = address
            .parse()
            .map_err(|_| ServerError::AddressError(address.clone()))?;

        // Watch events name absolute paths
        let content_dir = std::fs::canonicalize(&self.config.content_dir)
            .unwrap_or_else(|_| self.config.content_dir.clone());
        let store = FsStore::new(&content_dir);
        let library = Arc::new(Library::new(store.clone()));

        let widgets = match &self.config.widget_templates {
            Some(dir) => WidgetTemplates::with_overrides(dir),
            None => WidgetTemplates::new(),
        };
        let host = RenderHost::new(PageShellConfig {
            hot_reload: true,
            ..self.config.shell.clone()
        })
        .with_widgets(widgets)
        .with_policy(self.config.expansion.clone());

        let state = Arc::new(
            AppState::new(
                Arc::clone(&library),
                host,
                AssetPipeline::bundle_css(&self.config.styles),
                format!("ws://{}/__hmr", addr),
            )
            .with_compile_grace(self.config.compile_grace),
        );

        // Warm the cache without holding up startup
        let warm = Arc::clone(&library);
        tokio::task::spawn_blocking(move || warm.precompile_all());

        let (watcher, mut rx) = FileWatcher::new(&[content_dir])
            .map_err(|e| ServerError::WatchError(e.to_string()))?;

        let state_clone = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handle_watch_event(&state_clone, &store, event);
            }
            // Keep watcher alive
            drop(watcher);
        });

        let app = router(state);

        tracing::info!("Starting dev server at http://{}", addr);

        if self.config.open {
            let url = format!("http://{}", addr);
            if let Err(e) = open::that(&url) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        Ok(())
    }
}

/// Handle file watch events.
fn handle_watch_event(state: &AppState, store: &FsStore, event: WatchEvent) {
    let key = event
        .is_article()
        .then(|| store.key_for_path(event.path()))
        .flatten();
    let Some(key) = key else {
        tracing::debug!("Change outside articles: {}", event.path().display());
        state.hmr.reload_all();
        return;
    };

    match event {
        WatchEvent::Removed(_) => tracing::info!("Article removed: {}", key),
        WatchEvent::Changed(_) => tracing::info!("Article changed: {}", key),
    }

    state.library.invalidate(&key);
    state.hmr.article_updated(&key);
}

/// Per-request section state from `?open=a,b&closed=c`.
fn sections_from_query(document: &str, query: &HashMap<String, String>) -> SectionStore {
    let mut sections = SectionStore::new();
    for (param, open) in [("open", true), ("closed", false)] {
        let ids = query.get(param).map(String::as_str).unwrap_or("");
        for id in ids.split(',').map(str::trim).filter(|id| !id.is_empty()) {
            sections.set(document, id, open);
        }
    }
    sections
}

/// Handler for the index page.
async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let library = Arc::clone(&state.library);
    let articles = tokio::task::spawn_blocking(move || {
        library
            .enumerate_all_articles()
            .iter()
            .filter_map(|key| library.get(key).ok())
            .collect::<Vec<_>>()
    })
    .await
    .unwrap_or_else(|e| {
        tracing::error!("Failed to load articles for the index: {}", e);
        Vec::new()
    });

    page(StatusCode::OK, state.host.render_index(&articles))
}

/// Handler for article pages.
///
/// Compilation runs off the async runtime. If it takes longer than the grace
/// period the loading page is served and compilation finishes in the
/// background.
async fn article_handler(
    State(state): State<Arc<AppState>>,
    Path((category, slug)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let key = match ArticleKey::new(&category, &slug) {
        Ok(key) => key,
        Err(_) => return not_found_page(&state, &category, &slug),
    };

    let library = Arc::clone(&state.library);
    let task_key = key.clone();
    let task = tokio::task::spawn_blocking(move || library.get(&task_key));

    match tokio::time::timeout(state.compile_grace, task).await {
        Ok(Ok(Ok(article))) => {
            let sections = sections_from_query(&key.to_string(), &query);
            match state.host.render_article(&article, &sections) {
                Ok(rendered) => Html(rendered.html).into_response(),
                Err(e) => internal_error(e.to_string()),
            }
        }
        Ok(Ok(Err(e))) if e.is_not_found() => not_found_page(&state, &category, &slug),
        Ok(Ok(Err(e))) => internal_error(e.to_string()),
        Ok(Err(e)) => internal_error(e.to_string()),
        Err(_) => {
            tracing::debug!("Serving loading page for {}", key);
            page(StatusCode::OK, state.host.render_loading(&key))
        }
    }
}

/// Handler for the article list.
async fn list_handler(State(state): State<Arc<AppState>>) -> Json<Vec<ArticleKey>> {
    let library = Arc::clone(&state.library);
    let keys = tokio::task::spawn_blocking(move || library.enumerate_all_articles())
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to enumerate articles: {}", e);
            Vec::new()
        });
    Json(keys)
}

/// Handler for one compiled article as JSON.
async fn article_json_handler(
    State(state): State<Arc<AppState>>,
    Path((category, slug)): Path<(String, String)>,
) -> Response {
    let library = Arc::clone(&state.library);
    let result: Result<Arc<CompiledArticle>, ArticleError> =
        match tokio::task::spawn_blocking(move || library.get_compiled_article(&category, &slug))
            .await
        {
            Ok(result) => result,
            Err(e) => return internal_error(e.to_string()),
        };

    match result {
        Ok(article) => Json(article.as_ref().clone()).into_response(),
        Err(e) => {
            let status = if e.is_not_found() {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
        }
    }
}

async fn css_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], state.css.clone())
}

async fn not_found_handler(State(state): State<Arc<AppState>>, uri: axum::http::Uri) -> Response {
    page(StatusCode::NOT_FOUND, state.host.render_not_found(uri.path()))
}

/// Handler for the HMR WebSocket endpoint.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let mut rx = state.hmr.subscribe();

    if !send_message(&mut socket, &HmrMessage::Connected).await {
        return;
    }

    // Forward HMR messages to the client
    while let Ok(msg) = rx.recv().await {
        if !send_message(&mut socket, &msg).await {
            break;
        }
    }
}

async fn send_message(socket: &mut WebSocket, msg: &HmrMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::warn!("Failed to encode HMR message: {}", e);
            true
        }
    }
}

/// Handler for the HMR client script.
async fn hmr_script_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let script = hmr_client_script(&state.hmr_url);
    ([(header::CONTENT_TYPE, "application/javascript")], script)
}

fn page(status: StatusCode, html: Result<String, folio_static::HostError>) -> Response {
    match html {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

fn not_found_page(state: &AppState, category: &str, slug: &str) -> Response {
    let path = format!("/article/{}/{}", category, slug);
    page(StatusCode::NOT_FOUND, state.host.render_not_found(&path))
}

fn internal_error(message: String) -> Response {
    tracing::error!("Request failed: {}", message);
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}

//! Hot reload messages pushed to open browser tabs.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use folio_content::ArticleKey;

/// Messages sent over the `/__hmr` socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HmrMessage {
    /// Sent once when a client connects
    Connected,

    /// Something other than an article changed; every page reloads
    Reload,

    /// One article changed; only pages showing it (and the index) reload
    ArticleUpdated { path: String },
}

/// Fan-out of hot reload messages to every connected socket.
#[derive(Debug, Clone)]
pub struct HmrHub {
    sender: broadcast::Sender<HmrMessage>,
}

impl HmrHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Tell pages showing `key` to reload.
    pub fn article_updated(&self, key: &ArticleKey) {
        self.send(HmrMessage::ArticleUpdated { path: key.url() });
    }

    /// Tell every page to reload.
    pub fn reload_all(&self) {
        self.send(HmrMessage::Reload);
    }

    pub fn send(&self, msg: HmrMessage) {
        // Nobody listening is not an error
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HmrMessage> {
        self.sender.subscribe()
    }
}

impl Default for HmrHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Browser script that listens on `ws_url` and reloads when needed.
pub fn hmr_client_script(ws_url: &str) -> String {
    format!(
        r#"(function () {{
  var here = location.pathname.replace(/\/+$/, '') || '/';
  var retries = 0;

  function connect() {{
    var socket = new WebSocket('{ws_url}');
    socket.onopen = function () {{ retries = 0; }};
    socket.onmessage = function (event) {{
      var msg = JSON.parse(event.data);
      if (msg.type === 'reload') {{
        location.reload();
      }} else if (msg.type === 'article_updated' && (msg.path === here || here === '/')) {{
        location.reload();
      }}
    }};
    socket.onclose = function () {{
      if (retries++ < 10) setTimeout(connect, 500 * retries);
    }};
  }}

  connect();
}})();
"#
    )
}

//! Development server command.

use anyhow::Result;
use folio_server::{DevServer, DevServerConfig};

use crate::config::Config;

/// Run the dev server.
pub async fn run(config: &Config, port: u16, open: bool) -> Result<()> {
    tracing::info!("Starting development server on port {}", port);

    let server_config = DevServerConfig {
        content_dir: config.content.dir.clone(),
        port,
        open,
        shell: config.shell(),
        styles: config.build.styles.clone(),
        widget_templates: config.render.widget_templates.clone(),
        expansion: config.expansion_policy(),
        ..Default::default()
    };

    DevServer::new(server_config).start().await?;

    Ok(())
}

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::http::connection::Connection;
use crate::proxy::upstream::ProxyHandler;

pub async fn run(cfg: &Config) -> anyhow::Result<()> {
    let handler = Arc::new(ProxyHandler::from_config(cfg)?);
    let listener = TcpListener::bind(&cfg.server.listen_addr).await?;
    info!(
        internal_base = %handler.rule().internal_base(),
        "Listening on {}",
        cfg.server.listen_addr
    );

    serve(listener, handler).await
}

/// Accepts connections forever, one task per client.
pub async fn serve(listener: TcpListener, handler: Arc<ProxyHandler>) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                // e.g. out of file descriptors; keep serving existing clients
                tracing::warn!("Accept failed: {}", e);
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                continue;
            }
        };
        tracing::debug!("Accepted connection from {}", peer);

        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, handler);
            if let Err(e) = conn.run().await {
                tracing::warn!("Connection error from {}: {}", peer, e);
            }
        });
    }
}

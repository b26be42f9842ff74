use std::sync::Arc;

use {
    axum::{
        Router,
        http::header::AUTHORIZATION,
        routing::{get, post},
    },
    tokio::net::TcpListener,
    tower_http::{
        cors::{Any, CorsLayer},
        sensitive_headers::SetSensitiveRequestHeadersLayer,
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use custodian_vault::Vault;

use crate::routes;

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub vault: Arc<Vault>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the HTTP router (shared between production startup and tests).
pub fn build_app(vault: Arc<Vault>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/encrypt", post(routes::encrypt))
        .route("/decrypt-dek", post(routes::decrypt_dek))
        .layer(TraceLayer::new_for_http())
        .layer(SetSensitiveRequestHeadersLayer::new([AUTHORIZATION]))
        .layer(cors)
        .with_state(AppState { vault })
}

/// Serve the vault API until ctrl-c.
pub async fn serve(vault: Arc<Vault>, bind: &str, port: u16) -> anyhow::Result<()> {
    let listener = bind_listener(bind, port).await?;
    info!(addr = %listener.local_addr()?, "vault listening");

    axum::serve(listener, build_app(vault))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("vault stopped");
    Ok(())
}

/// Bind a host name or IP literal (`127.0.0.1`, `::1`, `localhost`).
async fn bind_listener(bind: &str, port: u16) -> anyhow::Result<TcpListener> {
    TcpListener::bind((bind, port))
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {bind} port {port}: {e}"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_ipv4_literal_and_host_name() {
        for host in ["127.0.0.1", "localhost"] {
            let listener = bind_listener(host, 0).await.unwrap();
            assert!(listener.local_addr().unwrap().ip().is_loopback());
        }
    }

    #[tokio::test]
    async fn binds_ipv6_loopback_without_brackets() {
        if std::net::TcpListener::bind("[::1]:0").is_err() {
            return;
        }
        let listener = bind_listener("::1", 0).await.unwrap();
        assert!(listener.local_addr().unwrap().is_ipv6());
    }
}

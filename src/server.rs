//! HTTP endpoints for health checks and relay info.

use anyhow::Result;
use axum::{extract::State, http::header, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::{future::Future, net::SocketAddr, sync::Arc};
use tracing::{debug, info};

/// NIPs this relay speaks: basic protocol, relay info, and AUTH.
const SUPPORTED_NIPS: [u32; 3] = [1, 11, 42];

#[derive(Clone)]
struct HttpState {
    name: String,
}

/// Response body for the `/healthz` endpoint.
#[derive(Serialize, Deserialize)]
struct Health {
    /// Always "ok" when the server is running.
    status: String,
}

/// Start an HTTP server exposing `/healthz` and the relay info document.
pub async fn serve_http(
    addr: SocketAddr,
    name: String,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http listening");
    let app = router(Arc::new(HttpState { name }));
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

fn router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/", get(relay_info))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Health check endpoint.
async fn healthz() -> Json<Health> {
    debug!("GET /healthz");
    Json(Health {
        status: "ok".to_string(),
    })
}

/// NIP-11 relay information document.
#[derive(Serialize, Deserialize)]
struct RelayInfo {
    /// Human-readable relay name.
    name: String,
    /// Software identifier (here it is always "commons-relay").
    software: String,
    /// Semantic version string such as "0.1.0".
    version: String,
    supported_nips: Vec<u32>,
}

async fn relay_info(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    debug!("GET /");
    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(RelayInfo {
            name: state.name.clone(),
            software: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
            supported_nips: SUPPORTED_NIPS.to_vec(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::ACCESS_CONTROL_ALLOW_ORIGIN;
    use tokio::task;

    async fn spawn(name: &str) -> (SocketAddr, task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(Arc::new(HttpState { name: name.into() }));
        let server = axum::serve(listener, app.into_make_service());
        let handle = task::spawn(async move {
            server.await.unwrap();
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (addr, handle) = spawn("r").await;
        let url = format!("http://{}/healthz", addr);
        let body: Health = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(body.status, "ok");
        handle.abort();
    }

    #[tokio::test]
    async fn relay_info_endpoint() {
        let (addr, handle) = spawn("garden").await;
        let url = format!("http://{}/", addr);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(
            resp.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
        let info: RelayInfo = resp.json().await.unwrap();
        assert_eq!(info.name, "garden");
        assert_eq!(info.software, "commons-relay");
        assert!(info.supported_nips.contains(&42));
        handle.abort();
    }

    #[tokio::test]
    async fn serve_http_serves_health() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let shutdown = tokio::time::sleep(std::time::Duration::from_millis(300));
        let handle = task::spawn(serve_http(addr, "r".into(), shutdown));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let resp = reqwest::get(format!("http://{}/healthz", addr)).await.unwrap();
        assert!(resp.status().is_success());
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn serve_http_bind_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(serve_http(addr, "r".into(), std::future::pending())
            .await
            .is_err());
    }
}

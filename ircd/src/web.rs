//! HTTP side door: a connection-info page for users, a liveness probe,
//! and the Prometheus metrics endpoint. Read-only; anything that acts
//! on the server speaks IRC.

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::server::Server;

#[derive(Clone)]
struct WebState {
    server: Arc<Server>,
    prometheus: Option<PrometheusHandle>,
}

pub fn router(server: Arc<Server>, prometheus: Option<PrometheusHandle>) -> Router {
    Router::new()
        .route("/", get(info_page))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .with_state(WebState { server, prometheus })
}

pub async fn serve(server: Arc<Server>, addr: &str) -> Result<()> {
    // When several servers share one process (tests), the first recorder
    // install wins and later routers render without one.
    let prometheus = PrometheusBuilder::new().install_recorder().ok();
    let app = router(server, prometheus);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP listener on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn info_page(State(state): State<WebState>) -> Html<String> {
    let server = &state.server;
    let config = &server.config;
    let tls = if config.tls_enabled() {
        format!("<li><b>TLS address: </b>{}</li>", config.tls_listen_addr)
    } else {
        String::new()
    };
    Html(format!(
        "<html>\n<head><title>{network}</title></head>\n<body style=\"font-family: monospace\">\n\
         <h1>Network: {network}</h1>\n\
         <div>Connection information for this IRC network.</div>\n\
         <ul>\n\
         <li><b>Address: </b>{listen}</li>\n{tls}\
         <li><b>Name: </b>{name}</li>\n\
         <li><b>Description: </b>{description}</li>\n\
         <li><b>Clients online: </b>{clients}</li>\n\
         <li><b>Channels: </b>{channels}</li>\n\
         </ul>\n</body>\n</html>\n",
        network = config.network_name,
        listen = config.listen_addr,
        name = server.name(),
        description = config.description,
        clients = server.clients.len(),
        channels = server.channels.len(),
    ))
}

async fn health() -> &'static str {
    "ok"
}

async fn render_metrics(State(state): State<WebState>) -> String {
    state
        .prometheus
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

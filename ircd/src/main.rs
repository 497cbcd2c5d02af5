use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // rustls needs an explicit provider selection.
    let _ = tokio_rustls::rustls::crypto::ring::default_provider().install_default();

    // JSON logs in production (IRCD_LOG_JSON=1), human-readable otherwise.
    let json_logs = std::env::var("IRCD_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("ircd=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = ircd::config::ServerConfig::parse();
    tracing::info!("Starting IRC server on {}", config.listen_addr);
    if config.tls_enabled() {
        tracing::info!("TLS enabled on {}", config.tls_listen_addr);
    }
    if let Some(ref web_addr) = config.web_addr {
        tracing::info!("HTTP enabled on {web_addr}");
    }

    let server = ircd::server::Server::new(config)?;
    server.run().await
}

//! Server state, listeners, and client teardown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls;

use crate::client::{self, Client};
use crate::config::ServerConfig;
use crate::history::WhoWas;
use crate::irc::Message;
use crate::metrics;
use crate::registry::{ChannelRegistry, ClientRegistry};

/// How many idle escalations may queue before timer tasks backpressure.
const IDLE_QUEUE_DEPTH: usize = 64;

/// Retained identity records for WHOWAS.
const WHOWAS_CAPACITY: usize = 1024;

/// Shared state accessible by all connection handlers.
pub struct Server {
    pub config: ServerConfig,
    created: DateTime<Utc>,
    motd: Option<String>,
    pub clients: ClientRegistry,
    pub channels: ChannelRegistry,
    pub whowas: WhoWas,
    next_client_id: AtomicU64,
    idle_tx: mpsc::Sender<Arc<Client>>,
    idle_rx: Mutex<Option<mpsc::Receiver<Arc<Client>>>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Result<Arc<Server>> {
        let motd = match &config.motd_file {
            Some(path) => Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read MOTD file: {path}"))?,
            ),
            None => config.motd.clone(),
        };
        let (idle_tx, idle_rx) = mpsc::channel(IDLE_QUEUE_DEPTH);
        Ok(Arc::new(Server {
            config,
            created: Utc::now(),
            motd,
            clients: ClientRegistry::new(),
            channels: ChannelRegistry::new(),
            whowas: WhoWas::new(WHOWAS_CAPACITY),
            next_client_id: AtomicU64::new(1),
            idle_tx,
            idle_rx: Mutex::new(Some(idle_rx)),
        }))
    }

    pub fn name(&self) -> &str {
        &self.config.server_name
    }

    pub fn created(&self) -> &DateTime<Utc> {
        &self.created
    }

    pub fn motd_lines(&self) -> Option<Vec<String>> {
        self.motd
            .as_ref()
            .map(|m| m.lines().map(str::to_string).collect())
    }

    pub fn next_client_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Post a client whose idle timer fired. Escalation happens on the
    /// server's idle loop, never on the timer task itself.
    pub(crate) async fn notify_idle(&self, client: Arc<Client>) {
        let _ = self.idle_tx.send(client).await;
    }

    /// Drop the channel once its last member left.
    pub fn drop_channel_if_empty(&self, name: &str) {
        if self.channels.remove_if_empty(name) {
            tracing::debug!(channel = name, "channel emptied");
            metrics::channel_destroyed();
        }
    }

    /// Tear a client down. Idempotent: every path that can kill a
    /// connection funnels here, and the check-and-set on the quit flag
    /// picks the single caller that runs the protocol.
    ///
    /// Order matters: the broadcast recipient set is computed before the
    /// client detaches from its channels, and the QUIT notice carries
    /// the identity the client held at that point.
    pub fn quit(self: &Arc<Self>, client: &Arc<Client>, message: &str) {
        if !client.mark_quit() {
            return;
        }
        tracing::info!(client = client.id(), nick = ?client.nick(), message, "client quit");

        client.stop_timers();

        let prefix = client.userhost();
        // The quitting client itself gets an ERROR, not the QUIT notice.
        client.send_raw(format!("ERROR :{message}\r\n"));

        self.whowas.append(client);
        let friends = client.friends(&self.channels);

        self.destroy(client);

        let notice = Message::with_text(&prefix, "QUIT", vec![message]);
        let line = format!("{notice}\r\n");
        for friend in &friends {
            if friend.id() != client.id() {
                friend.send_line(line.clone());
            }
        }

        metrics::client_disconnected(client.is_secure());
    }

    /// Release every shared resource the client holds: nickname entry,
    /// channel memberships, reply queue, and the blocked reader.
    fn destroy(&self, client: &Arc<Client>) {
        self.clients.remove_client(client);
        for name in client.channel_names() {
            if let Some(channel) = self.channels.get(&name) {
                channel.quit(client);
                self.drop_channel_if_empty(&name);
            }
        }
        client.close_replies();
        client.quit_notify.notify_one();
    }

    /// Background work every listener variant needs: the keepalive
    /// escalation loop and, when configured, the HTTP listener.
    fn spawn_background(self: &Arc<Self>) {
        let mut idle_rx = self
            .idle_rx
            .lock()
            .unwrap()
            .take()
            .expect("idle loop started twice");
        let server = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(idle_client) = idle_rx.recv().await {
                client::idle(&idle_client, &server);
            }
        });

        if let Some(addr) = self.config.web_addr.clone() {
            let server = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = crate::web::serve(server, &addr).await {
                    tracing::error!("HTTP server error: {e}");
                }
            });
        }
    }

    /// Run the server, blocking forever.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let tls_acceptor = self.build_tls_acceptor()?;
        self.spawn_background();

        let plain_listener = TcpListener::bind(&self.config.listen_addr).await?;
        tracing::info!("Plain listener on {}", self.config.listen_addr);

        if let Some(acceptor) = tls_acceptor {
            let tls_listener = TcpListener::bind(&self.config.tls_listen_addr).await?;
            tracing::info!("TLS listener on {}", self.config.tls_listen_addr);
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                accept_tls(tls_listener, acceptor, server).await;
            });
        }

        accept_plain(plain_listener, self).await
    }

    /// Start on the configured address and return the bound address plus
    /// the accept task handle (for testing).
    pub async fn start(self: Arc<Self>) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!("Listening on {addr}");

        self.spawn_background();
        let handle = tokio::spawn(accept_plain(listener, self));
        Ok((addr, handle))
    }

    /// Start with both plain and TLS listeners (for testing). Returns
    /// (plain_addr, tls_addr, handle).
    pub async fn start_tls(
        self: Arc<Self>,
    ) -> Result<(SocketAddr, SocketAddr, JoinHandle<Result<()>>)> {
        let acceptor = self
            .build_tls_acceptor()?
            .context("TLS must be configured for start_tls()")?;

        let plain_listener = TcpListener::bind(&self.config.listen_addr).await?;
        let plain_addr = plain_listener.local_addr()?;
        let tls_listener = TcpListener::bind(&self.config.tls_listen_addr).await?;
        let tls_addr = tls_listener.local_addr()?;
        tracing::info!("Plain on {plain_addr}, TLS on {tls_addr}");

        self.spawn_background();
        let tls_server = Arc::clone(&self);
        tokio::spawn(async move {
            accept_tls(tls_listener, acceptor, tls_server).await;
        });
        let handle = tokio::spawn(accept_plain(plain_listener, self));
        Ok((plain_addr, tls_addr, handle))
    }

    fn build_tls_acceptor(&self) -> Result<Option<TlsAcceptor>> {
        if !self.config.tls_enabled() {
            return Ok(None);
        }

        let cert_path = self.config.tls_cert.as_deref().unwrap_or_default();
        let key_path = self.config.tls_key.as_deref().unwrap_or_default();

        let cert_pem = std::fs::read(cert_path)
            .with_context(|| format!("failed to read TLS cert: {cert_path}"))?;
        let key_pem = std::fs::read(key_path)
            .with_context(|| format!("failed to read TLS key: {key_path}"))?;

        let certs: Vec<_> = rustls_pemfile::certs(&mut &cert_pem[..])
            .collect::<Result<Vec<_>, _>>()
            .context("failed to parse TLS certificates")?;
        let key = rustls_pemfile::private_key(&mut &key_pem[..])
            .context("failed to parse TLS private key")?
            .context("no private key found in PEM file")?;

        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .context("invalid TLS configuration")?;

        Ok(Some(TlsAcceptor::from(Arc::new(config))))
    }
}

async fn accept_plain(listener: TcpListener, server: Arc<Server>) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            if let Err(e) = client::handle(stream, false, addr.ip().to_string(), server).await {
                tracing::error!("connection error: {e}");
            }
        });
    }
}

async fn accept_tls(listener: TcpListener, acceptor: TlsAcceptor, server: Arc<Server>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let server = Arc::clone(&server);
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            let host = addr.ip().to_string();
                            if let Err(e) = client::handle(tls_stream, true, host, server).await {
                                tracing::error!("TLS connection error: {e}");
                            }
                        }
                        Err(e) => tracing::warn!("TLS handshake failed: {e}"),
                    }
                });
            }
            Err(e) => tracing::error!("TLS accept error: {e}"),
        }
    }
}

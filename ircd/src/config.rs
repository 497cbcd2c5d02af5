//! Server configuration, parsed from the command line and environment.

use std::time::Duration;

use clap::Parser;

use crate::auth::StoredPassword;

#[derive(Parser, Debug, Clone)]
#[command(name = "ircd", about = "Multi-user IRC server")]
pub struct ServerConfig {
    /// Address for the plaintext listener.
    #[arg(long, env = "IRCD_LISTEN", default_value = "0.0.0.0:6667")]
    pub listen_addr: String,

    /// Address for the TLS listener (requires --tls-cert and --tls-key).
    #[arg(long, env = "IRCD_TLS_LISTEN", default_value = "0.0.0.0:6697")]
    pub tls_listen_addr: String,

    /// Path to the TLS certificate chain (PEM).
    #[arg(long, env = "IRCD_TLS_CERT")]
    pub tls_cert: Option<String>,

    /// Path to the TLS private key (PEM).
    #[arg(long, env = "IRCD_TLS_KEY")]
    pub tls_key: Option<String>,

    /// Server name used as the prefix of every reply.
    #[arg(long, env = "IRCD_NAME", default_value = "irc.example.net")]
    pub server_name: String,

    /// Network name shown on the info page.
    #[arg(long, env = "IRCD_NETWORK", default_value = "ExampleNet")]
    pub network_name: String,

    /// Free-form server description.
    #[arg(long, default_value = "an ircd")]
    pub description: String,

    /// Message of the day, inline.
    #[arg(long)]
    pub motd: Option<String>,

    /// Read the message of the day from a file at startup.
    #[arg(long)]
    pub motd_file: Option<String>,

    /// Connection password as a hex SHA-256 digest. When set, clients
    /// must send a matching PASS before registering.
    #[arg(long, env = "IRCD_PASSWORD")]
    pub password: Option<String>,

    /// Operator credential as NAME:HEX_SHA256. Repeatable.
    #[arg(long = "oper", value_name = "NAME:DIGEST")]
    pub opers: Vec<String>,

    /// SASL account credential as NAME:HEX_SHA256. Repeatable.
    #[arg(long = "account", value_name = "NAME:DIGEST")]
    pub accounts: Vec<String>,

    /// Address for the HTTP info page and /metrics. Disabled when unset.
    #[arg(long, env = "IRCD_WEB")]
    pub web_addr: Option<String>,

    /// Milliseconds of silence before a keepalive probe is sent.
    #[arg(long, default_value_t = 60_000)]
    pub idle_timeout_ms: u64,

    /// Milliseconds after a probe before the connection is dropped.
    #[arg(long, default_value_t = 60_000)]
    pub quit_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            tls_listen_addr: "127.0.0.1:0".to_string(),
            tls_cert: None,
            tls_key: None,
            server_name: "irc.example.net".to_string(),
            network_name: "ExampleNet".to_string(),
            description: "an ircd".to_string(),
            motd: None,
            motd_file: None,
            password: None,
            opers: Vec::new(),
            accounts: Vec::new(),
            web_addr: None,
            idle_timeout_ms: 60_000,
            quit_timeout_ms: 60_000,
        }
    }
}

fn lookup(entries: &[String], name: &str) -> Option<StoredPassword> {
    entries.iter().find_map(|entry| {
        let (entry_name, digest) = entry.split_once(':')?;
        if entry_name.eq_ignore_ascii_case(name) {
            Some(StoredPassword::new(digest))
        } else {
            None
        }
    })
}

impl ServerConfig {
    pub fn tls_enabled(&self) -> bool {
        self.tls_cert.is_some() && self.tls_key.is_some()
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn quit_timeout(&self) -> Duration {
        Duration::from_millis(self.quit_timeout_ms)
    }

    /// Connection password digest, if the server is password-protected.
    pub fn server_password(&self) -> Option<StoredPassword> {
        self.password.as_deref().map(StoredPassword::new)
    }

    pub fn oper_password(&self, name: &str) -> Option<StoredPassword> {
        lookup(&self.opers, name)
    }

    pub fn account_password(&self, name: &str) -> Option<StoredPassword> {
        lookup(&self.accounts, name)
    }
}

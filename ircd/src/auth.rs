//! Password verification and the SASL PLAIN sub-state machine.
//!
//! Stored credentials are hex SHA-256 digests. Comparisons run on the
//! blocking pool and are awaited by the issuing connection's reader, so
//! a slow check serializes that one client's command stream without
//! stalling any other connection or the runtime worker threads.

use base64::Engine;
use sha2::{Digest, Sha256};

/// A configured credential: the lowercase hex SHA-256 of the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPassword(String);

impl StoredPassword {
    pub fn new(hex_digest: &str) -> StoredPassword {
        StoredPassword(hex_digest.to_ascii_lowercase())
    }

    /// Digest a plaintext password into the stored form.
    pub fn digest(plain: &str) -> String {
        let hash = Sha256::digest(plain.as_bytes());
        let mut out = String::with_capacity(hash.len() * 2);
        for byte in hash {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    pub fn matches(&self, supplied: &str) -> bool {
        StoredPassword::digest(supplied) == self.0
    }
}

/// Compare a supplied password against a stored digest off the async
/// runtime. Failure of the blocking task counts as a mismatch.
pub async fn verify(stored: StoredPassword, supplied: String) -> bool {
    tokio::task::spawn_blocking(move || stored.matches(&supplied))
        .await
        .unwrap_or(false)
}

/// Where a client stands in the AUTHENTICATE exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaslPhase {
    /// No AUTHENTICATE seen.
    #[default]
    None,
    /// Mechanism accepted, waiting for the base64 response.
    Plain,
    /// Exchange finished (success or failure); further attempts rejected.
    Done,
}

#[derive(Debug, Default)]
pub struct SaslState {
    pub phase: SaslPhase,
    /// Account name on successful authentication.
    pub account: Option<String>,
}

/// Decoded SASL PLAIN response: `authzid \0 authcid \0 password`.
pub struct PlainResponse {
    pub authcid: String,
    pub password: String,
}

/// Decode the client's base64 PLAIN payload. `None` for anything that
/// does not contain exactly three NUL-separated fields.
pub fn decode_plain(payload: &str) -> Option<PlainResponse> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .ok()?;
    let text = String::from_utf8(raw).ok()?;
    let mut parts = text.split('\0');
    let _authzid = parts.next()?;
    let authcid = parts.next()?.to_string();
    let password = parts.next()?.to_string();
    if parts.next().is_some() || authcid.is_empty() {
        return None;
    }
    Some(PlainResponse { authcid, password })
}

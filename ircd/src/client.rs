//! Per-connection client actor.
//!
//! Each accepted stream gets one [`Client`] and two tasks: a reader that
//! parses lines and feeds the dispatch gate, and a writer that drains
//! the outbound reply queue. The two never block each other, so a slow
//! consumer cannot stall command handling and broadcast fan-out to many
//! targets cannot deadlock on any single connection.
//!
//! Lifecycle: Unregistered → Registered → Quit. Entry into Quit is a
//! check-and-set on `has_quit`; teardown runs exactly once no matter how
//! many paths (read failure, QUIT command, timer expiry, protocol
//! violation) race to trigger it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Notify;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;

use crate::auth::SaslState;
use crate::command::{Command, ParseError};
use crate::dispatch;
use crate::irc::{self, Message};
use crate::metrics;
use crate::modes::{UserMode, UserModeSet};
use crate::registry::ChannelRegistry;
use crate::server::Server;

/// Reject absurd lines before they buffer unbounded input.
const MAX_LINE_LEN: usize = 8192;

/// Capability negotiation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapPhase {
    #[default]
    None,
    Negotiating,
    Ended,
}

#[derive(Debug, Default)]
struct Identity {
    nick: Option<String>,
    username: Option<String>,
    realname: String,
    away: Option<String>,
}

#[derive(Default)]
struct Timers {
    idle: Option<JoinHandle<()>>,
    quit: Option<JoinHandle<()>>,
}

pub struct Client {
    id: u64,
    secure: bool,
    hostname: String,
    /// Cloaked hostname: stable pseudonym derived from the real one.
    hostmask: String,
    ctime: DateTime<Utc>,
    atime: Mutex<Instant>,
    ping_time: Mutex<Option<Instant>>,

    identity: Mutex<Identity>,
    pub modes: UserModeSet,
    caps: Mutex<HashSet<String>>,
    cap_phase: Mutex<CapPhase>,
    sasl: Mutex<SaslState>,

    /// Names of joined channels. The channel's member table is the
    /// source of truth; this cache is kept in lockstep by
    /// [`crate::channel::Channel`].
    channels: Mutex<HashSet<String>>,

    authorized: AtomicBool,
    registered: AtomicBool,
    has_quit: AtomicBool,

    replies: Mutex<Option<UnboundedSender<String>>>,
    pub(crate) quit_notify: Notify,
    timers: Mutex<Timers>,
}

impl Client {
    /// Create a client for a connection. The returned receiver is the
    /// writer task's end of the outbound reply queue.
    pub fn new(id: u64, secure: bool, hostname: &str) -> (Arc<Client>, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let client = Arc::new(Client {
            id,
            secure,
            hostname: hostname.to_string(),
            hostmask: cloak(hostname),
            ctime: Utc::now(),
            atime: Mutex::new(Instant::now()),
            ping_time: Mutex::new(None),
            identity: Mutex::new(Identity::default()),
            modes: UserModeSet::new(),
            caps: Mutex::new(HashSet::new()),
            cap_phase: Mutex::new(CapPhase::None),
            sasl: Mutex::new(SaslState::default()),
            channels: Mutex::new(HashSet::new()),
            authorized: AtomicBool::new(false),
            registered: AtomicBool::new(false),
            has_quit: AtomicBool::new(false),
            replies: Mutex::new(Some(tx)),
            quit_notify: Notify::new(),
            timers: Mutex::new(Timers::default()),
        });
        if secure {
            client.modes.set(UserMode::SecureConn);
        }
        (client, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn hostmask(&self) -> &str {
        &self.hostmask
    }

    pub fn nick(&self) -> Option<String> {
        self.identity.lock().unwrap().nick.clone()
    }

    /// Nick for reply targets: `*` until one is set.
    pub fn display_nick(&self) -> String {
        self.nick().unwrap_or_else(|| "*".to_string())
    }

    pub fn set_nick(&self, nick: &str) {
        self.identity.lock().unwrap().nick = Some(nick.to_string());
    }

    pub fn username(&self) -> Option<String> {
        self.identity.lock().unwrap().username.clone()
    }

    pub fn set_user(&self, username: &str, realname: &str) {
        let mut identity = self.identity.lock().unwrap();
        identity.username = Some(username.to_string());
        identity.realname = realname.to_string();
    }

    pub fn realname(&self) -> String {
        self.identity.lock().unwrap().realname.clone()
    }

    pub fn away(&self) -> Option<String> {
        self.identity.lock().unwrap().away.clone()
    }

    pub fn set_away(&self, message: Option<String>) {
        self.identity.lock().unwrap().away = message.clone();
        if message.is_some() {
            self.modes.set(UserMode::Away);
        } else {
            self.modes.unset(UserMode::Away);
        }
    }

    /// `nick!user@host` source prefix. Uses the cloaked hostname once
    /// hostmask cloaking is enabled.
    pub fn userhost(&self) -> String {
        let identity = self.identity.lock().unwrap();
        let nick = identity.nick.clone().unwrap_or_else(|| "*".to_string());
        let user = identity.username.clone().unwrap_or_else(|| "*".to_string());
        drop(identity);
        let host = if self.modes.has(UserMode::HostMask) {
            &self.hostmask
        } else {
            &self.hostname
        };
        format!("{nick}!{user}@{host}")
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Complete the registration handshake: hostmask cloaking on, idle
    /// timer restarted by the caller.
    pub fn register(&self) {
        if self.registered.swap(true, Ordering::SeqCst) {
            return;
        }
        self.modes.set(UserMode::HostMask);
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    pub fn set_authorized(&self, value: bool) {
        self.authorized.store(value, Ordering::SeqCst);
    }

    pub fn has_quit(&self) -> bool {
        self.has_quit.load(Ordering::SeqCst)
    }

    /// Check-and-set the quit flag. True for the single caller that
    /// owns teardown.
    pub fn mark_quit(&self) -> bool {
        !self.has_quit.swap(true, Ordering::SeqCst)
    }

    pub fn active(&self) {
        *self.atime.lock().unwrap() = Instant::now();
    }

    pub fn idle_seconds(&self) -> u64 {
        self.atime.lock().unwrap().elapsed().as_secs()
    }

    pub fn signon_timestamp(&self) -> i64 {
        self.ctime.timestamp()
    }

    pub fn set_ping_time(&self) {
        *self.ping_time.lock().unwrap() = Some(Instant::now());
    }

    pub fn cap_phase(&self) -> CapPhase {
        *self.cap_phase.lock().unwrap()
    }

    pub fn set_cap_phase(&self, phase: CapPhase) {
        *self.cap_phase.lock().unwrap() = phase;
    }

    pub fn add_cap(&self, cap: &str) {
        self.caps.lock().unwrap().insert(cap.to_string());
    }

    pub fn has_cap(&self, cap: &str) -> bool {
        self.caps.lock().unwrap().contains(cap)
    }

    pub fn sasl(&self) -> std::sync::MutexGuard<'_, SaslState> {
        self.sasl.lock().unwrap()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.lock().unwrap().iter().cloned().collect()
    }

    pub(crate) fn cache_join(&self, name: &str) {
        self.channels.lock().unwrap().insert(name.to_string());
    }

    pub(crate) fn cache_part(&self, name: &str) {
        self.channels.lock().unwrap().remove(name);
    }

    /// May this client address `target` directly? Secure-only parties
    /// require an encrypted pair; operators bypass the restriction.
    pub fn can_speak(&self, target: &Client) -> bool {
        let requires_secure =
            self.modes.has(UserMode::SecureOnly) || target.modes.has(UserMode::SecureOnly);
        let is_secure =
            self.modes.has(UserMode::SecureConn) && target.modes.has(UserMode::SecureConn);
        let is_operator = self.modes.has(UserMode::Operator);
        !requires_secure || is_operator || is_secure
    }

    /// Everyone who receives this client's broadcasts: itself plus each
    /// distinct co-member of each joined channel.
    pub fn friends(self: &Arc<Self>, channels: &ChannelRegistry) -> Vec<Arc<Client>> {
        let mut friends: HashMap<u64, Arc<Client>> = HashMap::new();
        friends.insert(self.id, Arc::clone(self));
        for name in self.channel_names() {
            if let Some(channel) = channels.get(&name) {
                for member in channel.members() {
                    friends.insert(member.id(), member);
                }
            }
        }
        friends.into_values().collect()
    }

    /// Queue a formatted reply. Dropped silently once the client quit.
    pub fn reply(&self, msg: &Message) {
        self.send_line(format!("{msg}\r\n"));
    }

    pub fn send_line(&self, line: String) {
        if self.has_quit() {
            return;
        }
        self.send_raw(line);
    }

    /// Queue a line regardless of the quit flag. Used for the final
    /// ERROR the quitting client itself receives.
    pub(crate) fn send_raw(&self, line: String) {
        if let Some(tx) = self.replies.lock().unwrap().as_ref() {
            let _ = tx.send(line);
        }
    }

    /// Close the outbound queue; the writer drains what is left, then
    /// exits and shuts the transport down.
    pub(crate) fn close_replies(&self) {
        self.replies.lock().unwrap().take();
    }

    pub(crate) fn stop_timers(&self) {
        let mut timers = self.timers.lock().unwrap();
        if let Some(handle) = timers.idle.take() {
            handle.abort();
        }
        if let Some(handle) = timers.quit.take() {
            handle.abort();
        }
    }
}

fn cloak(hostname: &str) -> String {
    let digest = Sha256::digest(hostname.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Restart the idle timer and cancel any pending quit timer. Called on
/// every inbound command and at registration; not called once the
/// client quit.
pub fn touch(client: &Arc<Client>, server: &Arc<Server>) {
    if client.has_quit() {
        return;
    }
    let mut timers = client.timers.lock().unwrap();
    if let Some(handle) = timers.quit.take() {
        handle.abort();
    }
    if let Some(handle) = timers.idle.take() {
        handle.abort();
    }
    let c = Arc::clone(client);
    let s = Arc::clone(server);
    let after = server.config.idle_timeout();
    timers.idle = Some(tokio::spawn(async move {
        tokio::time::sleep(after).await;
        s.notify_idle(c).await;
    }));
}

/// Keepalive escalation: probe the silent client and arm the quit
/// timer. Runs on the server's idle loop, not the client's reader.
pub fn idle(client: &Arc<Client>, server: &Arc<Server>) {
    if client.has_quit() {
        return;
    }
    client.set_ping_time();
    client.reply(&Message::from_server(
        server.name(),
        "PING",
        vec![server.name()],
    ));

    let mut timers = client.timers.lock().unwrap();
    if let Some(handle) = timers.quit.take() {
        handle.abort();
    }
    let c = Arc::clone(client);
    let s = Arc::clone(server);
    let after = server.config.quit_timeout();
    timers.quit = Some(tokio::spawn(async move {
        tokio::time::sleep(after).await;
        s.quit(&c, "connection timeout");
    }));
}

/// Drive one connection: spawn the writer, then run the read loop until
/// quit. A failed read synthesizes an internal QUIT; a failed parse
/// produces an advisory reply and the loop continues.
pub async fn handle<S>(stream: S, secure: bool, host: String, server: Arc<Server>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id = server.next_client_id();
    let (client, rx) = Client::new(id, secure, &host);
    metrics::client_connected(secure);
    tracing::info!(client = id, host = %host, secure, "new connection");

    let (read_half, write_half) = tokio::io::split(stream);
    let writer = spawn_writer(rx, write_half);

    touch(&client, &server);

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    loop {
        line.clear();
        let read_result = tokio::select! {
            res = reader.read_line(&mut line) => Some(res),
            _ = client.quit_notify.notified() => None,
        };
        let Some(read_result) = read_result else {
            // Torn down from outside the reader (timer or kick).
            break;
        };

        let mut read_failed = false;
        let command = match read_result {
            Ok(0) | Err(_) => {
                read_failed = true;
                Command::Quit {
                    message: Some("connection closed".to_string()),
                }
            }
            Ok(_) if line.len() > MAX_LINE_LEN => {
                client.reply(&Message::from_server(
                    server.name(),
                    "417",
                    vec![&client.display_nick(), "Input line was too long"],
                ));
                continue;
            }
            Ok(_) => match Command::parse(&line) {
                Ok(command) => command,
                Err(ParseError::Malformed) => {
                    client.reply(&Message::from_server(
                        server.name(),
                        "NOTICE",
                        vec![&client.display_nick(), "failed to parse command"],
                    ));
                    continue;
                }
                Err(ParseError::NeedMoreParams { command }) => {
                    client.reply(&Message::from_server(
                        server.name(),
                        irc::ERR_NEEDMOREPARAMS,
                        vec![&client.display_nick(), &command, "Not enough parameters"],
                    ));
                    continue;
                }
            },
        };

        dispatch::dispatch(&server, &client, command).await;

        if read_failed || client.has_quit() {
            break;
        }
    }

    // Covers the paths where the reader stops without a QUIT having
    // been routed (e.g. notify during teardown elsewhere). No-op when
    // teardown already ran.
    server.quit(&client, "connection closed");
    let _ = writer.await;
    Ok(())
}

/// Writer task: drains the reply queue into the transport. Exits when
/// the queue closes or a write fails, then shuts the stream down.
fn spawn_writer<W>(mut rx: UnboundedReceiver<String>, mut writer: W) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        'drain: while let Some(line) = rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            // Drain queued replies in batches to reduce syscalls.
            let mut batched = 0;
            while let Ok(queued) = rx.try_recv() {
                if writer.write_all(queued.as_bytes()).await.is_err() {
                    break 'drain;
                }
                batched += 1;
                if batched >= 64 {
                    break;
                }
            }
            if writer.flush().await.is_err() {
                break;
            }
        }
        let _ = writer.shutdown().await;
    })
}

//! End-to-end lifecycle tests over real sockets: registration, channel
//! membership, messaging, visibility, and teardown broadcasts.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

use ircd::auth::StoredPassword;
use ircd::config::ServerConfig;
use ircd::server::Server;

/// How long to wait for a line before considering the test failed.
const TIMEOUT: Duration = Duration::from_secs(5);

async fn start_server(config: ServerConfig) -> SocketAddr {
    let server = Server::new(config).unwrap();
    let (addr, _handle) = server.start().await.unwrap();
    addr
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> TestClient {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, write) = stream.into_split();
        TestClient {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
    }

    /// Next line, or None once the server closed the connection.
    async fn recv(&mut self) -> Option<String> {
        let mut line = String::new();
        match timeout(TIMEOUT, self.reader.read_line(&mut line)).await {
            Ok(Ok(0)) => None,
            Ok(Ok(_)) => Some(line.trim_end().to_string()),
            Ok(Err(_)) => None,
            Err(_) => panic!("timed out waiting for a line"),
        }
    }

    async fn wait_for(&mut self, needle: &str) -> String {
        loop {
            match self.recv().await {
                Some(line) if line.contains(needle) => return line,
                Some(_) => continue,
                None => panic!("connection closed while waiting for {needle:?}"),
            }
        }
    }

    /// Collect lines up to and including the first containing `stop`.
    async fn collect_until(&mut self, stop: &str) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            match self.recv().await {
                Some(line) => {
                    let done = line.contains(stop);
                    lines.push(line);
                    if done {
                        return lines;
                    }
                }
                None => panic!("connection closed while collecting until {stop:?}"),
            }
        }
    }

    async fn register(&mut self, nick: &str) {
        self.send(&format!("NICK {nick}")).await;
        self.send(&format!("USER {nick} 0 * :Test {nick}")).await;
        self.wait_for(" 001 ").await;
    }

    async fn expect_closed(&mut self) {
        while self.recv().await.is_some() {}
    }
}

#[tokio::test]
async fn register_and_welcome() {
    let addr = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::connect(addr).await;

    alice.send("NICK alice").await;
    alice.send("USER alice 0 * :Alice Liddell").await;

    let welcome = alice.wait_for(" 001 alice ").await;
    assert!(welcome.contains("Welcome"));
    alice.wait_for(" 004 ").await;
    // No MOTD configured.
    alice.wait_for(" 422 ").await;
}

#[tokio::test]
async fn motd_is_served_on_registration() {
    let config = ServerConfig {
        motd: Some("welcome aboard".to_string()),
        ..ServerConfig::default()
    };
    let addr = start_server(config).await;
    let mut alice = TestClient::connect(addr).await;
    alice.register("alice").await;
    alice.wait_for(" 375 ").await;
    assert!(alice.wait_for(" 372 ").await.contains("welcome aboard"));
    alice.wait_for(" 376 ").await;
}

#[tokio::test]
async fn nick_conflict_replies_433() {
    let addr = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::connect(addr).await;
    alice.register("alice").await;

    let mut intruder = TestClient::connect(addr).await;
    intruder.send("NICK alice").await;
    assert!(intruder.wait_for(" 433 ").await.contains("alice"));

    // The conflict is not fatal; a different nick still works.
    intruder.send("NICK bob").await;
    intruder.send("USER bob 0 * :Bob").await;
    intruder.wait_for(" 001 bob ").await;
}

#[tokio::test]
async fn pre_registration_command_force_quits() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = TestClient::connect(addr).await;

    client.send("JOIN #x").await;
    let error = client.wait_for("ERROR :").await;
    assert!(error.contains("unexpected command"));
    client.expect_closed().await;
}

#[tokio::test]
async fn unknown_command_after_registration_is_advisory() {
    let addr = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::connect(addr).await;
    alice.register("alice").await;

    alice.send("WALLOPS :hi").await;
    alice.wait_for(" 421 alice WALLOPS ").await;

    // Still connected and serviced.
    alice.send("PING t1").await;
    alice.wait_for("PONG").await;
}

#[tokio::test]
async fn server_password_gates_registration() {
    let config = ServerConfig {
        password: Some(StoredPassword::digest("sekret")),
        ..ServerConfig::default()
    };
    let addr = start_server(config).await;

    let mut wrong = TestClient::connect(addr).await;
    wrong.send("PASS nope").await;
    wrong.wait_for(" 464 ").await;
    wrong.expect_closed().await;

    let mut right = TestClient::connect(addr).await;
    right.send("PASS sekret").await;
    right.register("alice").await;
}

#[tokio::test]
async fn join_and_part_are_announced() {
    let addr = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    alice.register("alice").await;
    bob.register("bob").await;

    alice.send("JOIN #tea").await;
    assert!(alice.wait_for(" JOIN #tea").await.starts_with(":alice!"));
    // Founder shows up with ops in the name list.
    assert!(alice.wait_for(" 353 ").await.contains("@alice"));
    alice.wait_for(" 366 ").await;

    bob.send("JOIN #tea").await;
    bob.wait_for(" 366 ").await;
    assert!(alice.wait_for(" JOIN #tea").await.starts_with(":bob!"));

    bob.send("PART #tea :gotta go").await;
    let part = alice.wait_for(" PART #tea ").await;
    assert!(part.starts_with(":bob!"));
    assert!(part.contains("gotta go"));
}

#[tokio::test]
async fn privmsg_reaches_target_and_missing_target_is_401() {
    let addr = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    alice.register("alice").await;
    bob.register("bob").await;

    alice.send("PRIVMSG bob :are you there?").await;
    let msg = bob.wait_for(" PRIVMSG bob :are you there?").await;
    assert!(msg.starts_with(":alice!"));

    alice.send("PRIVMSG ghost :hello?").await;
    alice.wait_for(" 401 alice ghost ").await;
}

#[tokio::test]
async fn channel_message_excludes_sender() {
    let addr = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    alice.register("alice").await;
    bob.register("bob").await;
    alice.send("JOIN #tea").await;
    alice.wait_for(" 366 ").await;
    bob.send("JOIN #tea").await;
    bob.wait_for(" 366 ").await;
    alice.wait_for(" JOIN #tea").await;

    alice.send("PRIVMSG #tea :hello all").await;
    bob.wait_for(" PRIVMSG #tea :hello all").await;

    // The sender gets no echo: the next thing alice sees is the PONG.
    alice.send("PING marker").await;
    let lines = alice.collect_until("PONG").await;
    assert!(!lines.iter().any(|l| l.contains("hello all")));
}

#[tokio::test]
async fn nick_change_is_broadcast_exactly_once_with_old_source() {
    let addr = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    alice.register("alice").await;
    bob.register("bob").await;

    // Two shared channels must still produce a single notice.
    for channel in ["#a", "#b"] {
        alice.send(&format!("JOIN {channel}")).await;
        alice.wait_for(" 366 ").await;
        bob.send(&format!("JOIN {channel}")).await;
        bob.wait_for(" 366 ").await;
    }

    alice.send("NICK alicia").await;

    let first = bob.wait_for(" NICK ").await;
    assert!(first.starts_with(":alice!"));
    assert!(first.ends_with("alicia"));

    // Anything duplicated would already be queued before the marker.
    bob.send("PING marker").await;
    let rest = bob.collect_until("PONG").await;
    assert!(!rest.iter().any(|l| l.contains(" NICK ")));
}

#[tokio::test]
async fn quit_is_broadcast_exactly_once_and_not_to_self() {
    let addr = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    alice.register("alice").await;
    bob.register("bob").await;

    for channel in ["#a", "#b"] {
        alice.send(&format!("JOIN {channel}")).await;
        alice.wait_for(" 366 ").await;
        bob.send(&format!("JOIN {channel}")).await;
        bob.wait_for(" 366 ").await;
    }

    alice.send("QUIT :gone fishing").await;

    // The quitting client gets the ERROR acknowledgement, never QUIT.
    let farewell = alice.wait_for("ERROR :").await;
    assert!(!farewell.contains(" QUIT "));
    alice.expect_closed().await;

    let quit = bob.wait_for(" QUIT ").await;
    assert!(quit.starts_with(":alice!"));
    assert!(quit.contains("gone fishing"));

    bob.send("PING marker").await;
    let rest = bob.collect_until("PONG").await;
    assert!(!rest.iter().any(|l| l.contains(" QUIT ")));
}

#[tokio::test]
async fn secret_channels_are_invisible_to_outsiders() {
    let addr = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    alice.register("alice").await;
    bob.register("bob").await;

    alice.send("JOIN #open").await;
    alice.wait_for(" 366 ").await;
    alice.send("JOIN #hidden").await;
    alice.wait_for(" 366 ").await;
    alice.send("MODE #hidden +s").await;
    alice.wait_for(" MODE #hidden ").await;

    bob.send("LIST").await;
    let listing = bob.collect_until(" 323 ").await;
    assert!(listing.iter().any(|l| l.contains("#open")));
    assert!(!listing.iter().any(|l| l.contains("#hidden")));

    // NAMES treats a hidden channel like an absent one.
    bob.send("NAMES #hidden").await;
    bob.wait_for(" 403 ").await;

    // Members still see it.
    alice.send("LIST").await;
    let listing = alice.collect_until(" 323 ").await;
    assert!(listing.iter().any(|l| l.contains("#hidden")));
}

#[tokio::test]
async fn topic_is_shown_to_later_joiners() {
    let addr = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    alice.register("alice").await;
    bob.register("bob").await;

    alice.send("JOIN #tea").await;
    alice.wait_for(" 366 ").await;
    alice.send("TOPIC #tea :brewing at four").await;
    alice.wait_for(" TOPIC #tea ").await;

    bob.send("JOIN #tea").await;
    assert!(bob.wait_for(" 332 ").await.contains("brewing at four"));
}

#[tokio::test]
async fn whois_shows_cloak_and_whowas_remembers_quitters() {
    let addr = start_server(ServerConfig::default()).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    alice.register("alice").await;
    bob.register("bob").await;

    bob.send("WHOIS alice").await;
    let user = bob.wait_for(" 311 bob alice ").await;
    assert!(!user.contains("127.0.0.1"));
    bob.wait_for(" 318 ").await;

    alice.send("QUIT :done").await;
    alice.expect_closed().await;

    bob.send("WHOWAS alice").await;
    bob.wait_for(" 314 bob alice ").await;
    bob.wait_for(" 369 ").await;

    // And the nickname is free again.
    let mut carol = TestClient::connect(addr).await;
    carol.register("alice").await;
}

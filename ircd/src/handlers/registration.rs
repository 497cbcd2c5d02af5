//! The registration handshake: PASS, NICK, USER, CAP, AUTHENTICATE,
//! plus OPER and nickname changes after registration.

use std::sync::Arc;

use crate::auth::{self, SaslPhase};
use crate::client::{self, CapPhase, Client};
use crate::irc::{self, Message};
use crate::modes::UserMode;
use crate::server::Server;

use super::queries;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The capability set offered in CAP LS.
const SUPPORTED_CAPS: &str = "sasl";

fn valid_nick(nick: &str) -> bool {
    let mut chars = nick.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    nick.len() <= 32
        && !first.is_ascii_digit()
        && (first.is_ascii_alphabetic() || "[]\\`^{}|_".contains(first))
        && chars.all(|c| c.is_ascii_alphanumeric() || "[]\\`^{}|_-".contains(c))
}

pub async fn pass(server: &Arc<Server>, client: &Arc<Client>, password: String) {
    let Some(stored) = server.config.server_password() else {
        // No server password configured; PASS is a no-op.
        return;
    };
    if auth::verify(stored, password).await {
        client.set_authorized(true);
    } else {
        client.reply(&Message::from_server(
            server.name(),
            irc::ERR_PASSWDMISMATCH,
            vec![&client.display_nick(), "Password incorrect"],
        ));
        server.quit(client, "bad password");
    }
}

pub fn nick(server: &Arc<Server>, client: &Arc<Client>, nick: &str) {
    let me = client.display_nick();
    if !valid_nick(nick) {
        client.reply(&Message::from_server(
            server.name(),
            irc::ERR_ERRONEUSNICKNAME,
            vec![&me, nick, "Erroneous nickname"],
        ));
        return;
    }
    match client.nick() {
        None => {
            if server.clients.claim(nick, client).is_err() {
                client.reply(&Message::from_server(
                    server.name(),
                    irc::ERR_NICKNAMEINUSE,
                    vec![&me, nick, "Nickname is already in use"],
                ));
                return;
            }
            client.set_nick(nick);
            try_register(server, client);
        }
        Some(old) => change_nick(server, client, &old, nick),
    }
}

/// Rename a live client. The notice is built before anything changes so
/// it carries the old identity; the registry move is atomic, so a
/// conflicting claim leaves the old entry untouched.
fn change_nick(server: &Arc<Server>, client: &Arc<Client>, old: &str, new: &str) {
    let notice = Message::with_prefix(&client.userhost(), "NICK", vec![new]);
    let line = format!("{notice}\r\n");

    if server.clients.rename(old, new, client).is_err() {
        client.reply(&Message::from_server(
            server.name(),
            irc::ERR_NICKNAMEINUSE,
            vec![&client.display_nick(), new, "Nickname is already in use"],
        ));
        return;
    }

    // The old identity becomes history the moment the rename lands.
    server.whowas.append(client);
    client.set_nick(new);
    tracing::debug!(client = client.id(), old, new, "nickname changed");

    for friend in client.friends(&server.channels) {
        friend.send_line(line.clone());
    }
}

pub fn user(server: &Arc<Server>, client: &Arc<Client>, username: &str, realname: &str) {
    if client.username().is_some() {
        return;
    }
    client.set_user(username, realname);
    try_register(server, client);
}

pub fn cap(server: &Arc<Server>, client: &Arc<Client>, subcommand: &str, args: &[String]) {
    let me = client.display_nick();
    match subcommand {
        "LS" => {
            if !client.is_registered() {
                client.set_cap_phase(CapPhase::Negotiating);
            }
            client.reply(&Message::from_server(
                server.name(),
                "CAP",
                vec![&me, "LS", SUPPORTED_CAPS],
            ));
        }
        "REQ" => {
            if !client.is_registered() {
                client.set_cap_phase(CapPhase::Negotiating);
            }
            let requested: Vec<&str> = args.iter().flat_map(|a| a.split_whitespace()).collect();
            let list = requested.join(" ");
            let granted = !requested.is_empty() && requested.iter().all(|c| *c == "sasl");
            if granted {
                for cap in &requested {
                    client.add_cap(cap);
                }
                client.reply(&Message::from_server(
                    server.name(),
                    "CAP",
                    vec![&me, "ACK", &list],
                ));
            } else {
                client.reply(&Message::from_server(
                    server.name(),
                    "CAP",
                    vec![&me, "NAK", &list],
                ));
            }
        }
        "LIST" => {
            let acked = if client.has_cap("sasl") { "sasl" } else { "" };
            client.reply(&Message::from_server(
                server.name(),
                "CAP",
                vec![&me, "LIST", acked],
            ));
        }
        "END" => {
            client.set_cap_phase(CapPhase::Ended);
            try_register(server, client);
        }
        other => {
            client.reply(&Message::from_server(
                server.name(),
                irc::ERR_INVALIDCAPCMD,
                vec![&me, other, "Invalid CAP command"],
            ));
        }
    }
}

pub async fn authenticate(server: &Arc<Server>, client: &Arc<Client>, payload: &str) {
    let me = client.display_nick();
    let phase = client.sasl().phase;
    match phase {
        SaslPhase::Done => {
            client.reply(&Message::from_server(
                server.name(),
                irc::ERR_SASLFAIL,
                vec![&me, "SASL authentication failed"],
            ));
        }
        SaslPhase::None => {
            if payload.eq_ignore_ascii_case("PLAIN") {
                client.sasl().phase = SaslPhase::Plain;
                client.reply(&Message {
                    prefix: None,
                    command: "AUTHENTICATE".to_string(),
                    params: vec!["+".to_string()],
                    trailing: false,
                });
            } else {
                client.sasl().phase = SaslPhase::Done;
                client.reply(&Message::from_server(
                    server.name(),
                    irc::ERR_SASLFAIL,
                    vec![&me, "SASL authentication failed"],
                ));
            }
        }
        SaslPhase::Plain => {
            client.sasl().phase = SaslPhase::Done;
            if payload == "*" {
                client.reply(&Message::from_server(
                    server.name(),
                    irc::ERR_SASLABORTED,
                    vec![&me, "SASL authentication aborted"],
                ));
                return;
            }
            let account = match auth::decode_plain(payload) {
                Some(resp) => {
                    let verified = match server.config.account_password(&resp.authcid) {
                        Some(stored) => auth::verify(stored, resp.password).await,
                        None => false,
                    };
                    verified.then_some(resp.authcid)
                }
                None => None,
            };
            match account {
                Some(account) => {
                    client.sasl().account = Some(account.clone());
                    client.modes.set(UserMode::Registered);
                    let whoami = client.userhost();
                    let welcome = format!("You are now logged in as {account}");
                    client.reply(&Message::from_server(
                        server.name(),
                        irc::RPL_LOGGEDIN,
                        vec![&me, &whoami, &account, &welcome],
                    ));
                    client.reply(&Message::from_server(
                        server.name(),
                        irc::RPL_SASLSUCCESS,
                        vec![&me, "SASL authentication successful"],
                    ));
                    tracing::info!(client = client.id(), account = %account, "sasl login");
                }
                None => {
                    client.reply(&Message::from_server(
                        server.name(),
                        irc::ERR_SASLFAIL,
                        vec![&me, "SASL authentication failed"],
                    ));
                }
            }
        }
    }
}

pub async fn oper(server: &Arc<Server>, client: &Arc<Client>, name: &str, password: &str) {
    let me = client.display_nick();
    let verified = match server.config.oper_password(name) {
        Some(stored) => auth::verify(stored, password.to_string()).await,
        None => false,
    };
    if verified {
        client.modes.set(UserMode::Operator);
        client.reply(&Message::from_server(
            server.name(),
            irc::RPL_YOUREOPER,
            vec![&me, "You are now an IRC operator"],
        ));
        tracing::info!(client = client.id(), oper = name, "operator authenticated");
    } else {
        client.reply(&Message::from_server(
            server.name(),
            irc::ERR_PASSWDMISMATCH,
            vec![&me, "Password incorrect"],
        ));
    }
}

/// Complete registration once the nickname and username are both in and
/// capability negotiation is not in flight.
fn try_register(server: &Arc<Server>, client: &Arc<Client>) {
    if client.is_registered() {
        return;
    }
    if client.nick().is_none() || client.username().is_none() {
        return;
    }
    if client.cap_phase() == CapPhase::Negotiating {
        return;
    }
    if server.config.server_password().is_some() && !client.is_authorized() {
        client.reply(&Message::from_server(
            server.name(),
            irc::ERR_PASSWDMISMATCH,
            vec![&client.display_nick(), "Password required"],
        ));
        server.quit(client, "bad password");
        return;
    }

    client.register();
    client::touch(client, server);
    welcome(server, client);
}

fn welcome(server: &Arc<Server>, client: &Arc<Client>) {
    let nick = client.display_nick();
    let name = server.name();
    let version = format!("ircd-{VERSION}");

    let greeting = format!(
        "Welcome to the {} Internet Relay Network {}",
        server.config.network_name,
        client.userhost()
    );
    client.reply(&Message::from_server(
        name,
        irc::RPL_WELCOME,
        vec![&nick, &greeting],
    ));
    let yourhost = format!("Your host is {name}, running version {version}");
    client.reply(&Message::from_server(
        name,
        irc::RPL_YOURHOST,
        vec![&nick, &yourhost],
    ));
    let created = format!("This server was created {}", server.created().to_rfc2822());
    client.reply(&Message::from_server(
        name,
        irc::RPL_CREATED,
        vec![&nick, &created],
    ));
    client.reply(&Message::from_server(
        name,
        irc::RPL_MYINFO,
        vec![&nick, name, &version, "aiorxzZ", "opstv"],
    ));
    queries::motd(server, client);
    tracing::info!(client = client.id(), nick = %nick, "registered");
}

//! PRIVMSG, NOTICE, AWAY, and keepalive replies.
//!
//! NOTICE follows PRIVMSG exactly but never generates error numerics;
//! failures are silent per the protocol.

use std::sync::Arc;

use crate::client::Client;
use crate::irc::{self, Message};
use crate::server::Server;

pub fn ping(server: &Arc<Server>, client: &Arc<Client>, token: &str) {
    client.reply(&Message::from_server(
        server.name(),
        "PONG",
        vec![server.name(), token],
    ));
}

pub fn privmsg(server: &Arc<Server>, client: &Arc<Client>, target: &str, text: &str, notice: bool) {
    let command = if notice { "NOTICE" } else { "PRIVMSG" };
    let me = client.display_nick();

    if target.starts_with('#') {
        let Some(channel) = server.channels.get(target) else {
            if !notice {
                client.reply(&Message::from_server(
                    server.name(),
                    irc::ERR_NOSUCHCHANNEL,
                    vec![&me, target, "No such channel"],
                ));
            }
            return;
        };
        if !channel.has_member(client) {
            if !notice {
                client.reply(&Message::from_server(
                    server.name(),
                    irc::ERR_CANNOTSENDTOCHAN,
                    vec![&me, channel.name(), "Cannot send to channel"],
                ));
            }
            return;
        }
        let msg = Message::with_text(&client.userhost(), command, vec![channel.name(), text]);
        let line = format!("{msg}\r\n");
        for member in channel.members() {
            if member.id() != client.id() {
                member.send_line(line.clone());
            }
        }
        return;
    }

    let Some(peer) = server.clients.get(target) else {
        if !notice {
            client.reply(&Message::from_server(
                server.name(),
                irc::ERR_NOSUCHNICK,
                vec![&me, target, "No such nick/channel"],
            ));
        }
        return;
    };
    if !client.can_speak(&peer) {
        if !notice {
            client.reply(&Message::from_server(
                server.name(),
                irc::ERR_SECUREONLY,
                vec![&me, &peer.display_nick(), "You must use a secure connection"],
            ));
        }
        return;
    }

    let peer_nick = peer.display_nick();
    peer.send_line(format!(
        "{}\r\n",
        Message::with_text(&client.userhost(), command, vec![&peer_nick, text])
    ));

    if !notice {
        if let Some(away) = peer.away() {
            client.reply(&Message::from_server(
                server.name(),
                irc::RPL_AWAY,
                vec![&me, &peer_nick, &away],
            ));
        }
    }
}

pub fn away(server: &Arc<Server>, client: &Arc<Client>, message: Option<String>) {
    let me = client.display_nick();
    match message {
        Some(text) => {
            client.set_away(Some(text));
            client.reply(&Message::from_server(
                server.name(),
                irc::RPL_NOWAWAY,
                vec![&me, "You have been marked as being away"],
            ));
        }
        None => {
            client.set_away(None);
            client.reply(&Message::from_server(
                server.name(),
                irc::RPL_UNAWAY,
                vec![&me, "You are no longer marked as being away"],
            ));
        }
    }
}

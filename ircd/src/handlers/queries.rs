//! Read-only queries: WHOIS, WHOWAS, MOTD, and user MODE.

use std::sync::Arc;

use crate::client::Client;
use crate::irc::{self, Message};
use crate::modes::UserMode;
use crate::privacy::can_see_channel;
use crate::server::Server;

pub fn whois(server: &Arc<Server>, client: &Arc<Client>, nick: &str) {
    let me = client.display_nick();
    let Some(target) = server.clients.get(nick) else {
        client.reply(&Message::from_server(
            server.name(),
            irc::ERR_NOSUCHNICK,
            vec![&me, nick, "No such nick/channel"],
        ));
        client.reply(&Message::from_server(
            server.name(),
            irc::RPL_ENDOFWHOIS,
            vec![&me, nick, "End of WHOIS list"],
        ));
        return;
    };

    let target_nick = target.display_nick();
    let username = target.username().unwrap_or_else(|| "*".to_string());
    let host = if target.modes.has(UserMode::HostMask) {
        target.hostmask().to_string()
    } else {
        target.hostname().to_string()
    };
    let realname = target.realname();
    client.reply(&Message::from_server(
        server.name(),
        irc::RPL_WHOISUSER,
        vec![&me, &target_nick, &username, &host, "*", &realname],
    ));

    // Channels the asker is allowed to know about.
    let mut visible: Vec<String> = target
        .channel_names()
        .into_iter()
        .filter_map(|name| server.channels.get(&name))
        .filter(|channel| can_see_channel(client, channel))
        .map(|channel| channel.name().to_string())
        .collect();
    visible.sort();
    if !visible.is_empty() {
        let joined = visible.join(" ");
        client.reply(&Message::from_server(
            server.name(),
            irc::RPL_WHOISCHANNELS,
            vec![&me, &target_nick, &joined],
        ));
    }

    client.reply(&Message::from_server(
        server.name(),
        irc::RPL_WHOISSERVER,
        vec![&me, &target_nick, server.name(), &server.config.description],
    ));
    if let Some(away) = target.away() {
        client.reply(&Message::from_server(
            server.name(),
            irc::RPL_AWAY,
            vec![&me, &target_nick, &away],
        ));
    }
    let idle = target.idle_seconds().to_string();
    let signon = target.signon_timestamp().to_string();
    client.reply(&Message::from_server(
        server.name(),
        irc::RPL_WHOISIDLE,
        vec![&me, &target_nick, &idle, &signon, "seconds idle, signon time"],
    ));
    client.reply(&Message::from_server(
        server.name(),
        irc::RPL_ENDOFWHOIS,
        vec![&me, &target_nick, "End of WHOIS list"],
    ));
}

pub fn whowas(server: &Arc<Server>, client: &Arc<Client>, nick: &str) {
    let me = client.display_nick();
    let entries = server.whowas.lookup(nick);
    if entries.is_empty() {
        client.reply(&Message::from_server(
            server.name(),
            irc::ERR_WASNOSUCHNICK,
            vec![&me, nick, "There was no such nickname"],
        ));
    }
    for entry in &entries {
        client.reply(&Message::from_server(
            server.name(),
            irc::RPL_WHOWASUSER,
            vec![
                &me,
                &entry.nick,
                &entry.username,
                &entry.hostmask,
                "*",
                &entry.realname,
            ],
        ));
    }
    client.reply(&Message::from_server(
        server.name(),
        irc::RPL_ENDOFWHOWAS,
        vec![&me, nick, "End of WHOWAS"],
    ));
}

pub fn motd(server: &Arc<Server>, client: &Arc<Client>) {
    let me = client.display_nick();
    match server.motd_lines() {
        Some(lines) => {
            let start = format!("- {} Message of the day - ", server.name());
            client.reply(&Message::from_server(
                server.name(),
                irc::RPL_MOTDSTART,
                vec![&me, &start],
            ));
            for line in lines {
                let text = format!("- {line}");
                client.reply(&Message::from_server(
                    server.name(),
                    irc::RPL_MOTD,
                    vec![&me, &text],
                ));
            }
            client.reply(&Message::from_server(
                server.name(),
                irc::RPL_ENDOFMOTD,
                vec![&me, "End of MOTD command"],
            ));
        }
        None => {
            client.reply(&Message::from_server(
                server.name(),
                irc::ERR_NOMOTD,
                vec![&me, "MOTD File is missing"],
            ));
        }
    }
}

pub fn user_mode(server: &Arc<Server>, client: &Arc<Client>, target: &str, modes: Option<&str>) {
    let me = client.display_nick();
    if !target.eq_ignore_ascii_case(&me) {
        client.reply(&Message::from_server(
            server.name(),
            irc::ERR_USERSDONTMATCH,
            vec![&me, "Cant change mode for other users"],
        ));
        return;
    }

    let Some(modestr) = modes else {
        let current = client.modes.to_string();
        client.reply(&Message::from_server(
            server.name(),
            irc::RPL_UMODEIS,
            vec![&me, &current],
        ));
        return;
    };

    let mut grant = true;
    let mut applied = String::new();
    for letter in modestr.chars() {
        match letter {
            '+' => grant = true,
            '-' => grant = false,
            _ => match UserMode::from_letter(letter) {
                Some(mode) if self_settable(&mode, client) => {
                    if grant {
                        client.modes.set(mode);
                    } else {
                        client.modes.unset(mode);
                    }
                    applied.push(if grant { '+' } else { '-' });
                    applied.push(letter);
                }
                // Managed modes (o, r, z, a, x) change through their own
                // commands, never through MODE.
                Some(_) => {}
                None => {
                    let unknown = letter.to_string();
                    client.reply(&Message::from_server(
                        server.name(),
                        irc::ERR_UMODEUNKNOWNFLAG,
                        vec![&me, &unknown, "Unknown MODE flag"],
                    ));
                }
            },
        }
    }

    if !applied.is_empty() {
        client.reply(&Message::with_prefix(
            &client.userhost(),
            "MODE",
            vec![&me, &applied],
        ));
    }
}

/// Modes a client may toggle on itself. Refusing plaintext requires an
/// encrypted connection to begin with.
fn self_settable(mode: &UserMode, client: &Client) -> bool {
    match mode {
        UserMode::Invisible => true,
        UserMode::SecureOnly => client.modes.has(UserMode::SecureConn),
        _ => false,
    }
}

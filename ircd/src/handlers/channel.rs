//! Channel membership and state: JOIN, PART, TOPIC, NAMES, LIST, and
//! channel MODE.

use std::sync::Arc;

use crate::channel::Channel;
use crate::client::Client;
use crate::irc::{self, Message};
use crate::metrics;
use crate::modes::{ChannelFlag, MemberMode, UserMode};
use crate::privacy::can_see_channel;
use crate::server::Server;

pub fn join(server: &Arc<Server>, client: &Arc<Client>, channels: &[String]) {
    let me = client.display_nick();
    for name in channels {
        if !name.starts_with('#') {
            client.reply(&Message::from_server(
                server.name(),
                irc::ERR_NOSUCHCHANNEL,
                vec![&me, name, "No such channel"],
            ));
            continue;
        }

        // The first member founds the channel and gets operator.
        let (channel, created, joined) = server.channels.join(name, client);
        if created {
            tracing::debug!(channel = channel.name(), "channel created");
            metrics::channel_created();
        }
        if !joined {
            continue;
        }

        let notice = Message::with_prefix(&client.userhost(), "JOIN", vec![channel.name()]);
        let line = format!("{notice}\r\n");
        for member in channel.members() {
            member.send_line(line.clone());
        }

        if let Some(topic) = channel.topic() {
            client.reply(&Message::from_server(
                server.name(),
                irc::RPL_TOPIC,
                vec![&me, channel.name(), &topic],
            ));
        }
        names_reply(server, client, &channel);
    }
}

pub fn part(server: &Arc<Server>, client: &Arc<Client>, channels: &[String], message: Option<&str>) {
    let me = client.display_nick();
    for name in channels {
        let Some(channel) = server.channels.get(name) else {
            client.reply(&Message::from_server(
                server.name(),
                irc::ERR_NOSUCHCHANNEL,
                vec![&me, name, "No such channel"],
            ));
            continue;
        };
        if !channel.has_member(client) {
            client.reply(&Message::from_server(
                server.name(),
                irc::ERR_NOTONCHANNEL,
                vec![&me, name, "You're not on that channel"],
            ));
            continue;
        }

        let text = message.unwrap_or(&me);
        let notice = Message::with_text(&client.userhost(), "PART", vec![channel.name(), text]);
        let line = format!("{notice}\r\n");
        // Snapshot before removal so the departing member hears it too.
        for member in channel.members() {
            member.send_line(line.clone());
        }

        channel.part(client);
        server.drop_channel_if_empty(channel.name());
    }
}

pub fn topic(server: &Arc<Server>, client: &Arc<Client>, name: &str, topic: Option<String>) {
    let me = client.display_nick();
    let Some(channel) = server.channels.get(name) else {
        client.reply(&Message::from_server(
            server.name(),
            irc::ERR_NOSUCHCHANNEL,
            vec![&me, name, "No such channel"],
        ));
        return;
    };

    let Some(text) = topic else {
        match channel.topic() {
            Some(current) => client.reply(&Message::from_server(
                server.name(),
                irc::RPL_TOPIC,
                vec![&me, channel.name(), &current],
            )),
            None => client.reply(&Message::from_server(
                server.name(),
                irc::RPL_NOTOPIC,
                vec![&me, channel.name(), "No topic is set"],
            )),
        }
        return;
    };

    if !channel.has_member(client) {
        client.reply(&Message::from_server(
            server.name(),
            irc::ERR_NOTONCHANNEL,
            vec![&me, channel.name(), "You're not on that channel"],
        ));
        return;
    }
    if channel.has_flag(ChannelFlag::TopicLock)
        && !channel.member_has_mode(client, MemberMode::ChannelOperator)
        && !client.modes.has(UserMode::Operator)
    {
        client.reply(&Message::from_server(
            server.name(),
            irc::ERR_CHANOPRIVSNEEDED,
            vec![&me, channel.name(), "You're not channel operator"],
        ));
        return;
    }

    channel.set_topic(if text.is_empty() { None } else { Some(text.clone()) });

    let notice = Message::with_text(&client.userhost(), "TOPIC", vec![channel.name(), &text]);
    let line = format!("{notice}\r\n");
    for member in channel.members() {
        member.send_line(line.clone());
    }
}

pub fn names(server: &Arc<Server>, client: &Arc<Client>, name: &str) {
    let me = client.display_nick();
    match server.channels.get(name) {
        Some(channel) if can_see_channel(client, &channel) => {
            names_reply(server, client, &channel);
        }
        // A hidden channel is indistinguishable from an absent one.
        _ => {
            client.reply(&Message::from_server(
                server.name(),
                irc::ERR_NOSUCHCHANNEL,
                vec![&me, name, "No such channel"],
            ));
        }
    }
}

pub fn list(server: &Arc<Server>, client: &Arc<Client>) {
    let me = client.display_nick();
    client.reply(&Message::from_server(
        server.name(),
        irc::RPL_LISTSTART,
        vec![&me, "Channel", "Users Name"],
    ));
    for channel in server.channels.snapshot() {
        if !can_see_channel(client, &channel) {
            continue;
        }
        let count = channel.member_count().to_string();
        let topic = channel.topic().unwrap_or_default();
        client.reply(&Message::from_server(
            server.name(),
            irc::RPL_LIST,
            vec![&me, channel.name(), &count, &topic],
        ));
    }
    client.reply(&Message::from_server(
        server.name(),
        irc::RPL_LISTEND,
        vec![&me, "End of LIST"],
    ));
}

pub fn mode(
    server: &Arc<Server>,
    client: &Arc<Client>,
    name: &str,
    modes: Option<&str>,
    arg: Option<&str>,
) {
    let me = client.display_nick();
    let Some(channel) = server.channels.get(name) else {
        client.reply(&Message::from_server(
            server.name(),
            irc::ERR_NOSUCHCHANNEL,
            vec![&me, name, "No such channel"],
        ));
        return;
    };

    let Some(modestr) = modes else {
        client.reply(&Message::from_server(
            server.name(),
            irc::RPL_CHANNELMODEIS,
            vec![&me, channel.name(), &channel.flag_string()],
        ));
        return;
    };

    if !channel.member_has_mode(client, MemberMode::ChannelOperator)
        && !client.modes.has(UserMode::Operator)
    {
        client.reply(&Message::from_server(
            server.name(),
            irc::ERR_CHANOPRIVSNEEDED,
            vec![&me, channel.name(), "You're not channel operator"],
        ));
        return;
    }

    let mut grant = true;
    let mut applied = String::new();
    for letter in modestr.chars() {
        match letter {
            '+' => grant = true,
            '-' => grant = false,
            _ => {
                if apply_channel_mode(server, client, &channel, letter, grant, arg) {
                    applied.push(if grant { '+' } else { '-' });
                    applied.push(letter);
                }
            }
        }
    }

    if !applied.is_empty() {
        let mut params = vec![channel.name(), applied.as_str()];
        if let Some(arg) = arg {
            params.push(arg);
        }
        let notice = Message::with_prefix(&client.userhost(), "MODE", params);
        let line = format!("{notice}\r\n");
        for member in channel.members() {
            member.send_line(line.clone());
        }
    }
}

/// Apply one channel mode letter. True when state actually changed and
/// the change should be echoed to members.
fn apply_channel_mode(
    server: &Arc<Server>,
    client: &Arc<Client>,
    channel: &Arc<Channel>,
    letter: char,
    grant: bool,
    arg: Option<&str>,
) -> bool {
    let me = client.display_nick();
    if let Some(flag) = ChannelFlag::from_letter(letter) {
        if grant {
            channel.set_flag(flag);
        } else {
            channel.unset_flag(flag);
        }
        return true;
    }

    if let Some(member_mode) = MemberMode::from_letter(letter) {
        let Some(target_nick) = arg else {
            client.reply(&Message::from_server(
                server.name(),
                irc::ERR_NEEDMOREPARAMS,
                vec![&me, "MODE", "Not enough parameters"],
            ));
            return false;
        };
        let Some(target) = server.clients.get(target_nick) else {
            client.reply(&Message::from_server(
                server.name(),
                irc::ERR_NOSUCHNICK,
                vec![&me, target_nick, "No such nick/channel"],
            ));
            return false;
        };
        if !channel.set_member_mode(&target, member_mode, grant) {
            client.reply(&Message::from_server(
                server.name(),
                irc::ERR_USERNOTINCHANNEL,
                vec![&me, target_nick, channel.name(), "They aren't on that channel"],
            ));
            return false;
        }
        return true;
    }

    let unknown = letter.to_string();
    client.reply(&Message::from_server(
        server.name(),
        irc::ERR_UNKNOWNMODE,
        vec![&me, &unknown, "is unknown mode char to me"],
    ));
    false
}

/// 353/366 pair for one channel.
pub fn names_reply(server: &Arc<Server>, client: &Arc<Client>, channel: &Arc<Channel>) {
    let me = client.display_nick();
    let mut names: Vec<String> = channel
        .members()
        .iter()
        .map(|member| {
            let nick = member.display_nick();
            match channel.member_prefix(member) {
                Some(prefix) => format!("{prefix}{nick}"),
                None => nick,
            }
        })
        .collect();
    names.sort();
    let joined = names.join(" ");
    client.reply(&Message::from_server(
        server.name(),
        irc::RPL_NAMREPLY,
        vec![&me, "=", channel.name(), &joined],
    ));
    client.reply(&Message::from_server(
        server.name(),
        irc::RPL_ENDOFNAMES,
        vec![&me, channel.name(), "End of NAMES list"],
    ));
}

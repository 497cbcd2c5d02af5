//! Command handlers, grouped by concern. The dispatch gate has already
//! applied the registration-state policy by the time anything here runs.

pub mod channel;
pub mod messaging;
pub mod queries;
pub mod registration;

use std::sync::Arc;

use crate::client::Client;
use crate::command::Command;
use crate::server::Server;

pub async fn handle(server: &Arc<Server>, client: &Arc<Client>, command: Command) {
    match command {
        Command::Pass { password } => registration::pass(server, client, password).await,
        Command::Nick { nick } => registration::nick(server, client, &nick),
        Command::User { username, realname } => {
            registration::user(server, client, &username, &realname)
        }
        Command::Cap { subcommand, args } => registration::cap(server, client, &subcommand, &args),
        Command::Authenticate { payload } => {
            registration::authenticate(server, client, &payload).await
        }
        Command::Oper { name, password } => registration::oper(server, client, &name, &password).await,
        Command::Ping { token } => messaging::ping(server, client, &token),
        Command::Pong { .. } => {}
        Command::Join { channels } => channel::join(server, client, &channels),
        Command::Part { channels, message } => {
            channel::part(server, client, &channels, message.as_deref())
        }
        Command::PrivMsg { target, text } => {
            messaging::privmsg(server, client, &target, &text, false)
        }
        Command::Notice { target, text } => {
            messaging::privmsg(server, client, &target, &text, true)
        }
        Command::Mode { target, modes, arg } => {
            if target.starts_with('#') {
                channel::mode(server, client, &target, modes.as_deref(), arg.as_deref());
            } else {
                queries::user_mode(server, client, &target, modes.as_deref());
            }
        }
        Command::Topic { channel: name, topic } => channel::topic(server, client, &name, topic),
        Command::List => channel::list(server, client),
        Command::Names { channel: name } => channel::names(server, client, &name),
        Command::Whois { nick } => queries::whois(server, client, &nick),
        Command::WhoWas { nick } => queries::whowas(server, client, &nick),
        Command::Away { message } => messaging::away(server, client, message),
        Command::Motd => queries::motd(server, client),
        Command::Quit { message } => {
            server.quit(client, message.as_deref().unwrap_or("Client Quit"));
        }
        // The dispatch gate rejects unknown commands in both states.
        Command::Unknown { .. } => {}
    }
}

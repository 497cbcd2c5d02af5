//! The dispatch gate: registration-state policy applied to every parsed
//! command before any handler runs.
//!
//! An unregistered client sending anything outside the handshake set is
//! a protocol violation and is force-quit. A registered client sending
//! something unroutable gets an advisory numeric and stays connected.

use std::sync::Arc;
use std::time::Instant;

use crate::client::{self, Client};
use crate::command::Command;
use crate::handlers;
use crate::irc::{self, Message};
use crate::metrics;
use crate::server::Server;

pub async fn dispatch(server: &Arc<Server>, client: &Arc<Client>, command: Command) {
    if !client.is_registered() {
        if !command.usable_pre_registration() {
            server.quit(client, "unexpected command");
            return;
        }
        handlers::handle(server, client, command).await;
        return;
    }

    if !command.usable_post_registration() {
        let code = command.code().to_string();
        client.reply(&Message::from_server(
            server.name(),
            irc::ERR_UNKNOWNCOMMAND,
            vec![&client.display_nick(), &code, "Unknown command"],
        ));
        return;
    }

    // PING and PONG keep the connection alive without counting as user
    // activity; QUIT resets nothing.
    match &command {
        Command::Ping { .. } | Command::Pong { .. } => client::touch(client, server),
        Command::Quit { .. } => {}
        _ => {
            client.active();
            client::touch(client, server);
        }
    }

    let code = command.code().to_string();
    let started = Instant::now();
    handlers::handle(server, client, command).await;
    metrics::record_command(&code, started.elapsed());
}

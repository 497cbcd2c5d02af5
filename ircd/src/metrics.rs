//! Metric name constants and recording helpers.
//!
//! All metric names live here. Call sites use these constants rather
//! than raw strings to keep renaming centralized.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Total commands routed through the dispatch gate (counter).
pub const CLIENT_COMMANDS: &str = "ircd_client_commands_total";
/// Command handling latency in seconds, labeled by command (histogram).
pub const CLIENT_COMMAND_DURATION: &str = "ircd_client_command_duration_seconds";
/// Currently connected clients, labeled by transport (gauge).
pub const SERVER_CLIENTS: &str = "ircd_server_clients";
/// Total connections accepted over the server's lifetime (counter).
pub const SERVER_CONNECTIONS: &str = "ircd_server_connections_total";
/// Currently live channels (gauge).
pub const SERVER_CHANNELS: &str = "ircd_server_channels";

fn transport_label(secure: bool) -> &'static str {
    if secure { "secure" } else { "insecure" }
}

pub fn record_command(code: &str, elapsed: Duration) {
    counter!(CLIENT_COMMANDS).increment(1);
    histogram!(CLIENT_COMMAND_DURATION, "command" => code.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn client_connected(secure: bool) {
    counter!(SERVER_CONNECTIONS).increment(1);
    gauge!(SERVER_CLIENTS, "transport" => transport_label(secure)).increment(1.0);
}

pub fn client_disconnected(secure: bool) {
    gauge!(SERVER_CLIENTS, "transport" => transport_label(secure)).decrement(1.0);
}

pub fn channel_created() {
    gauge!(SERVER_CHANNELS).increment(1.0);
}

pub fn channel_destroyed() {
    gauge!(SERVER_CHANNELS).decrement(1.0);
}

//! A multi-user IRC server core.
//!
//! One reader and one writer task per connection, shared nickname and
//! channel registries behind fine-grained locks, a registration-state
//! dispatch gate in front of every command, and a two-timer keepalive
//! that probes silent connections before dropping them.

pub mod auth;
pub mod channel;
pub mod client;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod history;
pub mod irc;
pub mod metrics;
pub mod modes;
pub mod privacy;
pub mod registry;
pub mod server;
pub mod web;

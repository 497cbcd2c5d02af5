//! Channel visibility rules.

use crate::channel::Channel;
use crate::client::Client;
use crate::modes::{ChannelFlag, UserMode};

/// May `client` learn that `channel` exists (LIST, NAMES, WHOIS)?
///
/// Pure predicate: secret and private channels are visible to members
/// and to server operators; private channels are additionally visible
/// to trust-marked clients on encrypted connections. Unflagged channels
/// are visible to everyone.
pub fn can_see_channel(client: &Client, channel: &Channel) -> bool {
    let is_private = channel.has_flag(ChannelFlag::Private);
    let is_secret = channel.has_flag(ChannelFlag::Secret);

    let is_member = channel.has_member(client);
    let is_operator = client.modes.has(UserMode::Operator);
    let is_registered = client.modes.has(UserMode::Registered);
    let is_secure = client.modes.has(UserMode::SecureConn);

    if !(is_secret || is_private) {
        return true;
    }
    if is_secret && (is_member || is_operator) {
        return true;
    }
    if is_private && (is_member || is_operator || (is_registered && is_secure)) {
        return true;
    }
    false
}

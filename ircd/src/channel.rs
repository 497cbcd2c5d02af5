//! A channel and its member table.
//!
//! The channel is the source of truth for membership; each client keeps
//! a name-keyed cache of its own memberships for fast iteration. Every
//! membership mutation updates both sides before returning.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::client::Client;
use crate::modes::{ChannelFlag, MemberMode};

struct Member {
    client: Arc<Client>,
    modes: HashSet<MemberMode>,
}

pub struct Channel {
    name: String,
    flags: Mutex<HashSet<ChannelFlag>>,
    topic: Mutex<Option<String>>,
    members: Mutex<HashMap<u64, Member>>,
}

impl Channel {
    /// `name` must already be case-normalized (the registry's key).
    pub fn new(name: &str) -> Channel {
        Channel {
            name: name.to_string(),
            flags: Mutex::new(HashSet::new()),
            topic: Mutex::new(None),
            members: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_flag(&self, flag: ChannelFlag) -> bool {
        self.flags.lock().unwrap().contains(&flag)
    }

    pub fn set_flag(&self, flag: ChannelFlag) {
        self.flags.lock().unwrap().insert(flag);
    }

    pub fn unset_flag(&self, flag: ChannelFlag) {
        self.flags.lock().unwrap().remove(&flag);
    }

    /// Channel mode string, e.g. `+st`.
    pub fn flag_string(&self) -> String {
        let mut letters: Vec<char> = self
            .flags
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.letter())
            .collect();
        letters.sort_unstable();
        format!("+{}", letters.into_iter().collect::<String>())
    }

    pub fn topic(&self) -> Option<String> {
        self.topic.lock().unwrap().clone()
    }

    pub fn set_topic(&self, topic: Option<String>) {
        *self.topic.lock().unwrap() = topic;
    }

    /// Add a member and update its membership cache. Returns false when
    /// the client was already a member; existing roles are kept.
    pub fn join(&self, client: &Arc<Client>, as_operator: bool) -> bool {
        let mut members = self.members.lock().unwrap();
        if members.contains_key(&client.id()) {
            return false;
        }
        let mut modes = HashSet::new();
        if as_operator {
            modes.insert(MemberMode::ChannelOperator);
        }
        members.insert(
            client.id(),
            Member {
                client: Arc::clone(client),
                modes,
            },
        );
        drop(members);
        client.cache_join(&self.name);
        true
    }

    /// Remove a member and update its membership cache. Returns false
    /// when the client was not a member.
    pub fn part(&self, client: &Arc<Client>) -> bool {
        let removed = self.members.lock().unwrap().remove(&client.id()).is_some();
        client.cache_part(&self.name);
        removed
    }

    /// Detach a quitting client. Membership removal only; the single
    /// QUIT notice to friends is the observer-visible signal.
    pub fn quit(&self, client: &Arc<Client>) {
        self.part(client);
    }

    pub fn has_member(&self, client: &Client) -> bool {
        self.members.lock().unwrap().contains_key(&client.id())
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().unwrap().is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.members.lock().unwrap().len()
    }

    /// Snapshot of all members.
    pub fn members(&self) -> Vec<Arc<Client>> {
        self.members
            .lock()
            .unwrap()
            .values()
            .map(|m| Arc::clone(&m.client))
            .collect()
    }

    pub fn member_has_mode(&self, client: &Client, mode: MemberMode) -> bool {
        self.members
            .lock()
            .unwrap()
            .get(&client.id())
            .is_some_and(|m| m.modes.contains(&mode))
    }

    /// Grant or revoke a member role. Returns false when the target is
    /// not a member.
    pub fn set_member_mode(&self, client: &Client, mode: MemberMode, grant: bool) -> bool {
        let mut members = self.members.lock().unwrap();
        match members.get_mut(&client.id()) {
            Some(member) => {
                if grant {
                    member.modes.insert(mode);
                } else {
                    member.modes.remove(&mode);
                }
                true
            }
            None => false,
        }
    }

    /// NAMES-style display prefix for a member.
    pub fn member_prefix(&self, client: &Client) -> Option<char> {
        let members = self.members.lock().unwrap();
        let member = members.get(&client.id())?;
        if member.modes.contains(&MemberMode::ChannelOperator) {
            Some(MemberMode::ChannelOperator.prefix())
        } else if member.modes.contains(&MemberMode::Voice) {
            Some(MemberMode::Voice.prefix())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(id: u64) -> Arc<Client> {
        let (client, _rx) = Client::new(id, false, "host.test");
        client
    }

    #[test]
    fn join_updates_both_sides() {
        let ch = Channel::new("#x");
        let a = client(1);
        ch.join(&a, true);
        assert!(ch.has_member(&a));
        assert!(a.channel_names().contains(&"#x".to_string()));
        assert!(ch.member_has_mode(&a, MemberMode::ChannelOperator));
    }

    #[test]
    fn part_updates_both_sides() {
        let ch = Channel::new("#x");
        let a = client(1);
        ch.join(&a, false);
        assert!(ch.part(&a));
        assert!(!ch.has_member(&a));
        assert!(a.channel_names().is_empty());
        assert!(ch.is_empty());
        assert!(!ch.part(&a));
    }

    #[test]
    fn rejoin_does_not_reset_roles() {
        let ch = Channel::new("#x");
        let a = client(1);
        assert!(ch.join(&a, true));
        assert!(!ch.join(&a, false));
        assert!(ch.member_has_mode(&a, MemberMode::ChannelOperator));
    }

    #[test]
    fn member_prefix_prefers_operator() {
        let ch = Channel::new("#x");
        let a = client(1);
        ch.join(&a, true);
        ch.set_member_mode(&a, MemberMode::Voice, true);
        assert_eq!(ch.member_prefix(&a), Some('@'));
        ch.set_member_mode(&a, MemberMode::ChannelOperator, false);
        assert_eq!(ch.member_prefix(&a), Some('+'));
    }

    #[test]
    fn flag_string_is_sorted() {
        let ch = Channel::new("#x");
        ch.set_flag(ChannelFlag::TopicLock);
        ch.set_flag(ChannelFlag::Secret);
        assert_eq!(ch.flag_string(), "+st");
        ch.unset_flag(ChannelFlag::Secret);
        assert_eq!(ch.flag_string(), "+t");
    }

    #[test]
    fn mode_on_non_member_fails() {
        let ch = Channel::new("#x");
        let outsider = client(9);
        assert!(!ch.set_member_mode(&outsider, MemberMode::Voice, true));
    }
}

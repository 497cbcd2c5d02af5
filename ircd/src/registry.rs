//! Concurrent registries for live nicknames and channels.
//!
//! Both registries map case-normalized names to shared entities. All
//! mutation goes through atomic insert/remove/rename operations under a
//! single lock per registry; no caller ever holds a registry lock across
//! an await point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::channel::Channel;
use crate::client::Client;

/// Case normalization applied to every nickname and channel name key.
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("nickname {0} is already in use")]
pub struct NickInUse(pub String);

/// Live nicknames. A client appears here iff it has a nickname and has
/// not been torn down.
#[derive(Default)]
pub struct ClientRegistry {
    inner: Mutex<HashMap<String, Arc<Client>>>,
}

impl ClientRegistry {
    pub fn new() -> ClientRegistry {
        ClientRegistry::default()
    }

    /// Atomically claim a nickname. The loser of a race gets `NickInUse`;
    /// the winner's entry is visible to all lookups before this returns.
    /// A teardown racing the claim rolls the entry back, so a quit
    /// client never stays registered.
    pub fn claim(&self, nick: &str, client: &Arc<Client>) -> Result<(), NickInUse> {
        let key = normalize(nick);
        let mut inner = self.inner.lock().unwrap();
        if inner.contains_key(&key) {
            return Err(NickInUse(nick.to_string()));
        }
        inner.insert(key.clone(), Arc::clone(client));
        if client.has_quit() {
            inner.remove(&key);
        }
        Ok(())
    }

    /// Atomically move a client from one nickname to another. Fails
    /// without touching the old entry when the new name is taken; rolls
    /// the new entry back when a teardown raced the move.
    pub fn rename(&self, old: &str, new: &str, client: &Arc<Client>) -> Result<(), NickInUse> {
        let old_key = normalize(old);
        let new_key = normalize(new);
        let mut inner = self.inner.lock().unwrap();
        if new_key != old_key && inner.contains_key(&new_key) {
            return Err(NickInUse(new.to_string()));
        }
        inner.remove(&old_key);
        inner.insert(new_key.clone(), Arc::clone(client));
        if client.has_quit() {
            inner.remove(&new_key);
        }
        Ok(())
    }

    /// Remove the entry holding this exact client, whatever nickname it
    /// is filed under. Teardown uses this so an identity update racing
    /// the quit cannot strand a registry entry.
    pub fn remove_client(&self, client: &Arc<Client>) {
        let mut inner = self.inner.lock().unwrap();
        inner.retain(|_, entry| !Arc::ptr_eq(entry, client));
    }

    pub fn get(&self, nick: &str) -> Option<Arc<Client>> {
        self.inner.lock().unwrap().get(&normalize(nick)).cloned()
    }

    pub fn contains(&self, nick: &str) -> bool {
        self.inner.lock().unwrap().contains_key(&normalize(nick))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all registered clients.
    pub fn snapshot(&self) -> Vec<Arc<Client>> {
        self.inner.lock().unwrap().values().cloned().collect()
    }
}

/// Live channels, created on first join and dropped when empty.
#[derive(Default)]
pub struct ChannelRegistry {
    inner: Mutex<HashMap<String, Arc<Channel>>>,
}

impl ChannelRegistry {
    pub fn new() -> ChannelRegistry {
        ChannelRegistry::default()
    }

    /// Fetch a channel, creating it if absent. The boolean is true when
    /// this call created the channel.
    pub fn get_or_create(&self, name: &str) -> (Arc<Channel>, bool) {
        let key = normalize(name);
        let mut inner = self.inner.lock().unwrap();
        match inner.get(&key) {
            Some(existing) => (Arc::clone(existing), false),
            None => {
                let channel = Arc::new(Channel::new(&key));
                inner.insert(key, Arc::clone(&channel));
                (channel, true)
            }
        }
    }

    /// Fetch or create a channel and insert the member in one step under
    /// the registry lock, so a concurrent [`ChannelRegistry::remove_if_empty`]
    /// either sees the new member or has already dropped the channel the
    /// joiner would have landed in. Returns the channel, whether this
    /// call created it (the founder gets operator), and whether the
    /// client is a new member.
    pub fn join(&self, name: &str, client: &Arc<Client>) -> (Arc<Channel>, bool, bool) {
        let key = normalize(name);
        let mut inner = self.inner.lock().unwrap();
        let (channel, created) = match inner.get(&key) {
            Some(existing) => (Arc::clone(existing), false),
            None => {
                let channel = Arc::new(Channel::new(&key));
                inner.insert(key, Arc::clone(&channel));
                (channel, true)
            }
        };
        let joined = channel.join(client, created);
        (channel, created, joined)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Channel>> {
        self.inner.lock().unwrap().get(&normalize(name)).cloned()
    }

    /// Drop the channel when its member set has emptied. Checked under
    /// the registry lock so a concurrent join either sees the channel
    /// before removal or creates a fresh one afterwards. True when the
    /// channel was removed.
    pub fn remove_if_empty(&self, name: &str) -> bool {
        let key = normalize(name);
        let mut inner = self.inner.lock().unwrap();
        let empty = inner.get(&key).is_some_and(|ch| ch.is_empty());
        if empty {
            inner.remove(&key);
        }
        empty
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Arc<Channel>> {
        self.inner.lock().unwrap().values().cloned().collect()
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
    fn claim_is_exclusive() {
        let registry = ClientRegistry::new();
        let a = client(1);
        let b = client(2);
        assert!(registry.claim("Bob", &a).is_ok());
        assert_eq!(
            registry.claim("bob", &b),
            Err(NickInUse("bob".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn racing_claims_have_exactly_one_winner() {
        let registry = Arc::new(ClientRegistry::new());
        let mut handles = Vec::new();
        for id in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                let c = client(id);
                registry.claim("bob", &c).is_ok()
            }));
        }
        let wins: usize = handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();
        assert_eq!(wins, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rename_keeps_old_entry_on_conflict() {
        let registry = ClientRegistry::new();
        let a = client(1);
        let b = client(2);
        registry.claim("alice", &a).unwrap();
        registry.claim("bob", &b).unwrap();

        assert!(registry.rename("alice", "BOB", &a).is_err());
        assert!(registry.contains("alice"));

        registry.rename("alice", "alicia", &a).unwrap();
        assert!(!registry.contains("alice"));
        assert!(registry.contains("Alicia"));
    }

    #[test]
    fn claim_by_a_quit_client_rolls_back() {
        let registry = ClientRegistry::new();
        let a = client(1);
        a.mark_quit();
        assert!(registry.claim("alice", &a).is_ok());
        assert!(!registry.contains("alice"));
    }

    #[test]
    fn rename_by_a_quit_client_rolls_back() {
        let registry = ClientRegistry::new();
        let a = client(1);
        registry.claim("alice", &a).unwrap();
        a.mark_quit();
        assert!(registry.rename("alice", "alicia", &a).is_ok());
        assert!(!registry.contains("alice"));
        assert!(!registry.contains("alicia"));
    }

    #[test]
    fn remove_client_ignores_the_filed_nickname() {
        let registry = ClientRegistry::new();
        let a = client(1);
        registry.claim("alice", &a).unwrap();
        // Identity moved on without the registry hearing about it.
        a.set_nick("alicia");
        registry.remove_client(&a);
        assert!(registry.is_empty());
    }

    #[test]
    fn rename_to_same_nick_different_case() {
        let registry = ClientRegistry::new();
        let a = client(1);
        registry.claim("alice", &a).unwrap();
        assert!(registry.rename("alice", "Alice", &a).is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn channels_are_created_once() {
        let registry = ChannelRegistry::new();
        let (first, created) = registry.get_or_create("#X");
        assert!(created);
        let (second, created) = registry.get_or_create("#x");
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn join_lands_in_a_live_channel_after_removal() {
        let registry = ChannelRegistry::new();
        let (stale, _) = registry.get_or_create("#x");
        registry.remove_if_empty("#x");

        // A joiner still holding the dropped channel goes through the
        // registry and gets a fresh one.
        let (member, _rx) = Client::new(1, false, "host.test");
        let (channel, created, joined) = registry.join("#x", &member);
        assert!(created);
        assert!(joined);
        assert!(!Arc::ptr_eq(&stale, &channel));
        assert!(!stale.has_member(&member));
        assert!(registry.get("#x").unwrap().has_member(&member));
    }

    #[test]
    fn join_grants_founder_operator_once() {
        let registry = ChannelRegistry::new();
        let (founder, _rx) = Client::new(1, false, "host.test");
        let (later, _rx2) = Client::new(2, false, "host.test");

        let (channel, created, _) = registry.join("#x", &founder);
        assert!(created);
        let (_, created, joined) = registry.join("#x", &later);
        assert!(!created);
        assert!(joined);

        assert!(channel.member_has_mode(&founder, crate::modes::MemberMode::ChannelOperator));
        assert!(!channel.member_has_mode(&later, crate::modes::MemberMode::ChannelOperator));
    }

    #[test]
    fn empty_channels_are_removed() {
        let registry = ChannelRegistry::new();
        let (_ch, _) = registry.get_or_create("#x");
        registry.remove_if_empty("#x");
        assert!(registry.get("#x").is_none());
    }

    #[test]
    fn occupied_channels_survive_removal_attempts() {
        let registry = ChannelRegistry::new();
        let (ch, _) = registry.get_or_create("#x");
        let (member, _rx) = Client::new(7, false, "host.test");
        ch.join(&member, true);
        registry.remove_if_empty("#x");
        assert!(registry.get("#x").is_some());
    }
}

//! Append-only record of departed and renamed identities.
//!
//! Appended at exactly two points: quit and nickname change. Consulted
//! by WHOWAS.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::client::Client;

#[derive(Debug, Clone)]
pub struct WhoWasEntry {
    pub nick: String,
    pub username: String,
    pub hostmask: String,
    pub realname: String,
    pub seen: DateTime<Utc>,
}

pub struct WhoWas {
    capacity: usize,
    entries: Mutex<VecDeque<WhoWasEntry>>,
}

impl WhoWas {
    pub fn new(capacity: usize) -> WhoWas {
        WhoWas {
            capacity,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Record the client's current identity. Clients that never set a
    /// nickname leave no record.
    pub fn append(&self, client: &Client) {
        let Some(nick) = client.nick() else {
            return;
        };
        let entry = WhoWasEntry {
            nick,
            username: client.username().unwrap_or_else(|| "*".to_string()),
            hostmask: client.hostmask().to_string(),
            realname: client.realname(),
            seen: Utc::now(),
        };
        let mut entries = self.entries.lock().unwrap();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// All records for a nickname, newest first.
    pub fn lookup(&self, nick: &str) -> Vec<WhoWasEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|e| e.nick.eq_ignore_ascii_case(nick))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn named_client(id: u64, nick: &str) -> Arc<Client> {
        let (client, _rx) = Client::new(id, false, "host.test");
        client.set_nick(nick);
        client.set_user("u", "Real Name");
        client
    }

    #[test]
    fn records_and_looks_up() {
        let whowas = WhoWas::new(8);
        whowas.append(&named_client(1, "alice"));
        whowas.append(&named_client(2, "bob"));
        whowas.append(&named_client(3, "Alice"));

        let found = whowas.lookup("ALICE");
        assert_eq!(found.len(), 2);
        // Newest first.
        assert_eq!(found[0].nick, "Alice");
        assert_eq!(found[1].nick, "alice");
    }

    #[test]
    fn nickless_clients_leave_no_record() {
        let whowas = WhoWas::new(8);
        let (client, _rx) = Client::new(1, false, "host.test");
        whowas.append(&client);
        assert!(whowas.lookup("*").is_empty());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let whowas = WhoWas::new(2);
        whowas.append(&named_client(1, "a"));
        whowas.append(&named_client(2, "b"));
        whowas.append(&named_client(3, "c"));
        assert!(whowas.lookup("a").is_empty());
        assert_eq!(whowas.lookup("b").len(), 1);
        assert_eq!(whowas.lookup("c").len(), 1);
    }
}

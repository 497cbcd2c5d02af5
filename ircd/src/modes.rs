//! User modes, channel flags, and per-member channel modes.

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

/// A standing flag on a client. Each is independent of the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserMode {
    /// Client has set an away message.
    Away,
    /// Client is hidden from broad queries.
    Invisible,
    /// Server operator privilege.
    Operator,
    /// Trust mark: client authenticated against a configured account.
    Registered,
    /// The underlying transport is encrypted.
    SecureConn,
    /// Client refuses plaintext conversations.
    SecureOnly,
    /// Display the cloaked hostname instead of the real one.
    HostMask,
}

impl UserMode {
    pub fn letter(self) -> char {
        match self {
            UserMode::Away => 'a',
            UserMode::Invisible => 'i',
            UserMode::Operator => 'o',
            UserMode::Registered => 'r',
            UserMode::SecureConn => 'z',
            UserMode::SecureOnly => 'Z',
            UserMode::HostMask => 'x',
        }
    }

    pub fn from_letter(letter: char) -> Option<UserMode> {
        match letter {
            'a' => Some(UserMode::Away),
            'i' => Some(UserMode::Invisible),
            'o' => Some(UserMode::Operator),
            'r' => Some(UserMode::Registered),
            'z' => Some(UserMode::SecureConn),
            'Z' => Some(UserMode::SecureOnly),
            'x' => Some(UserMode::HostMask),
            _ => None,
        }
    }
}

/// Concurrent set of user modes. Read by other connections' handlers
/// (visibility and speech checks), so it guards itself.
#[derive(Debug, Default)]
pub struct UserModeSet {
    inner: Mutex<HashSet<UserMode>>,
}

impl UserModeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, mode: UserMode) -> bool {
        self.inner.lock().unwrap().contains(&mode)
    }

    pub fn set(&self, mode: UserMode) {
        self.inner.lock().unwrap().insert(mode);
    }

    pub fn unset(&self, mode: UserMode) {
        self.inner.lock().unwrap().remove(&mode);
    }
}

impl fmt::Display for UserModeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut letters: Vec<char> = self
            .inner
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.letter())
            .collect();
        letters.sort_unstable();
        write!(f, "+{}", letters.into_iter().collect::<String>())
    }
}

/// A channel-level flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelFlag {
    /// Hidden from non-members entirely.
    Secret,
    /// Visible only to members, operators, and trusted secure clients.
    Private,
    /// Only channel operators may change the topic.
    TopicLock,
}

impl ChannelFlag {
    pub fn letter(self) -> char {
        match self {
            ChannelFlag::Secret => 's',
            ChannelFlag::Private => 'p',
            ChannelFlag::TopicLock => 't',
        }
    }

    pub fn from_letter(letter: char) -> Option<ChannelFlag> {
        match letter {
            's' => Some(ChannelFlag::Secret),
            'p' => Some(ChannelFlag::Private),
            't' => Some(ChannelFlag::TopicLock),
            _ => None,
        }
    }
}

/// A role granted to one member of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberMode {
    /// Channel operator.
    ChannelOperator,
    /// Voice.
    Voice,
}

impl MemberMode {
    pub fn letter(self) -> char {
        match self {
            MemberMode::ChannelOperator => 'o',
            MemberMode::Voice => 'v',
        }
    }

    pub fn from_letter(letter: char) -> Option<MemberMode> {
        match letter {
            'o' => Some(MemberMode::ChannelOperator),
            'v' => Some(MemberMode::Voice),
            _ => None,
        }
    }

    /// NAMES prefix for the highest role a member holds.
    pub fn prefix(self) -> char {
        match self {
            MemberMode::ChannelOperator => '@',
            MemberMode::Voice => '+',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_string_is_sorted() {
        let modes = UserModeSet::new();
        modes.set(UserMode::SecureConn);
        modes.set(UserMode::Operator);
        modes.set(UserMode::Invisible);
        assert_eq!(modes.to_string(), "+ioz");
    }

    #[test]
    fn set_unset_roundtrip() {
        let modes = UserModeSet::new();
        assert!(!modes.has(UserMode::SecureOnly));
        modes.set(UserMode::SecureOnly);
        assert!(modes.has(UserMode::SecureOnly));
        modes.unset(UserMode::SecureOnly);
        assert!(!modes.has(UserMode::SecureOnly));
    }

    #[test]
    fn letters_roundtrip() {
        for mode in [
            UserMode::Away,
            UserMode::Invisible,
            UserMode::Operator,
            UserMode::Registered,
            UserMode::SecureConn,
            UserMode::SecureOnly,
            UserMode::HostMask,
        ] {
            assert_eq!(UserMode::from_letter(mode.letter()), Some(mode));
        }
    }
}

//! IRC wire format: message framing and the numeric replies this server emits.

use std::fmt;

pub const RPL_WELCOME: &str = "001";
pub const RPL_YOURHOST: &str = "002";
pub const RPL_CREATED: &str = "003";
pub const RPL_MYINFO: &str = "004";
pub const RPL_UMODEIS: &str = "221";
pub const RPL_AWAY: &str = "301";
pub const RPL_UNAWAY: &str = "305";
pub const RPL_NOWAWAY: &str = "306";
pub const RPL_WHOISUSER: &str = "311";
pub const RPL_WHOISSERVER: &str = "312";
pub const RPL_WHOWASUSER: &str = "314";
pub const RPL_WHOISIDLE: &str = "317";
pub const RPL_ENDOFWHOIS: &str = "318";
pub const RPL_WHOISCHANNELS: &str = "319";
pub const RPL_LISTSTART: &str = "321";
pub const RPL_LIST: &str = "322";
pub const RPL_LISTEND: &str = "323";
pub const RPL_CHANNELMODEIS: &str = "324";
pub const RPL_NOTOPIC: &str = "331";
pub const RPL_TOPIC: &str = "332";
pub const RPL_NAMREPLY: &str = "353";
pub const RPL_ENDOFNAMES: &str = "366";
pub const RPL_ENDOFWHOWAS: &str = "369";
pub const RPL_MOTD: &str = "372";
pub const RPL_MOTDSTART: &str = "375";
pub const RPL_ENDOFMOTD: &str = "376";
pub const RPL_YOUREOPER: &str = "381";
pub const ERR_NOSUCHNICK: &str = "401";
pub const ERR_NOSUCHCHANNEL: &str = "403";
pub const ERR_CANNOTSENDTOCHAN: &str = "404";
pub const ERR_WASNOSUCHNICK: &str = "406";
pub const ERR_INVALIDCAPCMD: &str = "410";
pub const ERR_UNKNOWNCOMMAND: &str = "421";
pub const ERR_NOMOTD: &str = "422";
pub const ERR_ERRONEUSNICKNAME: &str = "432";
pub const ERR_NICKNAMEINUSE: &str = "433";
pub const ERR_USERNOTINCHANNEL: &str = "441";
pub const ERR_NOTONCHANNEL: &str = "442";
pub const ERR_NEEDMOREPARAMS: &str = "461";
pub const ERR_PASSWDMISMATCH: &str = "464";
pub const ERR_UNKNOWNMODE: &str = "472";
pub const ERR_CHANOPRIVSNEEDED: &str = "482";
pub const ERR_SECUREONLY: &str = "486";
pub const ERR_UMODEUNKNOWNFLAG: &str = "501";
pub const ERR_USERSDONTMATCH: &str = "502";
pub const RPL_LOGGEDIN: &str = "900";
pub const RPL_SASLSUCCESS: &str = "903";
pub const ERR_SASLFAIL: &str = "904";
pub const ERR_SASLABORTED: &str = "906";

/// A single IRC protocol line: optional prefix, command, parameters.
///
/// Rendering follows RFC 1459 framing: the last parameter is sent as a
/// trailing parameter (`:`-prefixed) whenever it contains a space, is
/// empty, itself starts with `:`, or `trailing` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    /// Force the last parameter to render as a trailing parameter.
    /// Message text (PRIVMSG, QUIT, and friends) is always sent this
    /// way, even when it is a single word.
    pub trailing: bool,
}

impl Message {
    /// Build a server-sourced message (numeric replies, PING, NOTICE).
    pub fn from_server(server: &str, command: &str, params: Vec<&str>) -> Message {
        Message {
            prefix: Some(server.to_string()),
            command: command.to_string(),
            params: params.into_iter().map(str::to_string).collect(),
            trailing: false,
        }
    }

    /// Build a client-sourced message (`nick!user@host` prefix).
    pub fn with_prefix(prefix: &str, command: &str, params: Vec<&str>) -> Message {
        Message {
            prefix: Some(prefix.to_string()),
            command: command.to_string(),
            params: params.into_iter().map(str::to_string).collect(),
            trailing: false,
        }
    }

    /// Build a client-sourced message whose last parameter is message
    /// text and always renders as a trailing parameter.
    pub fn with_text(prefix: &str, command: &str, params: Vec<&str>) -> Message {
        Message {
            trailing: true,
            ..Message::with_prefix(prefix, command, params)
        }
    }

    /// Parse one raw line. Returns `None` for lines with no command.
    pub fn parse(line: &str) -> Option<Message> {
        let mut rest = line.trim_end_matches(['\r', '\n']).trim_start();
        if rest.is_empty() {
            return None;
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (pfx, tail) = stripped.split_once(' ')?;
            prefix = Some(pfx.to_string());
            rest = tail.trim_start();
        }

        let mut params = Vec::new();
        let head = match rest.split_once(" :") {
            Some((head, trailing)) => {
                // Trailing param may be empty or contain spaces.
                params.push(trailing.to_string());
                head
            }
            None => rest,
        };

        let mut words = head.split_ascii_whitespace();
        let command = words.next()?.to_ascii_uppercase();
        let middle: Vec<String> = words.map(str::to_string).collect();

        let text = params.pop();
        let trailing = text.is_some();
        params = middle;
        if let Some(t) = text {
            params.push(t);
        }

        Some(Message {
            prefix,
            command,
            params,
            trailing,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{prefix} ")?;
        }
        write!(f, "{}", self.command)?;
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            if i == last
                && (self.trailing
                    || param.is_empty()
                    || param.contains(' ')
                    || param.starts_with(':'))
            {
                write!(f, " :{param}")?;
            } else {
                write!(f, " {param}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_command() {
        let msg = Message::parse("NICK alice\r\n").unwrap();
        assert_eq!(msg.command, "NICK");
        assert_eq!(msg.params, vec!["alice"]);
        assert!(msg.prefix.is_none());
    }

    #[test]
    fn parses_trailing_param() {
        let msg = Message::parse("PRIVMSG #x :hello there world").unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#x", "hello there world"]);
    }

    #[test]
    fn parses_prefix() {
        let msg = Message::parse(":irc.test 001 alice :Welcome").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("irc.test"));
        assert_eq!(msg.command, "001");
    }

    #[test]
    fn parses_empty_trailing() {
        let msg = Message::parse("AWAY :").unwrap();
        assert_eq!(msg.params, vec![""]);
    }

    #[test]
    fn command_is_uppercased() {
        let msg = Message::parse("privmsg bob :hi").unwrap();
        assert_eq!(msg.command, "PRIVMSG");
    }

    #[test]
    fn empty_line_is_none() {
        assert!(Message::parse("\r\n").is_none());
        assert!(Message::parse("   ").is_none());
    }

    #[test]
    fn display_adds_trailing_colon() {
        let msg = Message::from_server("irc.test", "NOTICE", vec!["*", "two words"]);
        assert_eq!(msg.to_string(), ":irc.test NOTICE * :two words");
    }

    #[test]
    fn display_skips_colon_for_single_word() {
        let msg = Message::with_prefix("a!u@h", "JOIN", vec!["#x"]);
        assert_eq!(msg.to_string(), ":a!u@h JOIN #x");
    }

    #[test]
    fn with_text_always_renders_trailing() {
        let msg = Message::with_text("a!u@h", "PRIVMSG", vec!["bob", "hello"]);
        assert_eq!(msg.to_string(), ":a!u@h PRIVMSG bob :hello");
    }

    #[test]
    fn parse_preserves_explicit_trailing() {
        let msg = Message::parse("PRIVMSG bob :hi").unwrap();
        assert!(msg.trailing);
        assert_eq!(msg.to_string(), "PRIVMSG bob :hi");
    }

    #[test]
    fn roundtrip() {
        let original = ":alice!u@cloak QUIT :gone fishing";
        let msg = Message::parse(original).unwrap();
        assert_eq!(msg.to_string(), original);
    }
}

//! Typed commands and the rules for when each may be routed.
//!
//! Parsing is two-stage: [`crate::irc::Message`] handles wire framing,
//! this module maps a framed message onto a [`Command`]. Commands the
//! server does not know become [`Command::Unknown`] so the dispatch gate
//! can apply the registration-state policy instead of the parser.

use crate::irc::Message;

/// A parse failure. Neither variant terminates the connection.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unable to parse command")]
    Malformed,
    #[error("{command} needs more parameters")]
    NeedMoreParams { command: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pass {
        password: String,
    },
    Nick {
        nick: String,
    },
    User {
        username: String,
        realname: String,
    },
    Cap {
        subcommand: String,
        args: Vec<String>,
    },
    Authenticate {
        payload: String,
    },
    Ping {
        token: String,
    },
    Pong {
        token: String,
    },
    Join {
        channels: Vec<String>,
    },
    Part {
        channels: Vec<String>,
        message: Option<String>,
    },
    PrivMsg {
        target: String,
        text: String,
    },
    Notice {
        target: String,
        text: String,
    },
    Mode {
        target: String,
        modes: Option<String>,
        arg: Option<String>,
    },
    Topic {
        channel: String,
        topic: Option<String>,
    },
    List,
    Names {
        channel: String,
    },
    Whois {
        nick: String,
    },
    WhoWas {
        nick: String,
    },
    Away {
        message: Option<String>,
    },
    Motd,
    Oper {
        name: String,
        password: String,
    },
    Quit {
        message: Option<String>,
    },
    Unknown {
        command: String,
    },
}

fn need(command: &str) -> ParseError {
    ParseError::NeedMoreParams {
        command: command.to_string(),
    }
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, ParseError> {
        let msg = Message::parse(line).ok_or(ParseError::Malformed)?;
        let p = &msg.params;

        let cmd = match msg.command.as_str() {
            "PASS" => Command::Pass {
                password: p.first().ok_or_else(|| need("PASS"))?.clone(),
            },
            "NICK" => Command::Nick {
                nick: p.first().ok_or_else(|| need("NICK"))?.clone(),
            },
            "USER" => {
                if p.len() < 4 {
                    return Err(need("USER"));
                }
                Command::User {
                    username: p[0].clone(),
                    realname: p[3].clone(),
                }
            }
            "CAP" => Command::Cap {
                subcommand: p.first().ok_or_else(|| need("CAP"))?.to_ascii_uppercase(),
                args: p.iter().skip(1).cloned().collect(),
            },
            "AUTHENTICATE" => Command::Authenticate {
                payload: p.first().ok_or_else(|| need("AUTHENTICATE"))?.clone(),
            },
            "PING" => Command::Ping {
                token: p.first().cloned().unwrap_or_default(),
            },
            "PONG" => Command::Pong {
                token: p.first().cloned().unwrap_or_default(),
            },
            "JOIN" => Command::Join {
                channels: p
                    .first()
                    .ok_or_else(|| need("JOIN"))?
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            },
            "PART" => Command::Part {
                channels: p
                    .first()
                    .ok_or_else(|| need("PART"))?
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
                message: p.get(1).cloned(),
            },
            "PRIVMSG" => {
                if p.len() < 2 {
                    return Err(need("PRIVMSG"));
                }
                Command::PrivMsg {
                    target: p[0].clone(),
                    text: p[1].clone(),
                }
            }
            "NOTICE" => {
                if p.len() < 2 {
                    return Err(need("NOTICE"));
                }
                Command::Notice {
                    target: p[0].clone(),
                    text: p[1].clone(),
                }
            }
            "MODE" => Command::Mode {
                target: p.first().ok_or_else(|| need("MODE"))?.clone(),
                modes: p.get(1).cloned(),
                arg: p.get(2).cloned(),
            },
            "TOPIC" => Command::Topic {
                channel: p.first().ok_or_else(|| need("TOPIC"))?.clone(),
                topic: p.get(1).cloned(),
            },
            "LIST" => Command::List,
            "NAMES" => Command::Names {
                channel: p.first().ok_or_else(|| need("NAMES"))?.clone(),
            },
            "WHOIS" => Command::Whois {
                nick: p.first().ok_or_else(|| need("WHOIS"))?.clone(),
            },
            "WHOWAS" => Command::WhoWas {
                nick: p.first().ok_or_else(|| need("WHOWAS"))?.clone(),
            },
            "AWAY" => Command::Away {
                message: p.first().filter(|m| !m.is_empty()).cloned(),
            },
            "MOTD" => Command::Motd,
            "OPER" => {
                if p.len() < 2 {
                    return Err(need("OPER"));
                }
                Command::Oper {
                    name: p[0].clone(),
                    password: p[1].clone(),
                }
            }
            "QUIT" => Command::Quit {
                message: p.first().cloned(),
            },
            other => Command::Unknown {
                command: other.to_string(),
            },
        };
        Ok(cmd)
    }

    /// Wire name of the command, for error replies and metrics labels.
    pub fn code(&self) -> &str {
        match self {
            Command::Pass { .. } => "PASS",
            Command::Nick { .. } => "NICK",
            Command::User { .. } => "USER",
            Command::Cap { .. } => "CAP",
            Command::Authenticate { .. } => "AUTHENTICATE",
            Command::Ping { .. } => "PING",
            Command::Pong { .. } => "PONG",
            Command::Join { .. } => "JOIN",
            Command::Part { .. } => "PART",
            Command::PrivMsg { .. } => "PRIVMSG",
            Command::Notice { .. } => "NOTICE",
            Command::Mode { .. } => "MODE",
            Command::Topic { .. } => "TOPIC",
            Command::List => "LIST",
            Command::Names { .. } => "NAMES",
            Command::Whois { .. } => "WHOIS",
            Command::WhoWas { .. } => "WHOWAS",
            Command::Away { .. } => "AWAY",
            Command::Motd => "MOTD",
            Command::Oper { .. } => "OPER",
            Command::Quit { .. } => "QUIT",
            Command::Unknown { command } => command,
        }
    }

    /// May this command be routed before the registration handshake
    /// completes?
    pub fn usable_pre_registration(&self) -> bool {
        matches!(
            self,
            Command::Pass { .. }
                | Command::Nick { .. }
                | Command::User { .. }
                | Command::Cap { .. }
                | Command::Authenticate { .. }
                | Command::Quit { .. }
        )
    }

    /// May this command be routed after registration?
    pub fn usable_post_registration(&self) -> bool {
        !matches!(
            self,
            Command::Pass { .. }
                | Command::User { .. }
                | Command::Cap { .. }
                | Command::Authenticate { .. }
                | Command::Unknown { .. }
        )
    }

    /// Does handling this command involve a password digest comparison?
    /// Such comparisons run on the blocking pool, awaited by the issuing
    /// connection's reader only.
    pub fn requires_credential_check(&self) -> bool {
        matches!(self, Command::Pass { .. } | Command::Oper { .. })
    }
}

//! Minimal IRC line protocol.
//!
//! Parses inbound server lines into [`Message`] and serializes the handful
//! of commands the bot emits. Only the message shape the bot consumes is
//! modeled: optional tags are skipped, the prefix keeps its nick/user/host
//! split, and a trailing parameter folds into the last entry of `params`.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Protocol parse errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
}

/// Sender prefix: `nick!user@host`, or a bare server name in `nick`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    pub nick: String,
    pub user: String,
    pub host: String,
}

impl Prefix {
    fn parse(raw: &str) -> Prefix {
        let (nick, rest) = match raw.split_once('!') {
            Some((nick, rest)) => (nick, rest),
            None => (raw, ""),
        };
        let (user, host) = match rest.split_once('@') {
            Some((user, host)) => (user, host),
            None => (rest, ""),
        };
        Prefix {
            nick: nick.to_string(),
            user: user.to_string(),
            host: host.to_string(),
        }
    }
}

/// One IRC protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<Prefix>,
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    fn new(command: &str, params: Vec<String>) -> Message {
        Message {
            prefix: None,
            command: command.to_string(),
            params,
        }
    }

    pub fn nick(nick: &str) -> Message {
        Message::new("NICK", vec![nick.to_string()])
    }

    pub fn user(username: &str) -> Message {
        Message::new(
            "USER",
            vec![
                username.to_string(),
                "0".to_string(),
                "*".to_string(),
                username.to_string(),
            ],
        )
    }

    pub fn join(channel: &str) -> Message {
        Message::new("JOIN", vec![channel.to_string()])
    }

    pub fn privmsg(target: &str, text: &str) -> Message {
        Message::new("PRIVMSG", vec![target.to_string(), sanitize(text)])
    }

    pub fn pong(payload: &str) -> Message {
        Message::new("PONG", vec![payload.to_string()])
    }

    pub fn quit(reason: &str) -> Message {
        Message::new("QUIT", vec![reason.to_string()])
    }
}

/// Line breaks inside outbound text would be interpreted as new protocol
/// commands; flatten them.
fn sanitize(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Message, ProtocolError> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        // message tags are never negotiated; skip them if a server sends any
        if rest.starts_with('@') {
            rest = match rest.split_once(' ') {
                Some((_, tail)) => tail,
                None => return Err(ProtocolError::Empty),
            };
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (raw, tail) = stripped.split_once(' ').ok_or(ProtocolError::Empty)?;
            prefix = Some(Prefix::parse(raw));
            rest = tail;
        }

        let mut params = Vec::new();
        let command;
        match rest.split_once(' ') {
            None => {
                if rest.is_empty() {
                    return Err(ProtocolError::Empty);
                }
                command = rest.to_string();
            }
            Some((cmd, mut tail)) => {
                command = cmd.to_string();
                loop {
                    tail = tail.trim_start_matches(' ');
                    if tail.is_empty() {
                        break;
                    }
                    if let Some(trailing) = tail.strip_prefix(':') {
                        params.push(trailing.to_string());
                        break;
                    }
                    match tail.split_once(' ') {
                        Some((param, next)) => {
                            params.push(param.to_string());
                            tail = next;
                        }
                        None => {
                            params.push(tail.to_string());
                            break;
                        }
                    }
                }
            }
        }

        if command.is_empty() {
            return Err(ProtocolError::Empty);
        }

        Ok(Message {
            prefix,
            command,
            params,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            if i == last && (param.is_empty() || param.contains(' ') || param.starts_with(':')) {
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
    fn parses_a_privmsg_with_prefix_and_trailing() {
        let msg: Message = ":alice!ada@host.example PRIVMSG #room :hello there"
            .parse()
            .unwrap();
        let prefix = msg.prefix.unwrap();
        assert_eq!(prefix.nick, "alice");
        assert_eq!(prefix.user, "ada");
        assert_eq!(prefix.host, "host.example");
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#room", "hello there"]);
    }

    #[test]
    fn parses_a_server_prefix() {
        let msg: Message = ":irc.example.net 001 slircb :Welcome".parse().unwrap();
        let prefix = msg.prefix.unwrap();
        assert_eq!(prefix.nick, "irc.example.net");
        assert_eq!(prefix.user, "");
        assert_eq!(prefix.host, "");
        assert_eq!(msg.command, "001");
    }

    #[test]
    fn parses_ping_without_prefix() {
        let msg: Message = "PING :token\r\n".parse().unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["token"]);
    }

    #[test]
    fn skips_message_tags() {
        let msg: Message = "@time=2024-01-01T00:00:00Z :a!b@c NOTICE target :hi"
            .parse()
            .unwrap();
        assert_eq!(msg.command, "NOTICE");
        assert_eq!(msg.params, vec!["target", "hi"]);
    }

    #[test]
    fn rejects_empty_lines() {
        assert_eq!("".parse::<Message>(), Err(ProtocolError::Empty));
        assert_eq!(":prefixonly".parse::<Message>(), Err(ProtocolError::Empty));
    }

    #[test]
    fn serializes_with_trailing_colon_when_needed() {
        assert_eq!(
            Message::privmsg("#room", "hello there").to_string(),
            "PRIVMSG #room :hello there"
        );
        assert_eq!(Message::privmsg("#room", "hi").to_string(), "PRIVMSG #room hi");
        assert_eq!(Message::join("#room").to_string(), "JOIN #room");
        assert_eq!(
            Message::user("slircb").to_string(),
            "USER slircb 0 * slircb"
        );
        assert_eq!(Message::pong("tok en").to_string(), "PONG :tok en");
    }

    #[test]
    fn outbound_text_cannot_inject_lines() {
        let msg = Message::privmsg("#room", "a\r\nQUIT");
        assert_eq!(msg.to_string(), "PRIVMSG #room :a  QUIT");
    }
}

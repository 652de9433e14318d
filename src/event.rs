//! Inbound chat events.

/// Which protocol command delivered the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Privmsg,
    Notice,
}

/// Immutable record of one inbound chat message.
#[derive(Debug, Clone)]
pub struct Event {
    /// Delivery target of the original message: a channel name, or the
    /// bot's own nick for direct messages.
    pub target: String,
    /// Sender's display name.
    pub nick: String,
    /// Sender's protocol-level user string.
    pub user: String,
    /// Sender's protocol-level host string.
    pub host: String,
    /// Message payload.
    pub message: String,
    pub kind: EventKind,
}

impl Event {
    /// Where bot output for this event goes: back to the channel when the
    /// target looks like one, otherwise directly to the sender.
    pub fn reply_target(&self) -> &str {
        if self.target.starts_with('#') {
            &self.target
        } else {
            &self.nick
        }
    }
}

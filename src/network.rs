//! IRC client transport.
//!
//! One TCP connection, split into a reader task and a writer task:
//!
//! ```text
//!    ┌─────────────┐  events   ┌───────────────┐  outbound  ┌─────────────┐
//!    │ Reader Task │──────────▶│ Dispatch Loop │───────────▶│ Writer Task │
//!    │ (parse)     │  channel  │ (handlers)    │  channel   │ (serialize) │
//!    └─────────────┘           └───────────────┘            └─────────────┘
//! ```
//!
//! The reader owns protocol plumbing (PONG replies, the post-welcome JOIN)
//! and turns PRIVMSG/NOTICE lines into [`Event`]s. The writer drains the
//! outbound queue, so sending is always a non-blocking enqueue for callers.

use crate::config::Config;
use crate::event::{Event, EventKind};
use crate::proto::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outbound commands accepted by the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Privmsg { target: String, text: String },
    Join(String),
    Pong(String),
    Quit,
}

/// Non-blocking sender for outbound commands.
pub type OutboundSender = mpsc::UnboundedSender<Outbound>;

/// A live connection to the IRC network.
pub struct Connection {
    verbose: Arc<AtomicBool>,
}

impl Connection {
    /// Connect, register, and spawn the reader/writer tasks.
    ///
    /// Inbound PRIVMSG/NOTICE events are delivered on `events`; everything
    /// enqueued on the paired outbound channel is written to the socket in
    /// order.
    pub async fn connect(
        config: &Config,
        events: std::sync::mpsc::Sender<Event>,
        outbound_tx: OutboundSender,
        outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    ) -> anyhow::Result<Connection> {
        let stream = TcpStream::connect(&config.network).await?;
        info!(network = %config.network, "connected");

        let (read_half, mut write_half) = stream.into_split();
        let verbose = Arc::new(AtomicBool::new(false));

        // register before anything else goes out
        write_line(&mut write_half, &Message::nick(&config.nick).to_string()).await?;
        write_line(&mut write_half, &Message::user(&config.username).to_string()).await?;

        tokio::spawn(reader_task(
            BufReader::new(read_half),
            events,
            outbound_tx,
            config.channel.clone(),
            Arc::clone(&verbose),
        ));
        tokio::spawn(writer_task(write_half, outbound_rx, Arc::clone(&verbose)));

        Ok(Connection { verbose })
    }

    /// Whether raw protocol lines are logged at `info` level.
    pub fn debug_enabled(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    pub fn set_debug(&self, enabled: bool) {
        self.verbose.store(enabled, Ordering::Relaxed);
    }
}

async fn reader_task(
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    events: std::sync::mpsc::Sender<Event>,
    outbound: OutboundSender,
    channel: String,
    verbose: Arc<AtomicBool>,
) {
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "read error");
                break;
            }
        };
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if verbose.load(Ordering::Relaxed) {
            info!(raw = %line, "<<");
        } else {
            debug!(raw = %line, "<<");
        }

        let msg = match line.parse::<Message>() {
            Ok(msg) => msg,
            Err(err) => {
                warn!(raw = %line, error = %err, "unparseable line");
                continue;
            }
        };

        match msg.command.as_str() {
            "PING" => {
                let payload = msg.params.first().cloned().unwrap_or_default();
                let _ = outbound.send(Outbound::Pong(payload));
            }
            "001" => {
                info!(channel = %channel, "registered; joining channel");
                let _ = outbound.send(Outbound::Join(channel.clone()));
            }
            "PRIVMSG" | "NOTICE" => {
                let kind = if msg.command == "PRIVMSG" {
                    EventKind::Privmsg
                } else {
                    EventKind::Notice
                };
                if let Some(event) = chat_event(&msg, kind) {
                    if events.send(event).is_err() {
                        // dispatch loop is gone; nothing left to deliver to
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    info!("connection closed");
}

async fn writer_task(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    verbose: Arc<AtomicBool>,
) {
    while let Some(command) = outbound.recv().await {
        let quitting = command == Outbound::Quit;
        let msg = match command {
            Outbound::Privmsg { target, text } => Message::privmsg(&target, &text),
            Outbound::Join(channel) => Message::join(&channel),
            Outbound::Pong(payload) => Message::pong(&payload),
            Outbound::Quit => Message::quit("Exiting"),
        };
        let line = msg.to_string();
        if verbose.load(Ordering::Relaxed) {
            info!(raw = %line, ">>");
        } else {
            debug!(raw = %line, ">>");
        }
        if let Err(err) = write_line(&mut writer, &line).await {
            warn!(error = %err, "write error");
            break;
        }
        if quitting {
            break;
        }
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

/// Build an [`Event`] from a PRIVMSG/NOTICE line. Lines without a sender
/// prefix or a target are server noise and yield `None`.
fn chat_event(msg: &Message, kind: EventKind) -> Option<Event> {
    let prefix = msg.prefix.as_ref()?;
    let target = msg.params.first()?;
    Some(Event {
        target: target.clone(),
        nick: prefix.nick.clone(),
        user: prefix.user.clone(),
        host: prefix.host.clone(),
        message: msg.params.get(1).cloned().unwrap_or_default(),
        kind,
    })
}

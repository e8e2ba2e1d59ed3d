use crate::{
    protocol,
    registry::{Sink, UserRegistry},
};

/// How one inbound chat line should be handled.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    /// Private message for one named recipient.
    Whisper { target: &'a str, text: &'a str },
    /// A `/whisper` line missing its target or message.
    MalformedWhisper,
    /// Query for the currently connected usernames.
    ListUsers,
    /// Plain chat, broadcast to everyone.
    Chat(&'a str),
}

impl<'a> Command<'a> {
    pub fn classify(line: &'a str) -> Self {
        if line.starts_with(protocol::WHISPER_PREFIX) {
            let mut parts = line.splitn(3, ' ');
            let _command = parts.next();
            match (parts.next(), parts.next()) {
                (Some(target), Some(text)) if !target.is_empty() => {
                    Command::Whisper { target, text }
                }
                _ => Command::MalformedWhisper,
            }
        } else if line.starts_with(protocol::USERS_PREFIX) {
            Command::ListUsers
        } else {
            Command::Chat(line)
        }
    }
}

/// Applies one line from `sender` against the registry: replies go to
/// `sender_sink`, whispers to their target, chat to everyone.
pub async fn dispatch(registry: &UserRegistry, sender: &str, sender_sink: &Sink, line: &str) {
    match Command::classify(line) {
        Command::Whisper { target, text } => {
            whisper(registry, sender, sender_sink, target, text).await;
        }
        Command::MalformedWhisper => reply(sender_sink, protocol::WHISPER_USAGE),
        Command::ListUsers => {
            let names = registry.snapshot_names().await;
            reply(sender_sink, &protocol::user_listing(&names));
        }
        Command::Chat(text) => {
            registry.broadcast(&protocol::chat_line(sender, text)).await;
        }
    }
}

async fn whisper(
    registry: &UserRegistry,
    sender: &str,
    sender_sink: &Sink,
    target: &str,
    text: &str,
) {
    if target.eq_ignore_ascii_case(sender) {
        reply(sender_sink, protocol::SELF_WHISPER);
        return;
    }
    match registry.lookup(target).await {
        Some(target_sink) => {
            reply(&target_sink, &protocol::whisper_delivery(sender, text));
            reply(sender_sink, &protocol::whisper_receipt(target, text));
        }
        None => reply(sender_sink, &protocol::unknown_user(target)),
    }
}

// Delivery to a session that is tearing down is best-effort.
fn reply(sink: &Sink, line: &str) {
    let _ = sink.send(line.to_string());
}

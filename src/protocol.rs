use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub const SUBMITNAME: &str = "SUBMITNAME";
pub const NAMEACCEPTED: &str = "NAMEACCEPTED";
pub const NAMETAKEN: &str = "NAMETAKEN";
pub const INVALIDNAME: &str = "INVALIDNAME";

pub const WHISPER_PREFIX: &str = "/whisper";
pub const USERS_PREFIX: &str = "/users";

pub const WHISPER_USAGE: &str = "SERVER: Invalid Command. Use: '/whisper <user> <message>'";
pub const SELF_WHISPER: &str = "SERVER: You cant send a message to yourself.";
pub const SHUTDOWN_NOTICE: &str = "SERVER: Server is shutting down.";

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Reads one line, stripped of its terminator. `None` signals end of stream.
pub async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let bytes = reader.read_line(&mut line).await?;
    if bytes == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(LINE_ENDINGS).to_string()))
}

/// Writes one newline-terminated line and flushes so peers get timely updates.
pub async fn send_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// A candidate username must carry visible characters and must not be
/// mistakable for a command.
pub fn is_valid_name(candidate: &str) -> bool {
    if candidate.trim().is_empty() {
        return false;
    }
    let lowered = candidate.to_ascii_lowercase();
    !lowered.starts_with(WHISPER_PREFIX) && !lowered.starts_with(USERS_PREFIX)
}

pub fn join_notice(username: &str) -> String {
    format!("SERVER: {username} has joined the chat.")
}

pub fn leave_notice(username: &str) -> String {
    format!("SERVER: {username} has left the chat.")
}

pub fn chat_line(username: &str, text: &str) -> String {
    format!("{username}: {text}")
}

pub fn whisper_delivery(sender: &str, text: &str) -> String {
    format!("[Whisper from: {sender} ]: {text}")
}

pub fn whisper_receipt(target: &str, text: &str) -> String {
    format!("[Whisper to {target}]: {text}")
}

pub fn unknown_user(target: &str) -> String {
    format!("SERVER: Specified user '{target}' was not found.")
}

pub fn user_listing(names: &[String]) -> String {
    format!("SERVER: Active users ({}): {}", names.len(), names.join(", "))
}

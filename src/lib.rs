//! Line-oriented TCP chat relay.
//!
//! A server accepts many concurrent connections, assigns each a unique
//! username through a `SUBMITNAME` handshake, and relays newline-delimited
//! messages among all connected sessions: public broadcast, private
//! whispers, and a user-listing query. Each module focuses on a concrete
//! responsibility:
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`server`] accepts TCP connections and drives one session state
//!   machine per connection, from handshake through chat to cleanup.
//! - [`registry`] owns the shared username-to-sink map that sessions
//!   coordinate through.
//! - [`commands`] classifies inbound lines and routes whispers, listing
//!   queries, and public chat.
//! - [`protocol`] defines the wire vocabulary, message shapes, and line
//!   framing helpers.
//! - [`client`] connects to a server, multiplexing stdin and server
//!   messages for a terminal user.
//!
//! Integration and end-to-end tests exercise the crate over real TCP
//! connections and through the compiled binary.

pub mod cli;
pub mod client;
pub mod commands;
pub mod protocol;
pub mod registry;
pub mod server;

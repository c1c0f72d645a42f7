//! Core primitives shared by the `beach-pier` relay server and its clients.
//!
//! Nothing in here touches a socket: identities, the canonical key that joins
//! two identities into one conversation, history records, command parsing and
//! the text of every server reply live here so the server and the test
//! harnesses agree on a single source of truth.

pub mod command;
pub mod history;
pub mod identity;
pub mod reply;

pub use command::{Command, Line};
pub use history::HistoryRecord;
pub use identity::{Identity, IdentityParseError, PairKey};

/// Prefix stamped on every line the server originates (as opposed to relayed
/// payloads, which carry the sender's name instead).
pub const SERVER_PREFIX: &str = "[SERVER] ";

/// Default maximum length of one framed line, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8192;

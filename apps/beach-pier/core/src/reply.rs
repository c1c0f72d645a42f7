//! Text of every line the server sends.
//!
//! Helpers return the message body; [`server`] stamps the `[SERVER] ` prefix.
//! Multi-line bodies are separated with `\n` and arrive as consecutive lines.

use crate::{HistoryRecord, Identity, SERVER_PREFIX};

pub const NO_TARGET: &str = "No target selected. Select with /target <target_uuid>";
pub const CANNOT_TARGET_SELF: &str = "Error: cannot target self";
pub const TARGET_NOT_FOUND: &str = "Error: target not found. To see connected clients, try /list";
pub const TARGET_EXITED: &str = "Error: target exited";
pub const USERNAME_USAGE: &str = "Usage: /username <name>";
pub const GOODBYE: &str = "Goodbye";
pub const SHUTTING_DOWN: &str = "Server is shutting down. Send /exit to disconnect.";
pub const UNNAMED: &str = "<unnamed>";

pub const HELP: &str = "Server Help:
    /help       - Display this help message.
    /username   - Set your username. Usage: /username <your_name>
    /list       - List all active client IDs.
    /history    - View your message history with current target.
    /target     - Set your message target. Usage: /target <target_uuid>
    /exit       - Exit the client.";

/// Prefixes a body with the server marker.
pub fn server(body: impl AsRef<str>) -> String {
    format!("{SERVER_PREFIX}{}", body.as_ref())
}

pub fn your_identity(identity: Identity) -> String {
    format!("Your UUID is {identity}")
}

/// Recovers the identity from a [`your_identity`] line, with or without the
/// server prefix.
pub fn parse_identity_line(line: &str) -> Option<Identity> {
    let body = line.strip_prefix(SERVER_PREFIX).unwrap_or(line);
    body.strip_prefix("Your UUID is ")?.parse().ok()
}

pub fn hello(name: &str) -> String {
    format!("Hello {name}")
}

pub fn connected_to(target: Identity) -> String {
    format!("Connected to {target}")
}

pub fn current_target(target: Identity) -> String {
    format!("Current target: {target}")
}

pub fn invalid_target(raw: &str) -> String {
    format!("Error: invalid target id {raw}. To see connected clients, try /list")
}

pub fn sending_to(target: Identity) -> String {
    format!("Sending message to {target}")
}

pub fn unrecognized(text: &str) -> String {
    format!("Unrecognized command {text}")
}

/// Line delivered to a target when a peer relays a payload.
pub fn relayed(sender: &str, text: &str) -> String {
    format!("{sender}: {text}")
}

pub fn exited(identity: Identity, name: Option<&str>) -> String {
    format!("{identity} ({}) has exited", name.unwrap_or(UNNAMED))
}

pub fn client_list(own: Identity, entries: &[(Identity, Option<String>)]) -> String {
    let mut body = String::from("Active Clients:");
    for (identity, name) in entries {
        body.push_str("\n    ");
        body.push_str(&identity.to_string());
        body.push(' ');
        body.push_str(name.as_deref().unwrap_or(UNNAMED));
        if *identity == own {
            body.push_str(" (self)");
        }
    }
    body
}

pub fn history(target: Option<Identity>, records: &[HistoryRecord]) -> String {
    let label = target.map_or_else(|| "none".to_owned(), |id| id.to_string());
    let mut body = format!("History with {label}:");
    if records.is_empty() {
        body.push_str("\n    (no messages)");
    }
    for record in records {
        body.push_str("\n    ");
        body.push_str(&record.render());
    }
    body
}

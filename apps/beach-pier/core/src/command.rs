//! Classification of inbound lines into commands and payload.
//!
//! Parsing is pure: it never consults session state. The session handler
//! decides what each [`Command`] means for its current target and name.

pub const CMD_USERNAME: &str = "/username";
pub const CMD_LIST: &str = "/list";
pub const CMD_TARGET: &str = "/target";
pub const CMD_HISTORY: &str = "/history";
pub const CMD_HELP: &str = "/help";
pub const CMD_EXIT: &str = "/exit";

/// A `/`-prefixed line resolved to the command it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/username <name>`; `None` when the argument is missing.
    Username(Option<String>),
    List,
    /// `/target <id>` sets, bare `/target` queries.
    Target(Option<String>),
    History,
    Help,
    Exit,
    /// Anything else starting with `/`, kept verbatim for the error reply.
    Unknown(String),
}

impl Command {
    /// Short label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Command::Username(_) => "username",
            Command::List => "list",
            Command::Target(_) => "target",
            Command::History => "history",
            Command::Help => "help",
            Command::Exit => "exit",
            Command::Unknown(_) => "unknown",
        }
    }
}

/// One framed inbound line after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Empty or whitespace-only input.
    Blank,
    Command(Command),
    /// Text to relay to the current target.
    Payload(String),
}

impl Line {
    pub fn parse(raw: &str) -> Line {
        let text = raw.trim_end_matches(['\r', '\n']);
        if text.trim().is_empty() {
            return Line::Blank;
        }
        if !text.starts_with('/') {
            return Line::Payload(text.to_owned());
        }
        Line::Command(parse_command(text.trim()))
    }
}

fn parse_command(text: &str) -> Command {
    let (token, argument) = match text.split_once(char::is_whitespace) {
        Some((token, rest)) => (token, non_empty(rest)),
        None => (text, None),
    };

    match token {
        CMD_USERNAME => Command::Username(argument),
        CMD_LIST => Command::List,
        CMD_TARGET => Command::Target(argument),
        CMD_HISTORY => Command::History,
        CMD_HELP => Command::Help,
        CMD_EXIT => Command::Exit,
        _ => Command::Unknown(text.to_owned()),
    }
}

fn non_empty(rest: &str) -> Option<String> {
    let trimmed = rest.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

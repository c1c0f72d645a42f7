use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// One relayed message as remembered in a conversation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub timestamp: OffsetDateTime,
    pub sender: String,
    pub text: String,
}

impl HistoryRecord {
    /// Builds a record stamped with the current UTC time.
    pub fn now(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            sender: sender.into(),
            text: text.into(),
        }
    }

    /// Renders the record the way `/history` shows it:
    /// `[2024-01-01T00:00:00Z] Alice: hi`.
    pub fn render(&self) -> String {
        let stamp = self
            .timestamp
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.timestamp.unix_timestamp().to_string());
        format!("[{stamp}] {}: {}", self.sender, self.text)
    }
}

//! Database row types. These map directly to SQLite rows and stay
//! stringly-typed; conversion into `murmur-types` happens at the edge.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use murmur_types::models::{Message, Role, User};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub password: String,
    pub role: String,
    pub created_at: String,
}

impl UserRow {
    pub fn role(&self) -> Result<Role> {
        self.role
            .parse()
            .map_err(|e: String| anyhow::anyhow!("User {}: {}", self.id, e))
    }

    pub fn into_user(self) -> Result<User> {
        let role = self.role()?;
        Ok(User {
            id: self.id.parse().with_context(|| format!("Corrupt user id '{}'", self.id))?,
            username: self.username,
            display_name: self.display_name,
            role,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub audio_key: Option<String>,
    pub created_at: String,
    pub responded: bool,
    pub response_audio_key: Option<String>,
    pub response_text: Option<String>,
    pub responded_at: Option<String>,
    pub responded_by: Option<String>,
}

impl MessageRow {
    /// Blob keys this row currently holds, original recording first.
    pub fn blob_keys(&self) -> Vec<&str> {
        self.audio_key
            .iter()
            .chain(self.response_audio_key.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn into_message(self) -> Result<Message> {
        Ok(Message {
            id: self.id.parse().with_context(|| format!("Corrupt message id '{}'", self.id))?,
            user_id: self
                .user_id
                .parse()
                .with_context(|| format!("Corrupt user_id '{}' on message '{}'", self.user_id, self.id))?,
            created_at: parse_timestamp(&self.created_at)?,
            responded_at: self.responded_at.as_deref().map(parse_timestamp).transpose()?,
            username: self.username,
            audio_key: self.audio_key,
            responded: self.responded,
            response_audio_key: self.response_audio_key,
            response_text: self.response_text,
            responded_by: self.responded_by,
        })
    }
}

/// Input for a new message row.
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub username: &'a str,
    pub audio_key: &'a str,
}

/// The one response a moderator may attach to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseContent {
    Audio(String),
    Text(String),
}

impl ResponseContent {
    pub fn audio_key(&self) -> Option<&str> {
        match self {
            Self::Audio(key) => Some(key),
            Self::Text(_) => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Audio(_) => None,
            Self::Text(text) => Some(text),
        }
    }
}

/// Result of a conditional response write.
#[derive(Debug)]
pub enum ResponseWrite {
    /// The row moved to responded. `released_audio_key` is the original
    /// recording that the row no longer references.
    Applied {
        message: MessageRow,
        released_audio_key: Option<String>,
    },
    NotFound,
    AlreadyResponded,
}

/// Timestamps are stored as fixed-width RFC 3339 (microseconds, `Z`) so that
/// lexical order in SQLite matches chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone; treat it as UTC.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("Corrupt timestamp '{}'", raw))
}

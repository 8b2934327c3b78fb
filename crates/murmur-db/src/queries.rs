use std::collections::HashSet;

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::Database;
use crate::models::{
    MessageRow, NewMessage, ResponseContent, ResponseWrite, UserRow, format_timestamp,
};

const MESSAGE_COLUMNS: &str = "id, user_id, username, audio_key, created_at, responded,
     response_audio_key, response_text, responded_at, responded_by";

impl Database {
    // -- Users --

    /// Insert a user unless the handle is taken. Returns false on a duplicate.
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        display_name: Option<&str>,
        password_hash: &str,
        role: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, display_name, password, role)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(username) DO NOTHING",
                params![id, username, display_name, password_hash, role],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Messages --

    pub fn insert_message(&self, new: &NewMessage<'_>) -> Result<MessageRow> {
        let created_at = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, user_id, username, audio_key, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![new.id, new.user_id, new.username, new.audio_key, created_at],
            )?;
            Ok(MessageRow {
                id: new.id.to_string(),
                user_id: new.user_id.to_string(),
                username: new.username.to_string(),
                audio_key: Some(new.audio_key.to_string()),
                created_at,
                responded: false,
                response_audio_key: None,
                response_text: None,
                responded_at: None,
                responded_by: None,
            })
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Messages owned by one user, newest first.
    pub fn list_messages_for_user(&self, user_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every message, newest first.
    pub fn list_all_messages(&self) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Record a moderator's response and drop the original recording
    /// reference in one transaction. Only an unresponded row is updated.
    pub fn update_for_response(
        &self,
        id: &str,
        content: &ResponseContent,
        moderator_name: &str,
    ) -> Result<ResponseWrite> {
        let responded_at = format_timestamp(Utc::now());
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let current: Option<(Option<String>, bool)> = tx
                .query_row(
                    "SELECT audio_key, responded FROM messages WHERE id = ?1",
                    [id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let released_audio_key = match current {
                None => return Ok(ResponseWrite::NotFound),
                Some((_, true)) => return Ok(ResponseWrite::AlreadyResponded),
                Some((audio_key, false)) => audio_key,
            };

            let updated = tx.execute(
                "UPDATE messages
                 SET responded = 1,
                     response_audio_key = ?2,
                     response_text = ?3,
                     responded_at = ?4,
                     responded_by = ?5,
                     audio_key = NULL
                 WHERE id = ?1 AND responded = 0",
                params![id, content.audio_key(), content.text(), responded_at, moderator_name],
            )?;
            if updated != 1 {
                return Ok(ResponseWrite::AlreadyResponded);
            }

            let message = query_message(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("Message {} vanished mid-transaction", id))?;
            tx.commit()?;

            Ok(ResponseWrite::Applied {
                message,
                released_audio_key,
            })
        })
    }

    /// Hard-delete a message, returning the row as it was at deletion time.
    pub fn delete_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(row) = query_message(&tx, id)? else {
                return Ok(None);
            };
            tx.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(Some(row))
        })
    }

    /// Every blob key still referenced by some message.
    pub fn referenced_blob_keys(&self) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT audio_key FROM messages WHERE audio_key IS NOT NULL
                 UNION
                 SELECT response_audio_key FROM messages WHERE response_audio_key IS NOT NULL",
            )?;
            let keys = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<HashSet<_>, _>>()?;
            Ok(keys)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is one of two literals chosen by the callers above.
    let sql = format!(
        "SELECT id, username, display_name, password, role, created_at FROM users WHERE {column} = ?1"
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                display_name: row.get(2)?,
                password: row.get(3)?,
                role: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
    let row = conn.query_row(&sql, [id], map_message).optional()?;
    Ok(row)
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        audio_key: row.get(3)?,
        created_at: row.get(4)?,
        responded: row.get(5)?,
        response_audio_key: row.get(6)?,
        response_text: row.get(7)?,
        responded_at: row.get(8)?,
        responded_by: row.get(9)?,
    })
}

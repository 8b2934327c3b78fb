use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, messages)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE,
                display_name    TEXT,
                password        TEXT NOT NULL,
                role            TEXT NOT NULL CHECK (role IN ('user', 'moderator')),
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- A responded row has dropped its original audio and carries exactly
            -- one response; an unresponded row carries none.
            CREATE TABLE messages (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL REFERENCES users(id),
                username            TEXT NOT NULL,
                audio_key           TEXT,
                created_at          TEXT NOT NULL,
                responded           INTEGER NOT NULL DEFAULT 0,
                response_audio_key  TEXT,
                response_text       TEXT,
                responded_at        TEXT,
                responded_by        TEXT,
                CHECK (
                    (responded = 0
                        AND response_audio_key IS NULL
                        AND response_text IS NULL
                        AND responded_at IS NULL
                        AND responded_by IS NULL)
                    OR
                    (responded = 1
                        AND audio_key IS NULL
                        AND ((response_audio_key IS NULL) <> (response_text IS NULL))
                        AND responded_at IS NOT NULL
                        AND responded_by IS NOT NULL)
                )
            );

            CREATE INDEX idx_messages_user ON messages(user_id, created_at);
            CREATE INDEX idx_messages_created ON messages(created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            author          TEXT NOT NULL,
            avatar_ref      TEXT,
            body_kind       TEXT NOT NULL CHECK (body_kind IN ('text', 'audio', 'image')),
            body_value      TEXT NOT NULL,
            reply_author    TEXT,
            reply_text      TEXT,
            seen            INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_created
            ON messages(created_at, seq);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

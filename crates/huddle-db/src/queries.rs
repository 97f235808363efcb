use crate::Database;
use crate::models::MessageRow;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

const MESSAGE_COLUMNS: &str =
    "id, author, avatar_ref, body_kind, body_value, reply_author, reply_text, seen, created_at";

impl Database {
    // -- Messages --

    /// Insert a message row. `row.created_at` is a candidate timestamp: if
    /// the newest stored row is later (clock skew), that value is reused so
    /// `created_at` never decreases along insertion order.
    /// Returns the timestamp actually stored.
    pub fn insert_message(&self, row: &MessageRow) -> Result<String> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let latest: Option<String> = tx
                .query_row(
                    "SELECT created_at FROM messages ORDER BY seq DESC LIMIT 1",
                    [],
                    |r| r.get(0),
                )
                .optional()?;

            let created_at = match latest {
                Some(latest) if latest > row.created_at => latest,
                _ => row.created_at.clone(),
            };

            tx.execute(
                "INSERT INTO messages (id, author, avatar_ref, body_kind, body_value, reply_author, reply_text, seen, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    row.id,
                    row.author,
                    row.avatar_ref,
                    row.body_kind,
                    row.body_value,
                    row.reply_author,
                    row.reply_text,
                    row.seen,
                    created_at,
                ],
            )?;
            tx.commit()?;
            Ok(created_at)
        })
    }

    /// The newest `limit` messages, oldest first.
    pub fn recent_messages(&self, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_recent(conn, limit))
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
            let row = conn.query_row(&sql, [id], map_row).optional()?;
            Ok(row)
        })
    }

    /// Flip `seen` to true. Returns false if the message is unknown or was
    /// already seen.
    pub fn mark_seen(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET seen = 1 WHERE id = ?1 AND seen = 0",
                [id],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn delete_all_messages(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM messages", [])?;
            Ok(deleted)
        })
    }
}

fn query_recent(conn: &Connection, limit: u32) -> Result<Vec<MessageRow>> {
    // Newest window first, then flip to chronological order
    let sql = format!(
        "SELECT {cols} FROM (
             SELECT seq, {cols} FROM messages
             ORDER BY created_at DESC, seq DESC
             LIMIT ?1
         )
         ORDER BY created_at ASC, seq ASC",
        cols = MESSAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map(params![limit], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        author: row.get(1)?,
        avatar_ref: row.get(2)?,
        body_kind: row.get(3)?,
        body_value: row.get(4)?,
        reply_author: row.get(5)?,
        reply_text: row.get(6)?,
        seen: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, text: &str, created_at: &str) -> MessageRow {
        MessageRow {
            id: id.to_string(),
            author: "alice".to_string(),
            avatar_ref: None,
            body_kind: "text".to_string(),
            body_value: text.to_string(),
            reply_author: None,
            reply_text: None,
            seen: false,
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn recent_window_is_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            let ts = format!("2024-01-01T00:00:0{}.000000Z", i);
            db.insert_message(&row(&format!("m{}", i), &format!("t{}", i), &ts))
                .unwrap();
        }

        let rows = db.recent_messages(3).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["m2", "m3", "m4"]);
    }

    #[test]
    fn created_at_never_goes_backwards() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&row("a", "first", "2024-01-01T00:00:05.000000Z"))
            .unwrap();
        let stored = db
            .insert_message(&row("b", "second", "2024-01-01T00:00:01.000000Z"))
            .unwrap();
        assert_eq!(stored, "2024-01-01T00:00:05.000000Z");

        // Equal timestamps fall back to insertion order
        let rows = db.recent_messages(10).unwrap();
        assert_eq!(rows[0].id, "a");
        assert_eq!(rows[1].id, "b");
    }

    #[test]
    fn mark_seen_flips_once() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&row("a", "hi", "2024-01-01T00:00:00.000000Z"))
            .unwrap();

        assert!(db.mark_seen("a").unwrap());
        assert!(!db.mark_seen("a").unwrap());
        assert!(!db.mark_seen("missing").unwrap());
        assert!(db.get_message("a").unwrap().unwrap().seen);
    }

    #[test]
    fn delete_all_reports_count() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&row("a", "1", "2024-01-01T00:00:00.000000Z"))
            .unwrap();
        db.insert_message(&row("b", "2", "2024-01-01T00:00:01.000000Z"))
            .unwrap();

        assert_eq!(db.delete_all_messages().unwrap(), 2);
        assert!(db.recent_messages(50).unwrap().is_empty());
        assert!(db.get_message("a").unwrap().is_none());
    }
}

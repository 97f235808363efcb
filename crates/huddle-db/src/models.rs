/// Database row types: these map directly to SQLite rows.
/// Distinct from huddle-types models to keep the DB layer independent.

pub struct MessageRow {
    pub id: String,
    pub author: String,
    pub avatar_ref: Option<String>,
    pub body_kind: String,
    pub body_value: String,
    pub reply_author: Option<String>,
    pub reply_text: Option<String>,
    pub seen: bool,
    pub created_at: String,
}

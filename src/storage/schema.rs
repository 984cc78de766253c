//! Database schema for harvested records

/// SQL schema for the results database
pub const SCHEMA_SQL: &str = r#"
-- One row per persisted harvest
CREATE TABLE IF NOT EXISTS harvests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    keyword TEXT NOT NULL,
    record_count INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_harvests_keyword ON harvests(keyword);

-- Records belonging to a harvest, stored as JSON objects
CREATE TABLE IF NOT EXISTS harvest_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    harvest_id INTEGER NOT NULL REFERENCES harvests(id),
    position INTEGER NOT NULL,
    item_number TEXT,
    data TEXT NOT NULL,
    UNIQUE(harvest_id, position)
);

CREATE INDEX IF NOT EXISTS idx_harvest_records_harvest ON harvest_records(harvest_id);
CREATE INDEX IF NOT EXISTS idx_harvest_records_item ON harvest_records(item_number);
"#;

/// Creates all tables and indexes if they do not exist
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }
}

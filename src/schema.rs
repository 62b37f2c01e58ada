use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::LineageError;

pub const SCHEMA_VERSION: i64 = 1;

/// Creates the lineage tables if missing. Edges carry no foreign keys: the
/// loader reports dangling rows instead of the database refusing them.
pub fn ensure_schema(conn: &Connection) -> Result<(), LineageError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS lineage_meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS lineage_nodes (
            node_id             TEXT PRIMARY KEY,
            asset_type          TEXT NOT NULL,
            asset_name          TEXT NOT NULL,
            schema_name         TEXT,
            database_name       TEXT,
            parent_node_id      TEXT,
            business_importance REAL NOT NULL DEFAULT 0.5,
            metadata            TEXT NOT NULL DEFAULT '{}',
            tags                TEXT NOT NULL DEFAULT '[]'
        );
        CREATE TABLE IF NOT EXISTS lineage_edges (
            edge_id             TEXT PRIMARY KEY,
            source_node_id      TEXT NOT NULL,
            target_node_id      TEXT NOT NULL,
            lineage_type        TEXT NOT NULL,
            transformation_type TEXT,
            confidence          REAL NOT NULL DEFAULT 1.0,
            metadata            TEXT NOT NULL DEFAULT '{}'
        );
        CREATE TABLE IF NOT EXISTS impact_analyses (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            source_asset   TEXT NOT NULL,
            change_type    TEXT NOT NULL,
            overall_score  REAL NOT NULL,
            overall_level  TEXT NOT NULL,
            impacted_count INTEGER NOT NULL,
            analyzed_at    INTEGER NOT NULL,
            record         TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_edges_source ON lineage_edges(source_node_id);
        CREATE INDEX IF NOT EXISTS idx_edges_target ON lineage_edges(target_node_id);
        CREATE INDEX IF NOT EXISTS idx_nodes_parent ON lineage_nodes(parent_node_id);
        CREATE INDEX IF NOT EXISTS idx_impact_source ON impact_analyses(source_asset);
        "#,
    )
    .map_err(|e| LineageError::storage(format!("schema: {e}")))?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT value FROM lineage_meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match existing {
        None => {
            conn.execute(
                "INSERT INTO lineage_meta(key, value) VALUES('schema_version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )?;
        }
        Some(version) if version == SCHEMA_VERSION.to_string() => {}
        Some(version) => {
            return Err(LineageError::storage(format!(
                "unsupported schema version {version}, expected {SCHEMA_VERSION}"
            )));
        }
    }
    Ok(())
}

pub fn read_schema_version(conn: &Connection) -> Result<i64, LineageError> {
    let raw: String = conn.query_row(
        "SELECT value FROM lineage_meta WHERE key = 'schema_version'",
        [],
        |row| row.get(0),
    )?;
    raw.parse()
        .map_err(|_| LineageError::storage(format!("corrupt schema version {raw}")))
}

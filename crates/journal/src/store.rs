//! SQLite journal implementation.

use std::path::Path;

use rusqlite::{Connection, params};

use crate::{Error, InvocationRecord, Outcome, Result};

/// SQLite-backed invocation journal.
pub struct Journal {
    conn: Connection,
}

/// Raw column values of one `invocations` row.
#[derive(Debug)]
struct Row {
    id: String,
    timestamp: String,
    tool: String,
    arguments: String,
    outcome: String,
    message: Option<String>,
    elapsed_ms: i64,
}

impl Journal {
    /// Open or create a journal at the given path, creating parent
    /// directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let journal = Self {
            conn: Connection::open(path)?,
        };
        journal.init_schema()?;
        Ok(journal)
    }

    /// Create an in-memory journal (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let journal = Self {
            conn: Connection::open_in_memory()?,
        };
        journal.init_schema()?;
        Ok(journal)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS invocations (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                tool TEXT NOT NULL,
                arguments TEXT NOT NULL,
                outcome TEXT NOT NULL,
                message TEXT,
                elapsed_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_invocations_tool
                ON invocations(tool);
            "#,
        )?;
        Ok(())
    }

    /// Append a record.
    pub fn append(&self, record: &InvocationRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO invocations (id, timestamp, tool, arguments, outcome, message, elapsed_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id.to_string(),
                record.timestamp.to_rfc3339(),
                record.tool,
                serde_json::to_string(&record.arguments)?,
                record.outcome.label(),
                record.outcome.message(),
                i64::try_from(record.elapsed_ms).unwrap_or(i64::MAX),
            ],
        )?;
        Ok(())
    }

    /// Most recent records first, optionally only those for `tool`.
    pub fn recent(&self, limit: usize, tool: Option<&str>) -> Result<Vec<InvocationRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, tool, arguments, outcome, message, elapsed_ms
             FROM invocations
             WHERE (?1 IS NULL OR tool = ?1)
             ORDER BY rowid DESC
             LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![tool, limit], |row| {
            Ok(Row {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                tool: row.get(2)?,
                arguments: row.get(3)?,
                outcome: row.get(4)?,
                message: row.get(5)?,
                elapsed_ms: row.get(6)?,
            })
        })?;

        rows.map(|row| decode(row?)).collect()
    }

    /// Number of records, optionally only those for `tool`.
    pub fn count(&self, tool: Option<&str>) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM invocations WHERE (?1 IS NULL OR tool = ?1)",
            params![tool],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

fn decode(row: Row) -> Result<InvocationRecord> {
    let corrupt = |reason: String| Error::Corrupt {
        id: row.id.clone(),
        reason,
    };

    let id = row.id.parse().map_err(|e| corrupt(format!("id: {e}")))?;
    let timestamp = row
        .timestamp
        .parse()
        .map_err(|e| corrupt(format!("timestamp: {e}")))?;
    let arguments = serde_json::from_str(&row.arguments)?;
    let outcome = if row.outcome == "ok" {
        Outcome::Ok
    } else {
        Outcome::Failed {
            kind: row.outcome.clone(),
            message: row.message.clone().unwrap_or_default(),
        }
    };

    Ok(InvocationRecord {
        id,
        timestamp,
        tool: row.tool,
        arguments,
        outcome,
        elapsed_ms: row.elapsed_ms.max(0) as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn record(tool: &str, outcome: Outcome) -> InvocationRecord {
        InvocationRecord::new(tool, json!({"page": "cut"}), outcome, Duration::from_millis(7))
    }

    #[test]
    fn append_and_read_back() {
        let journal = Journal::in_memory().unwrap();
        let original = record("switch_page", Outcome::Ok);
        journal.append(&original).unwrap();

        let records = journal.recent(10, None).unwrap();
        assert_eq!(records.len(), 1);
        let loaded = &records[0];
        assert_eq!(loaded.id, original.id);
        assert_eq!(loaded.tool, "switch_page");
        assert_eq!(loaded.arguments, json!({"page": "cut"}));
        assert_eq!(loaded.outcome, Outcome::Ok);
        assert_eq!(loaded.elapsed_ms, 7);
        assert_eq!(loaded.timestamp, original.timestamp);
    }

    #[test]
    fn newest_first_with_limit() {
        let journal = Journal::in_memory().unwrap();
        for tool in ["get_current_page", "switch_page", "list_timelines"] {
            journal.append(&record(tool, Outcome::Ok)).unwrap();
        }

        let tools: Vec<_> = journal
            .recent(2, None)
            .unwrap()
            .into_iter()
            .map(|r| r.tool)
            .collect();
        assert_eq!(tools, ["list_timelines", "switch_page"]);
    }

    #[test]
    fn filter_by_tool_keeps_failures() {
        let journal = Journal::in_memory().unwrap();
        journal.append(&record("switch_page", Outcome::Ok)).unwrap();
        journal
            .append(&record(
                "create_timeline",
                Outcome::failed("upstream_error", "CreateEmptyTimeline failed"),
            ))
            .unwrap();
        journal.append(&record("switch_page", Outcome::Ok)).unwrap();

        assert_eq!(journal.count(None).unwrap(), 3);
        assert_eq!(journal.count(Some("switch_page")).unwrap(), 2);

        let failed = journal.recent(10, Some("create_timeline")).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(
            failed[0].outcome,
            Outcome::failed("upstream_error", "CreateEmptyTimeline failed")
        );
        assert!(journal.recent(10, Some("reconnect")).unwrap().is_empty());
    }

    #[test]
    fn open_creates_parent_dirs_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("journal.db");

        let journal = Journal::open(&path).unwrap();
        journal.append(&record("reconnect", Outcome::Ok)).unwrap();
        drop(journal);

        let reopened = Journal::open(&path).unwrap();
        assert_eq!(reopened.count(None).unwrap(), 1);
    }
}

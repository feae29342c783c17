//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine, composer and orchestrator never execute SQL directly.
//!
//! The schema is a single key/value table so saves stay inspectable with
//! any SQLite shell: one row per save holding its JSON record, plus one
//! index row listing the live saves in creation order.

use crate::error::SaveResult;
use rusqlite::{params, Connection, OptionalExtension};

mod slots;

/// Key of the row listing all save timestamps, comma-separated.
pub const INDEX_KEY: &str = "save_index";

pub struct SaveStore {
    conn:      Connection,
    max_slots: usize,
}

impl SaveStore {
    pub fn open(path: &str, max_slots: usize) -> SaveResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only matters for real files; in-memory databases ignore it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self { conn, max_slots: max_slots.max(1) })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory(max_slots: usize) -> SaveResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self { conn, max_slots: max_slots.max(1) })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SaveResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    // ── Raw key/value access ───────────────────────────────────

    pub fn get_value(&self, key: &str) -> SaveResult<Option<String>> {
        get_value(&self.conn, key)
    }

    /// Overwrite a raw entry. Bypasses the slot index; meant for tooling
    /// and for tests that need to plant damaged data.
    pub fn put_value(&self, key: &str, value: &str) -> SaveResult<()> {
        put_value(&self.conn, key, value)
    }

    pub fn key_count(&self) -> SaveResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn get_value(conn: &Connection, key: &str) -> SaveResult<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

fn put_value(conn: &Connection, key: &str, value: &str) -> SaveResult<()> {
    conn.execute(
        "INSERT INTO kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
        params![key, value],
    )?;
    Ok(())
}

fn delete_value(conn: &Connection, key: &str) -> SaveResult<bool> {
    let removed = conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
    Ok(removed > 0)
}

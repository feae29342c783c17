//! Save slots: records keyed by timestamp, bounded FIFO.

use crate::{
    error::{SaveError, SaveResult},
    snapshot::SaveRecord,
};
use rusqlite::Connection;

use super::{delete_value, get_value, put_value, SaveStore, INDEX_KEY};

impl SaveStore {
    /// Persist `record` under its timestamp and evict the oldest saves
    /// beyond `max_slots`. Saving a timestamp that already exists replaces
    /// that entry in place without moving it in the index; returns true
    /// when that happened.
    pub fn save(&self, record: &SaveRecord) -> SaveResult<bool> {
        let timestamp = record.save_timestamp.as_str();
        if timestamp.is_empty() || timestamp.contains(',') || timestamp == INDEX_KEY {
            return Err(anyhow::anyhow!("invalid save timestamp '{timestamp}'").into());
        }
        let json = serde_json::to_string(record)?;

        let tx = self.conn.unchecked_transaction()?;
        put_value(&tx, timestamp, &json)?;

        let mut index = read_index(&tx)?;
        let replaced = index.iter().any(|t| t == timestamp);
        if replaced {
            log::warn!("save '{timestamp}' already exists; overwriting it");
        } else {
            index.push(timestamp.to_string());
        }
        while index.len() > self.max_slots {
            let oldest = index.remove(0);
            delete_value(&tx, &oldest)?;
            log::info!("evicted save '{oldest}' (max {} slots)", self.max_slots);
        }
        write_index(&tx, &index)?;
        tx.commit()?;

        log::info!("saved '{timestamp}' ({} bytes, {} slots used)", json.len(), index.len());
        Ok(replaced)
    }

    pub fn load(&self, timestamp: &str) -> SaveResult<SaveRecord> {
        let json = get_value(&self.conn, timestamp)?
            .filter(|_| timestamp != INDEX_KEY)
            .ok_or_else(|| SaveError::NotFound { timestamp: timestamp.to_string() })?;
        serde_json::from_str(&json).map_err(|e| SaveError::CorruptData {
            timestamp: timestamp.to_string(),
            reason:    e.to_string(),
        })
    }

    /// Save timestamps, oldest first. A snapshot of the index at call time.
    pub fn list_timestamps(&self) -> SaveResult<Vec<String>> {
        read_index(&self.conn)
    }

    /// Most recent save, if any.
    pub fn latest(&self) -> SaveResult<Option<SaveRecord>> {
        match self.list_timestamps()?.last() {
            Some(ts) => self.load(ts).map(Some),
            None => Ok(None),
        }
    }

    /// Remove one save. Returns false when it did not exist.
    pub fn delete(&self, timestamp: &str) -> SaveResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let mut index = read_index(&tx)?;
        let before = index.len();
        index.retain(|t| t != timestamp);
        let listed = index.len() != before;
        let removed = timestamp != INDEX_KEY && delete_value(&tx, timestamp)?;
        write_index(&tx, &index)?;
        tx.commit()?;
        Ok(listed || removed)
    }
}

fn read_index(conn: &Connection) -> SaveResult<Vec<String>> {
    Ok(get_value(conn, INDEX_KEY)?
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default())
}

fn write_index(conn: &Connection, index: &[String]) -> SaveResult<()> {
    put_value(conn, INDEX_KEY, &index.join(","))
}

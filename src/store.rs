//! The durable message store (spec.md §3, §6): two logical maps keyed by
//! (direction, seq_num) -> raw bytes plus sending time, used by gap-fill
//! processing and required to survive process restarts. Grounded on the
//! teacher's `storage.rs` JSONL-journal design (one file per counterparty
//! pair, an index alongside the data), generalized from session-key-scoped
//! files to the `{connection_name}:{direction}:{seq_num}` key layout
//! spec.md §6 names, and narrowed to the `put`/`get`/`range`/
//! `get_current_seq`/`reset` operations spec.md §6 actually specifies.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{FixError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::Sent => "sent",
            Direction::Received => "received",
        }
    }
}

/// A single persisted message: the raw wire bytes plus when it was
/// processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub seq_num: u32,
    pub sending_time: DateTime<Utc>,
    #[serde(with = "bytes_b64")]
    pub raw: Bytes,
}

mod bytes_b64 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(b: &Bytes, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&general_purpose::STANDARD.encode(b))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Bytes, D::Error> {
        let text = String::deserialize(d)?;
        general_purpose::STANDARD
            .decode(text)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

/// Operations spec.md §6 names for the message store collaborator. Keyed
/// by `connection_name` (the session identity) plus [`Direction`].
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    async fn put(
        &self,
        connection_name: &str,
        direction: Direction,
        seq_num: u32,
        raw: Bytes,
        sending_time: DateTime<Utc>,
    ) -> Result<()>;

    async fn get(
        &self,
        connection_name: &str,
        direction: Direction,
        seq_num: u32,
    ) -> Result<Option<StoredRecord>>;

    /// Inclusive range `[lo, hi]`, ordered by sequence number.
    async fn range(
        &self,
        connection_name: &str,
        direction: Direction,
        lo: u32,
        hi: u32,
    ) -> Result<Vec<StoredRecord>>;

    async fn get_current_seq(&self, connection_name: &str, direction: Direction) -> Result<u32>;

    async fn reset(&self, connection_name: &str, direction: Direction) -> Result<()>;
}

#[derive(Default)]
struct MemoryTable {
    sent: HashMap<String, HashMap<u32, StoredRecord>>,
    received: HashMap<String, HashMap<u32, StoredRecord>>,
}

impl MemoryTable {
    fn table(&self, direction: Direction) -> &HashMap<String, HashMap<u32, StoredRecord>> {
        match direction {
            Direction::Sent => &self.sent,
            Direction::Received => &self.received,
        }
    }

    fn table_mut(&mut self, direction: Direction) -> &mut HashMap<String, HashMap<u32, StoredRecord>> {
        match direction {
            Direction::Sent => &mut self.sent,
            Direction::Received => &mut self.received,
        }
    }
}

/// In-memory message store: the default for tests and for sessions that
/// do not need to survive a restart.
#[derive(Clone, Default)]
pub struct MemoryMessageStore {
    inner: Arc<Mutex<MemoryTable>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn put(
        &self,
        connection_name: &str,
        direction: Direction,
        seq_num: u32,
        raw: Bytes,
        sending_time: DateTime<Utc>,
    ) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard
            .table_mut(direction)
            .entry(connection_name.to_string())
            .or_default()
            .insert(
                seq_num,
                StoredRecord {
                    seq_num,
                    sending_time,
                    raw,
                },
            );
        Ok(())
    }

    async fn get(
        &self,
        connection_name: &str,
        direction: Direction,
        seq_num: u32,
    ) -> Result<Option<StoredRecord>> {
        let guard = self.inner.lock().await;
        Ok(guard
            .table(direction)
            .get(connection_name)
            .and_then(|m| m.get(&seq_num))
            .cloned())
    }

    async fn range(
        &self,
        connection_name: &str,
        direction: Direction,
        lo: u32,
        hi: u32,
    ) -> Result<Vec<StoredRecord>> {
        let guard = self.inner.lock().await;
        let mut out: Vec<StoredRecord> = guard
            .table(direction)
            .get(connection_name)
            .map(|m| {
                m.values()
                    .filter(|r| r.seq_num >= lo && r.seq_num <= hi)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by_key(|r| r.seq_num);
        Ok(out)
    }

    async fn get_current_seq(&self, connection_name: &str, direction: Direction) -> Result<u32> {
        let guard = self.inner.lock().await;
        Ok(guard
            .table(direction)
            .get(connection_name)
            .and_then(|m| m.keys().max().copied())
            .unwrap_or(0))
    }

    async fn reset(&self, connection_name: &str, direction: Direction) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.table_mut(direction).remove(connection_name);
        Ok(())
    }
}

/// File-backed message store: one JSON-lines file per (connection_name,
/// direction), loaded into an in-memory index on first access and appended
/// to on every `put`. Durable across restarts, as spec.md §3 requires.
pub struct FileMessageStore {
    base_dir: PathBuf,
    cache: Mutex<HashMap<(String, &'static str), HashMap<u32, StoredRecord>>>,
}

impl FileMessageStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, connection_name: &str, direction: Direction) -> PathBuf {
        self.base_dir
            .join(format!("{connection_name}.{}.jsonl", direction.as_str()))
    }

    async fn load(
        &self,
        connection_name: &str,
        direction: Direction,
    ) -> Result<HashMap<u32, StoredRecord>> {
        let path = self.path_for(connection_name, direction);
        let content = match fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(FixError::Store(e.to_string())),
        };
        let mut map = HashMap::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let rec: StoredRecord =
                serde_json::from_str(line).map_err(|e| FixError::Store(e.to_string()))?;
            map.insert(rec.seq_num, rec);
        }
        Ok(map)
    }

    /// Ensures the in-memory index for `(connection_name, direction)` is
    /// populated from disk, then runs `f` against it while holding the
    /// cache lock.
    async fn with_index<R>(
        &self,
        connection_name: &str,
        direction: Direction,
        f: impl FnOnce(&mut HashMap<u32, StoredRecord>) -> R,
    ) -> Result<R> {
        let key = (connection_name.to_string(), direction.as_str());
        let mut guard = self.cache.lock().await;
        if !guard.contains_key(&key) {
            drop(guard);
            let loaded = self.load(connection_name, direction).await?;
            guard = self.cache.lock().await;
            guard.entry(key.clone()).or_insert(loaded);
        }
        Ok(f(guard.get_mut(&key).expect("populated above")))
    }
}

#[async_trait]
impl MessageStore for FileMessageStore {
    async fn put(
        &self,
        connection_name: &str,
        direction: Direction,
        seq_num: u32,
        raw: Bytes,
        sending_time: DateTime<Utc>,
    ) -> Result<()> {
        let record = StoredRecord {
            seq_num,
            sending_time,
            raw,
        };
        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| FixError::Store(e.to_string()))?;
        let path = self.path_for(connection_name, direction);
        let line = serde_json::to_string(&record).map_err(|e| FixError::Store(e.to_string()))?;
        use tokio::io::AsyncWriteExt;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| FixError::Store(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| FixError::Store(e.to_string()))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| FixError::Store(e.to_string()))?;
        file.sync_data().await.ok();

        self.with_index(connection_name, direction, move |idx| {
            idx.insert(seq_num, record);
        })
        .await
    }

    async fn get(
        &self,
        connection_name: &str,
        direction: Direction,
        seq_num: u32,
    ) -> Result<Option<StoredRecord>> {
        self.with_index(connection_name, direction, move |idx| {
            idx.get(&seq_num).cloned()
        })
        .await
    }

    async fn range(
        &self,
        connection_name: &str,
        direction: Direction,
        lo: u32,
        hi: u32,
    ) -> Result<Vec<StoredRecord>> {
        self.with_index(connection_name, direction, move |idx| {
            let mut out: Vec<StoredRecord> = idx
                .values()
                .filter(|r| r.seq_num >= lo && r.seq_num <= hi)
                .cloned()
                .collect();
            out.sort_by_key(|r| r.seq_num);
            out
        })
        .await
    }

    async fn get_current_seq(&self, connection_name: &str, direction: Direction) -> Result<u32> {
        self.with_index(connection_name, direction, |idx| {
            idx.keys().max().copied().unwrap_or(0)
        })
        .await
    }

    async fn reset(&self, connection_name: &str, direction: Direction) -> Result<()> {
        let path = self.path_for(connection_name, direction);
        fs::remove_file(&path).await.ok();
        let mut guard = self.cache.lock().await;
        guard.remove(&(connection_name.to_string(), direction.as_str()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryMessageStore::new();
        let now = Utc::now();
        store
            .put("demo", Direction::Sent, 1, Bytes::from_static(b"hello"), now)
            .await
            .unwrap();
        let got = store.get("demo", Direction::Sent, 1).await.unwrap().unwrap();
        assert_eq!(got.raw, Bytes::from_static(b"hello"));
        assert_eq!(store.get_current_seq("demo", Direction::Sent).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn memory_store_range_is_ordered() {
        let store = MemoryMessageStore::new();
        let now = Utc::now();
        for seq in [3u32, 1, 2] {
            store
                .put("demo", Direction::Sent, seq, Bytes::from(seq.to_string()), now)
                .await
                .unwrap();
        }
        let range = store.range("demo", Direction::Sent, 1, 3).await.unwrap();
        let seqs: Vec<u32> = range.iter().map(|r| r.seq_num).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn memory_store_reset_clears_session() {
        let store = MemoryMessageStore::new();
        store
            .put("demo", Direction::Sent, 1, Bytes::from_static(b"x"), Utc::now())
            .await
            .unwrap();
        store.reset("demo", Direction::Sent).await.unwrap();
        assert_eq!(store.get_current_seq("demo", Direction::Sent).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let dir = std::env::temp_dir().join(format!("fixg-store-test-{}", uuid::Uuid::new_v4()));
        let store = FileMessageStore::new(&dir);
        store
            .put("demo", Direction::Sent, 5, Bytes::from_static(b"payload"), Utc::now())
            .await
            .unwrap();

        let reopened = FileMessageStore::new(&dir);
        let got = reopened.get("demo", Direction::Sent, 5).await.unwrap().unwrap();
        assert_eq!(got.raw, Bytes::from_static(b"payload"));

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}

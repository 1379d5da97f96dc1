//! Named cache partitions.
//!
//! The synchronizer works over three partitions (content, staging,
//! manifest). They are plain keyed stores handed to the worker as explicit
//! handles; nothing here knows about manifests or reconciliation.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use cachekit_net::FetchedAsset;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

// ==================== Stored assets ====================

/// A cached response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAsset {
    /// URL the asset was fetched from.
    pub url: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Stored-at timestamp (ms since epoch).
    pub stored_at: u64,
}

impl StoredAsset {
    /// Build an entry for a locally produced payload (not fetched from the
    /// network), such as the persisted manifest.
    pub fn synthetic(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            headers: HashMap::new(),
            body,
            stored_at: now_millis(),
        }
    }

    /// Check if the stored response was successful (2xx).
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<FetchedAsset> for StoredAsset {
    fn from(asset: FetchedAsset) -> Self {
        let headers = asset
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();

        Self {
            url: asset.url.to_string(),
            status: asset.status.as_u16(),
            headers,
            body: asset.body.to_vec(),
            stored_at: now_millis(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ==================== Partition ====================

/// A cloneable handle to one named partition.
///
/// Individual operations are atomic; clones observe the same entries.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    entries: Arc<RwLock<HashMap<String, StoredAsset>>>,
}

impl Partition {
    fn new() -> Self {
        Self::default()
    }

    /// Store an asset under a logical key, replacing any existing entry.
    pub async fn put(&self, key: impl Into<String>, asset: StoredAsset) {
        self.entries.write().await.insert(key.into(), asset);
    }

    /// Look up an asset.
    pub async fn get(&self, key: &str) -> Option<StoredAsset> {
        self.entries.read().await.get(key).cloned()
    }

    /// Whether a key is present.
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// Remove an entry. Returns whether it existed.
    pub async fn remove(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// All stored keys.
    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// All stored entries.
    pub async fn entries(&self) -> Vec<(String, StoredAsset)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the partition is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Serializable copy of the partition contents, for embedders that
    /// persist the durable partitions across restarts.
    pub async fn snapshot(&self) -> HashMap<String, StoredAsset> {
        self.entries.read().await.clone()
    }

    /// Replace the partition contents from a snapshot.
    pub async fn restore(&self, snapshot: HashMap<String, StoredAsset>) {
        *self.entries.write().await = snapshot;
    }
}

// ==================== Partition store ====================

/// Named partitions, opened lazily on first use.
#[derive(Debug, Clone, Default)]
pub struct PartitionStore {
    partitions: Arc<RwLock<HashMap<String, Partition>>>,
}

impl PartitionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a partition, creating it if absent.
    pub async fn open(&self, name: &str) -> Partition {
        self.partitions
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(Partition::new)
            .clone()
    }

    /// Whether a partition exists.
    pub async fn has(&self, name: &str) -> bool {
        self.partitions.read().await.contains_key(name)
    }

    /// Delete a partition outright. Handles already held stay usable but
    /// are detached from the store; a later `open` starts empty.
    pub async fn delete(&self, name: &str) -> bool {
        self.partitions.write().await.remove(name).is_some()
    }

    /// Names of all existing partitions.
    pub async fn names(&self) -> Vec<String> {
        self.partitions.read().await.keys().cloned().collect()
    }
}

//! # CacheKit Sync
//!
//! Manifest-driven asset cache synchronization for offline-capable clients.
//!
//! ## Features
//!
//! - **Manifest**: logical path → content fingerprint, one per build
//! - **Partitions**: named content/staging/manifest stores with explicit,
//!   injectable handles
//! - **Install**: stage the application shell with cache-bypass fetches
//! - **Activate**: ordered reconciliation pipeline that reuses unchanged
//!   resources and drops stale ones
//! - **Fetch interception**: cache-first for assets, network-first for the
//!   root document
//! - **Control messages**: skip-waiting and full offline priming
//!
//! ## Architecture
//!
//! ```text
//! SyncWorker
//!     │
//!     ├── Manifest + CoreSet      (build-time inputs)
//!     ├── PartitionStore          (content / staging / manifest)
//!     ├── AssetFetcher            (network seam, cachekit-net)
//!     └── ClientRegistry          (claim on activation)
//! ```

use thiserror::Error;

pub mod fetch;
pub mod lifecycle;
pub mod manifest;
pub mod message;
pub mod store;
pub mod worker;

pub use lifecycle::{Client, ClientRegistry, SyncEvent, WorkerPhase};
pub use manifest::{CoreSet, Manifest, ROOT_KEY};
pub use message::ControlMessage;
pub use store::{Partition, PartitionStore, StoredAsset};
pub use worker::{FetchDecision, PrimeOutcome, SyncWorker, WorkerConfig};

use cachekit_net::FetchError;

/// Errors that can occur while synchronizing the cache.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Shell fetch failed for {path}: {source}")]
    ShellFetch {
        path: String,
        #[source]
        source: FetchError,
    },

    #[error("Shell resource {path} returned status {status}")]
    ShellStatus { path: String, status: u16 },

    #[error("Resource {path} returned status {status}")]
    ResourceStatus { path: String, status: u16 },

    #[error("Invalid resource path {path}: {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Stored manifest is unreadable: {0}")]
    ManifestDecode(#[from] serde_json::Error),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

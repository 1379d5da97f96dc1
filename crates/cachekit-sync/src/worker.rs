//! The synchronizer: install, activate, fetch interception and control
//! messages over a set of injected collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cachekit_net::{AssetFetcher, AssetRequest, FetchMode};
use futures::future::join_all;
use hashbrown::HashSet;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::fetch::logical_key;
use crate::lifecycle::{ClientRegistry, SyncEvent, WorkerPhase};
use crate::manifest::{CoreSet, Manifest, ROOT_KEY};
use crate::message::ControlMessage;
use crate::store::{Partition, PartitionStore, StoredAsset};
use crate::SyncError;

/// Key under which the prior manifest is persisted in its partition.
const MANIFEST_ENTRY_KEY: &str = "manifest";

/// Configuration for a [`SyncWorker`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Origin all logical paths are resolved against.
    pub origin: Url,

    /// Name of the durable serving partition.
    pub content_partition: String,

    /// Name of the ephemeral install-time staging partition.
    pub staging_partition: String,

    /// Name of the partition holding the previously committed manifest.
    pub manifest_partition: String,
}

impl WorkerConfig {
    /// Configuration with the default partition names.
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            content_partition: "asset-content".to_string(),
            staging_partition: "asset-staging".to_string(),
            manifest_partition: "asset-manifest".to_string(),
        }
    }
}

/// One step of the activation pipeline. Steps run strictly in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconcileStep {
    /// Delete and recreate the content partition.
    ResetContent,
    /// Drop content entries that are orphaned or whose fingerprint changed.
    PruneStale,
    /// Copy every staged entry into content, overwriting on collision.
    CommitStaged,
    /// Delete the staging partition.
    DiscardStaging,
    /// Persist the current manifest for the next upgrade.
    PersistManifest,
    /// Take control of all connected clients.
    ClaimClients,
}

/// The ordered reconciliation plan for an activation.
fn reconcile_plan(has_prior_manifest: bool) -> Vec<ReconcileStep> {
    use ReconcileStep::*;
    if has_prior_manifest {
        vec![
            PruneStale,
            CommitStaged,
            DiscardStaging,
            PersistManifest,
            ClaimClients,
        ]
    } else {
        vec![
            ResetContent,
            CommitStaged,
            DiscardStaging,
            PersistManifest,
            ClaimClients,
        ]
    }
}

/// Outcome of offering a request to the fetch interceptor.
#[derive(Debug)]
pub enum FetchDecision {
    /// Not this cache's concern; the caller handles the request natively.
    Bypass,
    /// Serve this response.
    Respond(StoredAsset),
}

impl FetchDecision {
    /// The response to serve, if any.
    pub fn response(self) -> Option<StoredAsset> {
        match self {
            Self::Bypass => None,
            Self::Respond(asset) => Some(asset),
        }
    }
}

/// Summary of one offline-priming run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimeOutcome {
    /// Manifest resources that were missing from the content cache.
    pub requested: usize,
    /// Resources fetched and cached this run.
    pub primed: usize,
    /// Resources that failed to fetch this run.
    pub failed: Vec<String>,
}

/// Reconciles a persistent content cache against a build manifest.
///
/// The embedder drives exactly four entry points, mirroring the platform
/// worker lifecycle: [`install`](Self::install),
/// [`activate`](Self::activate), [`handle_fetch`](Self::handle_fetch) and
/// [`handle_message`](Self::handle_message). The platform contract applies:
/// install completes before activate begins, activate completes before
/// fetches are intercepted for newly controlled clients, and no two
/// invocations of the same entry point run concurrently for one worker.
pub struct SyncWorker {
    config: WorkerConfig,
    manifest: Manifest,
    core: CoreSet,
    partitions: PartitionStore,
    fetcher: Arc<dyn AssetFetcher>,
    clients: Arc<RwLock<ClientRegistry>>,
    phase: RwLock<WorkerPhase>,
    skip_waiting: AtomicBool,
    events: mpsc::UnboundedSender<SyncEvent>,
}

impl SyncWorker {
    /// Create a worker over injected collaborators.
    ///
    /// Returns the worker and the receiving end of its event stream.
    pub fn new(
        config: WorkerConfig,
        manifest: Manifest,
        core: CoreSet,
        partitions: PartitionStore,
        fetcher: Arc<dyn AssetFetcher>,
        clients: Arc<RwLock<ClientRegistry>>,
    ) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        for path in core.missing_from(&manifest) {
            warn!(path = %path, "shell path is not in the manifest");
        }

        let (events, event_rx) = mpsc::unbounded_channel();
        let worker = Self {
            config,
            manifest,
            core,
            partitions,
            fetcher,
            clients,
            phase: RwLock::new(WorkerPhase::Idle),
            skip_waiting: AtomicBool::new(false),
            events,
        };
        (worker, event_rx)
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> WorkerPhase {
        *self.phase.read().await
    }

    /// Whether this worker asked to supersede a waiting predecessor.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Relaxed)
    }

    // ==================== Install ====================

    /// Stage the application shell.
    ///
    /// Fetches every core-set path with cache-bypass semantics into the
    /// staging partition, and signals readiness to supersede any active
    /// predecessor immediately. Any failure aborts the install: the partial
    /// staging partition is deleted and the worker becomes redundant.
    pub async fn install(&self) -> Result<(), SyncError> {
        self.set_phase(WorkerPhase::Installing).await;
        self.request_skip_waiting();

        match self.stage_shell().await {
            Ok(()) => {
                info!(resources = self.core.len(), "application shell staged");
                self.set_phase(WorkerPhase::Installed).await;
                Ok(())
            }
            Err(err) => {
                self.partitions.delete(&self.config.staging_partition).await;
                self.set_phase(WorkerPhase::Redundant).await;
                Err(err)
            }
        }
    }

    async fn stage_shell(&self) -> Result<(), SyncError> {
        let staging = self.partitions.open(&self.config.staging_partition).await;

        for path in self.core.paths() {
            let url = self.resource_url(path)?;
            let request = AssetRequest::get(url).with_mode(FetchMode::Reload);
            let asset =
                self.fetcher
                    .fetch(&request)
                    .await
                    .map_err(|source| SyncError::ShellFetch {
                        path: path.clone(),
                        source,
                    })?;
            if !asset.ok() {
                return Err(SyncError::ShellStatus {
                    path: path.clone(),
                    status: asset.status.as_u16(),
                });
            }

            debug!(path = %path, "staged shell resource");
            staging.put(path.clone(), StoredAsset::from(asset)).await;
        }
        Ok(())
    }

    // ==================== Activate ====================

    /// Reconcile the content cache against the current manifest.
    ///
    /// Runs the reconciliation pipeline as one unit of work: prune or reset
    /// the content partition, commit the staged shell, drop staging, persist
    /// the manifest, claim clients. The manifest is persisted only after the
    /// content partition is fully reconciled.
    ///
    /// On any failure every partition is deleted and the next cycle rebuilds
    /// from nothing; the error is logged and activation still completes.
    pub async fn activate(&self) {
        self.set_phase(WorkerPhase::Activating).await;

        if let Err(err) = self.reconcile().await {
            error!(error = %err, "reconciliation failed, discarding all partitions");
            self.teardown().await;
            self.emit(SyncEvent::CacheTornDown);
        }

        self.set_phase(WorkerPhase::Activated).await;
    }

    async fn reconcile(&self) -> Result<(), SyncError> {
        let prior = self.load_prior_manifest().await?;
        let plan = reconcile_plan(prior.is_some());
        debug!(upgrade = prior.is_some(), ?plan, "running reconciliation");

        for step in plan {
            self.run_step(step, prior.as_ref()).await?;
        }
        Ok(())
    }

    async fn load_prior_manifest(&self) -> Result<Option<Manifest>, SyncError> {
        let partition = self.partitions.open(&self.config.manifest_partition).await;
        match partition.get(MANIFEST_ENTRY_KEY).await {
            Some(entry) => Ok(Some(Manifest::from_json(&entry.body)?)),
            None => Ok(None),
        }
    }

    async fn run_step(
        &self,
        step: ReconcileStep,
        prior: Option<&Manifest>,
    ) -> Result<(), SyncError> {
        match step {
            ReconcileStep::ResetContent => {
                self.partitions.delete(&self.config.content_partition).await;
                self.partitions.open(&self.config.content_partition).await;
            }
            ReconcileStep::PruneStale => {
                let Some(prior) = prior else { return Ok(()) };
                let content = self.partitions.open(&self.config.content_partition).await;
                for key in content.keys().await {
                    let stale = match self.manifest.get(&key) {
                        None => true,
                        Some(fingerprint) => prior.get(&key) != Some(fingerprint),
                    };
                    if stale {
                        debug!(key = %key, "dropping stale content entry");
                        content.remove(&key).await;
                    }
                }
            }
            ReconcileStep::CommitStaged => {
                let staging = self.partitions.open(&self.config.staging_partition).await;
                let content = self.partitions.open(&self.config.content_partition).await;
                for (key, asset) in staging.entries().await {
                    content.put(key, asset).await;
                }
            }
            ReconcileStep::DiscardStaging => {
                self.partitions.delete(&self.config.staging_partition).await;
            }
            ReconcileStep::PersistManifest => {
                let partition = self.partitions.open(&self.config.manifest_partition).await;
                let body = self.manifest.to_json()?;
                partition
                    .put(MANIFEST_ENTRY_KEY, StoredAsset::synthetic(MANIFEST_ENTRY_KEY, body))
                    .await;
            }
            ReconcileStep::ClaimClients => {
                let count = self.clients.write().await.claim();
                info!(count, "claimed connected clients");
                self.emit(SyncEvent::ClientsClaimed { count });
            }
        }
        Ok(())
    }

    async fn teardown(&self) {
        self.partitions.delete(&self.config.content_partition).await;
        self.partitions.delete(&self.config.staging_partition).await;
        self.partitions.delete(&self.config.manifest_partition).await;
    }

    // ==================== Fetch interception ====================

    /// Offer an outgoing request to the cache.
    ///
    /// Requests that are not reads, not under the configured origin, or not
    /// in the manifest are bypassed. The root document is served
    /// network-first with cache fallback; everything else cache-first with
    /// lazy populate. A network failure with no cached copy is an error.
    pub async fn handle_fetch(&self, request: &AssetRequest) -> Result<FetchDecision, SyncError> {
        if !request.is_read() {
            return Ok(FetchDecision::Bypass);
        }
        let Some(key) = logical_key(&self.config.origin, &request.url) else {
            return Ok(FetchDecision::Bypass);
        };
        if !self.manifest.contains(&key) {
            return Ok(FetchDecision::Bypass);
        }

        if key == ROOT_KEY {
            self.network_first(&key, request).await
        } else {
            self.cache_first(&key, request).await
        }
    }

    async fn cache_first(
        &self,
        key: &str,
        request: &AssetRequest,
    ) -> Result<FetchDecision, SyncError> {
        let content = self.partitions.open(&self.config.content_partition).await;
        if let Some(asset) = content.get(key).await {
            debug!(key = %key, "serving from cache");
            return Ok(FetchDecision::Respond(asset));
        }

        let asset = StoredAsset::from(self.fetcher.fetch(request).await?);
        if asset.ok() {
            content.put(key.to_string(), asset.clone()).await;
        }
        Ok(FetchDecision::Respond(asset))
    }

    async fn network_first(
        &self,
        key: &str,
        request: &AssetRequest,
    ) -> Result<FetchDecision, SyncError> {
        let content = self.partitions.open(&self.config.content_partition).await;
        match self.fetcher.fetch(request).await {
            Ok(fetched) => {
                let asset = StoredAsset::from(fetched);
                content.put(key.to_string(), asset.clone()).await;
                Ok(FetchDecision::Respond(asset))
            }
            Err(err) => match content.get(key).await {
                Some(asset) => {
                    warn!(error = %err, "root fetch failed, serving cached copy");
                    Ok(FetchDecision::Respond(asset))
                }
                None => Err(err.into()),
            },
        }
    }

    // ==================== Messages ====================

    /// Handle an out-of-band control message from the host page.
    pub async fn handle_message(&self, message: ControlMessage) -> Result<(), SyncError> {
        match message {
            ControlMessage::SkipWaiting => {
                self.request_skip_waiting();
                Ok(())
            }
            ControlMessage::PrimeOffline => self.prime_offline().await.map(|_| ()),
        }
    }

    /// Fetch and cache every manifest resource not already cached.
    ///
    /// Best-effort: the missing set is fetched in one concurrent batch, and
    /// resources that fail are logged and reported while the rest of the
    /// batch still lands.
    pub async fn prime_offline(&self) -> Result<PrimeOutcome, SyncError> {
        let content = self.partitions.open(&self.config.content_partition).await;
        let cached: HashSet<String> = content.keys().await.into_iter().collect();
        let missing: Vec<String> = self
            .manifest
            .keys()
            .filter(|key| !cached.contains(*key))
            .map(str::to_string)
            .collect();

        info!(missing = missing.len(), "priming offline cache");

        let fetches: Vec<_> = missing
            .iter()
            .map(|key| {
                let content = content.clone();
                async move {
                    match self.fetch_into(&content, key).await {
                        Ok(()) => None,
                        Err(err) => {
                            warn!(key = %key, error = %err, "offline priming fetch failed");
                            Some(key.clone())
                        }
                    }
                }
            })
            .collect();
        let failed: Vec<String> = join_all(fetches).await.into_iter().flatten().collect();

        Ok(PrimeOutcome {
            requested: missing.len(),
            primed: missing.len() - failed.len(),
            failed,
        })
    }

    async fn fetch_into(&self, content: &Partition, key: &str) -> Result<(), SyncError> {
        let url = self.resource_url(key)?;
        let fetched = self.fetcher.fetch(&AssetRequest::get(url)).await?;
        if !fetched.ok() {
            return Err(SyncError::ResourceStatus {
                path: key.to_string(),
                status: fetched.status.as_u16(),
            });
        }
        content.put(key.to_string(), StoredAsset::from(fetched)).await;
        Ok(())
    }

    // ==================== Helpers ====================

    fn resource_url(&self, path: &str) -> Result<Url, SyncError> {
        self.config
            .origin
            .join(path)
            .map_err(|source| SyncError::InvalidPath {
                path: path.to_string(),
                source,
            })
    }

    fn request_skip_waiting(&self) {
        if !self.skip_waiting.swap(true, Ordering::Relaxed) {
            self.emit(SyncEvent::SkipWaitingRequested);
        }
    }

    async fn set_phase(&self, phase: WorkerPhase) {
        *self.phase.write().await = phase;
        self.emit(SyncEvent::PhaseChanged(phase));
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }
}

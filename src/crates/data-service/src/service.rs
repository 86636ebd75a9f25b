//! The Unified Data Service: the single authoritative owner of graph state,
//! response cache, and episodic memory for one `(workspaceId, systemId)`
//! pair — a single owner instead of in-place sharing across callers.

use crate::cache::{CacheRecord, ResponseCache, DEFAULT_TTL_SECS};
use crate::embedding::{Embedder, HashingEmbedder};
use crate::episode::{Episode, EpisodicMemory};
use crate::error::Result;
use format_e::FormatEDiff;
use graph_core::{ApplyError, GraphChangeEvent, GraphStats, GraphStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Wraps one [`GraphStore`] and adds the response cache and episodic
/// memory. All reads/writes other components perform against this
/// workspace/system pass through here — nothing downstream holds its own
/// copy of the graph maps.
pub struct UnifiedDataService {
    workspace_id: String,
    system_id: String,
    store: Arc<GraphStore>,
    cache: ResponseCache,
    episodes: EpisodicMemory,
}

impl UnifiedDataService {
    fn new(workspace_id: String, system_id: String, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            workspace_id,
            system_id,
            store: Arc::new(GraphStore::new()),
            cache: ResponseCache::new(embedder.clone()),
            episodes: EpisodicMemory::new(embedder),
        }
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    // ---- graph reads/writes, proxied straight to the store ----

    pub fn get_version(&self) -> u64 {
        self.store.get_version()
    }

    pub fn stats(&self) -> GraphStats {
        self.store.stats()
    }

    pub fn apply_diff(&self, diff: &FormatEDiff) -> Result<()> {
        self.store.apply_diff(diff).map_err(Into::into)
    }

    pub fn apply_diff_text(&self, text: &str) -> std::result::Result<(), ApplyError> {
        self.store.apply_diff_text(text)
    }

    pub fn on_graph_change<F>(&self, handler: F)
    where
        F: Fn(&GraphChangeEvent) + Send + Sync + 'static,
    {
        self.store.on_graph_change(handler);
    }

    // ---- response cache ----

    pub fn check_cache(&self, query: &str, graph_version: u64) -> Option<CacheRecord> {
        self.cache.check(query, graph_version)
    }

    pub fn cache_response(&self, query: &str, graph_version: u64, response: String, operations: Option<String>) {
        self.cache.store(query, graph_version, response, operations);
    }

    pub fn cache_response_with_ttl(
        &self,
        query: &str,
        graph_version: u64,
        response: String,
        operations: Option<String>,
        ttl_secs: u64,
    ) {
        self.cache.store_with_ttl(query, graph_version, response, operations, ttl_secs);
    }

    pub fn default_cache_ttl_secs(&self) -> u64 {
        DEFAULT_TTL_SECS
    }

    // ---- episodic memory ----

    pub fn store_episode(
        &self,
        agent_id: impl Into<String>,
        task: impl Into<String>,
        success: bool,
        output: Value,
        critique: impl Into<String>,
    ) {
        self.episodes.store(agent_id, task, success, output, critique);
    }

    pub fn load_context(&self, agent_id: &str, task: Option<&str>, limit: usize) -> Vec<Episode> {
        self.episodes.load_context(agent_id, task, limit)
    }
}

type RegistryKey = (String, String);

static REGISTRY: OnceLock<parking_lot::Mutex<HashMap<RegistryKey, Arc<UnifiedDataService>>>> = OnceLock::new();

fn registry() -> &'static parking_lot::Mutex<HashMap<RegistryKey, Arc<UnifiedDataService>>> {
    REGISTRY.get_or_init(|| parking_lot::Mutex::new(HashMap::new()))
}

/// Returns the one [`UnifiedDataService`] for `(workspace_id, system_id)`,
/// creating it on first call. The only process-wide state is this
/// memoization table; every other component receives the returned `Arc`
/// by explicit parameter — no global lookups deeper in the call stack.
pub fn unified_data_service(workspace_id: &str, system_id: &str) -> Arc<UnifiedDataService> {
    unified_data_service_with_embedder(workspace_id, system_id, Arc::new(HashingEmbedder::default()))
}

pub fn unified_data_service_with_embedder(
    workspace_id: &str,
    system_id: &str,
    embedder: Arc<dyn Embedder>,
) -> Arc<UnifiedDataService> {
    let key = (workspace_id.to_string(), system_id.to_string());
    let mut guard = registry().lock();
    guard
        .entry(key)
        .or_insert_with(|| Arc::new(UnifiedDataService::new(workspace_id.to_string(), system_id.to_string(), embedder)))
        .clone()
}

/// Clears the memoization table. Called at graceful shutdown.
pub fn clear_registry() {
    registry().lock().clear();
}

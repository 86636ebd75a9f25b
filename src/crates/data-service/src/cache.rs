//! The response cache: `(queryText, graphVersion) -> CacheRecord`, looked up
//! by semantic similarity and scoped to the current graph version.

use crate::embedding::{cosine_similarity, Embedder};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// §9 Open Question: the source used both 3600s and 3,600,000ms TTLs in
/// different paths. We fix a single resolution: seconds.
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Similarity floor for a cache hit.
pub const SIMILARITY_THRESHOLD: f32 = 0.85;

#[derive(Debug, Clone)]
pub struct CacheRecord {
    pub query_text: String,
    pub graph_version: u64,
    pub response: String,
    pub operations: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub embedding: Vec<f32>,
}

impl CacheRecord {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age.num_seconds() >= self.ttl_secs as i64
    }
}

/// Stores cache records grouped by graph version so a lookup only scans
/// entries from the version the caller is asking about; a stale version
/// is always a miss.
pub struct ResponseCache {
    embedder: Arc<dyn Embedder>,
    by_version: parking_lot::Mutex<HashMap<u64, Vec<CacheRecord>>>,
}

impl ResponseCache {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            by_version: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Look up a cached response for `query` at `graph_version`. Expired
    /// records encountered during the scan are pruned. Returns the first
    /// record at or above the similarity threshold; ties favor the most
    /// recently stored record (last in the bucket).
    pub fn check(&self, query: &str, graph_version: u64) -> Option<CacheRecord> {
        let query_embedding = self.embedder.embed(query);
        let now = Utc::now();
        let mut guard = self.by_version.lock();
        let bucket = guard.get_mut(&graph_version)?;
        bucket.retain(|r| !r.is_expired(now));

        bucket
            .iter()
            .rev()
            .find(|r| cosine_similarity(&r.embedding, &query_embedding) >= SIMILARITY_THRESHOLD)
            .cloned()
    }

    /// Store a response, computing its embedding on first storage of this
    /// `(query, graph_version)` pair.
    pub fn store(&self, query: &str, graph_version: u64, response: String, operations: Option<String>) {
        self.store_with_ttl(query, graph_version, response, operations, DEFAULT_TTL_SECS);
    }

    pub fn store_with_ttl(
        &self,
        query: &str,
        graph_version: u64,
        response: String,
        operations: Option<String>,
        ttl_secs: u64,
    ) {
        let embedding = self.embedder.embed(query);
        let record = CacheRecord {
            query_text: query.to_string(),
            graph_version,
            response,
            operations,
            created_at: Utc::now(),
            ttl_secs,
            embedding,
        };
        self.by_version.lock().entry(graph_version).or_default().push(record);
    }

    /// Number of live (version, record) pairs, for diagnostics.
    pub fn len(&self) -> usize {
        self.by_version.lock().values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

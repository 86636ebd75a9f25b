//! Episodic memory: an append-only log of what an agent tried, whether it
//! worked, and why.

use crate::embedding::{cosine_similarity, Embedder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub agent_id: String,
    pub task: String,
    pub success: bool,
    pub output: Value,
    pub critique: String,
    pub timestamp: DateTime<Utc>,
}

pub struct EpisodicMemory {
    embedder: Arc<dyn Embedder>,
    episodes: parking_lot::Mutex<Vec<Episode>>,
}

impl EpisodicMemory {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            episodes: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self, agent_id: impl Into<String>, task: impl Into<String>, success: bool, output: Value, critique: impl Into<String>) {
        self.episodes.lock().push(Episode {
            agent_id: agent_id.into(),
            task: task.into(),
            success,
            output,
            critique: critique.into(),
            timestamp: Utc::now(),
        });
    }

    /// Last `limit` episodes for `agent_id`, newest first. When `task` is
    /// given, episodes are ranked by similarity to `task` instead of
    /// recency (ties broken by recency).
    pub fn load_context(&self, agent_id: &str, task: Option<&str>, limit: usize) -> Vec<Episode> {
        let guard = self.episodes.lock();
        let mut matching: Vec<&Episode> = guard.iter().filter(|e| e.agent_id == agent_id).collect();

        match task {
            None => {
                matching.reverse();
                matching.into_iter().take(limit).cloned().collect()
            }
            Some(task) => {
                let task_embedding = self.embedder.embed(task);
                let mut scored: Vec<(f32, usize, &Episode)> = matching
                    .into_iter()
                    .enumerate()
                    .map(|(i, e)| (cosine_similarity(&self.embedder.embed(&e.task), &task_embedding), i, e))
                    .collect();
                scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap().then(b.1.cmp(&a.1)));
                scored.into_iter().take(limit).map(|(_, _, e)| e.clone()).collect()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.episodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

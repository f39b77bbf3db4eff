//! In-process persisted memory store.
//!
//! Follows the same snapshot pattern as `sa_sessions::SessionStore`: state
//! lives in an `RwLock<HashMap<..>>`, loaded from a JSON file at startup and
//! written back on `flush()`. Conversation turns and traces are one file per
//! kind; long-term memory entries share a single file since they're searched
//! as one pool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use sa_domain::config::MemoryStoreConfig;
use sa_domain::error::{Error, Result};
use sa_domain::memory::{MemoryEntry, MemoryType, ScoredMemory, SearchFilters};
use sa_domain::trace::TraceEvent;
use sa_domain::turn::{ConversationTurn, Trace};

use crate::embedding::{cosine_similarity, Embedder};

/// A user-facing session handle (spec §3 `Session`), one-to-one with a
/// conversation but addressable independently so a session can be resumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Session {
    /// Derive a title from the first user message, truncated to 50 chars.
    pub fn derive_title(first_user_message: &str) -> String {
        let trimmed = first_user_message.trim();
        if trimmed.chars().count() <= 50 {
            trimmed.to_owned()
        } else {
            let truncated: String = trimmed.chars().take(50).collect();
            truncated
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    turns: HashMap<String, Vec<ConversationTurn>>,
    sessions: HashMap<String, Session>,
    traces: HashMap<String, Trace>,
    memories: Vec<MemoryEntry>,
}

pub struct MemoryStore {
    config: MemoryStoreConfig,
    path: PathBuf,
    turns: RwLock<HashMap<String, Vec<ConversationTurn>>>,
    sessions: RwLock<HashMap<String, Session>>,
    traces: RwLock<HashMap<String, Trace>>,
    memories: RwLock<Vec<MemoryEntry>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl MemoryStore {
    pub fn open(config: MemoryStoreConfig, embedder: Option<Arc<dyn Embedder>>) -> Result<Self> {
        std::fs::create_dir_all(&config.db_path).map_err(Error::Io)?;
        let path = config.db_path.join("memory_store.json");

        let snapshot: Snapshot = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            Snapshot::default()
        };

        tracing::info!(
            turns_convs = snapshot.turns.len(),
            sessions = snapshot.sessions.len(),
            traces = snapshot.traces.len(),
            memories = snapshot.memories.len(),
            path = %path.display(),
            "memory store loaded"
        );

        Ok(Self {
            config,
            path,
            turns: RwLock::new(snapshot.turns),
            sessions: RwLock::new(snapshot.sessions),
            traces: RwLock::new(snapshot.traces),
            memories: RwLock::new(snapshot.memories),
            embedder,
        })
    }

    pub fn flush(&self) -> Result<()> {
        let snapshot = Snapshot {
            turns: self.turns.read().clone(),
            sessions: self.sessions.read().clone(),
            traces: self.traces.read().clone(),
            memories: self.memories.read().clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::Memory(format!("serializing snapshot: {e}")))?;
        std::fs::write(&self.path, json).map_err(Error::Io)
    }

    // ── Turns ────────────────────────────────────────────────────────

    pub fn add_turn(&self, conv_id: &str, turn: ConversationTurn) -> Result<()> {
        self.turns
            .write()
            .entry(conv_id.to_owned())
            .or_default()
            .push(turn);
        self.flush()
    }

    /// Ordered by `created_at` ascending; `limit` caps the *most recent* N.
    pub fn get_history(&self, conv_id: &str, limit: Option<usize>) -> Vec<ConversationTurn> {
        let turns = self.turns.read();
        let Some(all) = turns.get(conv_id) else {
            return Vec::new();
        };
        match limit {
            Some(n) if all.len() > n => all[all.len() - n..].to_vec(),
            _ => all.clone(),
        }
    }

    // ── Sessions ─────────────────────────────────────────────────────

    pub fn save_session(&self, session: Session) -> Result<()> {
        self.sessions.write().insert(session.id.clone(), session);
        self.flush()
    }

    pub fn get_session_by_id(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    pub fn list_sessions(&self) -> Vec<Session> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn delete_session(&self, id: &str) -> Result<()> {
        self.sessions.write().remove(id);
        self.flush()
    }

    // ── Traces ───────────────────────────────────────────────────────

    pub fn add_trace(&self, trace: Trace) -> Result<()> {
        self.traces.write().insert(trace.id.clone(), trace);
        self.flush()
    }

    pub fn get_trace(&self, id: &str) -> Option<Trace> {
        self.traces.read().get(id).cloned()
    }

    pub fn get_traces(&self, limit: Option<usize>, offset: Option<usize>) -> Vec<Trace> {
        let traces = self.traces.read();
        let mut all: Vec<Trace> = traces.values().cloned().collect();
        all.sort_by_key(|t| t.created_at);
        all.reverse();
        let offset = offset.unwrap_or(0);
        let all: Vec<Trace> = all.into_iter().skip(offset).collect();
        match limit {
            Some(n) => all.into_iter().take(n).collect(),
            None => all,
        }
    }

    // ── Long-term memory ─────────────────────────────────────────────

    /// Insert a new memory entry. Rejects embeddings whose dimension doesn't
    /// match this store's configured `embedding_dim` (spec §9 open question:
    /// reject rather than silently re-embed or truncate).
    pub fn add(&self, mut entry: MemoryEntry) -> Result<MemoryEntry> {
        if let Some(emb) = &entry.embedding {
            if emb.len() != self.config.embedding_dim {
                return Err(Error::Memory(format!(
                    "embedding dimension mismatch: got {}, store expects {}",
                    emb.len(),
                    self.config.embedding_dim
                )));
            }
        }
        entry.importance = MemoryEntry::clamp_importance(entry.importance);
        if entry.id.is_empty() {
            entry.id = uuid::Uuid::new_v4().to_string();
        }
        self.memories.write().push(entry.clone());
        self.flush()?;

        TraceEvent::MemoryAdded {
            memory_id: entry.id.clone(),
            memory_type: entry.memory_type.as_str().to_owned(),
            importance: entry.importance,
        }
        .emit();

        Ok(entry)
    }

    pub fn get(&self, id: &str) -> Option<MemoryEntry> {
        let mut memories = self.memories.write();
        let entry = memories.iter_mut().find(|m| m.id == id)?;
        entry.accessed_at = Utc::now().max(entry.accessed_at);
        entry.access_count += 1;
        Some(entry.clone())
    }

    pub fn update(&self, id: &str, content: Option<String>, importance: Option<f32>) -> Result<Option<MemoryEntry>> {
        let mut memories = self.memories.write();
        let Some(entry) = memories.iter_mut().find(|m| m.id == id) else {
            return Ok(None);
        };
        if let Some(c) = content {
            entry.content = c;
        }
        if let Some(i) = importance {
            entry.importance = MemoryEntry::clamp_importance(i);
        }
        let out = entry.clone();
        drop(memories);
        self.flush()?;
        Ok(Some(out))
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.memories.write().retain(|m| m.id != id);
        self.flush()
    }

    /// Weighted hybrid ranking: `score = w_sem*semantic + w_rec*recency + w_imp*importance`.
    /// Search failures in callers should be caught — this function itself
    /// never panics and returns an empty vec on internal embedding errors.
    pub fn search(
        &self,
        query: &str,
        filters: SearchFilters,
        limit: Option<usize>,
        threshold: Option<f32>,
    ) -> Vec<ScoredMemory> {
        let weights = self.config.weights;
        let limit = limit.unwrap_or(self.config.search_limit_default);
        let threshold = threshold.unwrap_or(0.0);

        let query_embedding = self.embedder.as_ref().map(|e| {
            e.embed(std::slice::from_ref(&query.to_owned()))
                .into_iter()
                .next()
                .unwrap_or_default()
        });

        let memories = self.memories.read();
        let now = Utc::now();
        let mut scored: Vec<ScoredMemory> = memories
            .iter()
            .filter(|m| {
                filters
                    .memory_type
                    .map(|t| t == m.memory_type)
                    .unwrap_or(true)
            })
            .filter(|m| filters.min_importance.map(|mi| m.importance >= mi).unwrap_or(true))
            .map(|m| {
                let semantic = match (&query_embedding, &m.embedding) {
                    (Some(q), Some(stored)) if q.len() == stored.len() && !q.is_empty() => {
                        cosine_similarity(q, stored)
                    }
                    _ => 0.0,
                };
                let age_seconds = (now - m.created_at).num_seconds().max(0) as f32;
                let half_life_seconds = 7.0 * 86400.0;
                let lambda = std::f32::consts::LN_2 / half_life_seconds;
                let recency = (-lambda * age_seconds).exp().clamp(0.0, 1.0);

                let score = weights.semantic * semantic
                    + weights.recency * recency
                    + weights.importance * m.importance;

                ScoredMemory {
                    entry: m.clone(),
                    score,
                }
            })
            .filter(|s| s.score >= threshold)
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        TraceEvent::MemorySearch {
            query_chars: query.len(),
            results: scored.len(),
            used_embedding: query_embedding.is_some(),
        }
        .emit();

        scored
    }

    /// Returns the single nearest existing entry of the same type above
    /// `threshold`, or `None`. Used for dedup on insert (spec §4.B/§4.H).
    pub fn find_similar(&self, content: &str, memory_type: MemoryType, threshold: f32) -> Option<MemoryEntry> {
        let embedder = self.embedder.as_ref()?;
        let query_vec = embedder
            .embed(std::slice::from_ref(&content.to_owned()))
            .into_iter()
            .next()?;

        let memories = self.memories.read();
        memories
            .iter()
            .filter(|m| m.memory_type == memory_type)
            .filter_map(|m| {
                let stored = m.embedding.as_ref()?;
                if stored.len() != query_vec.len() {
                    return None;
                }
                let sim = cosine_similarity(&query_vec, stored);
                (sim >= threshold).then_some((m.clone(), sim))
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(m, _)| m)
    }

    pub fn embedder(&self) -> Option<Arc<dyn Embedder>> {
        self.embedder.clone()
    }

    pub fn embedding_dim(&self) -> usize {
        self.config.embedding_dim
    }

    pub fn config(&self) -> &MemoryStoreConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::BagOfWordsEmbedder;

    fn store_with_embedder(dir: &Path) -> MemoryStore {
        let embedder: Arc<dyn Embedder> = Arc::new(BagOfWordsEmbedder::new(64));
        let cfg = MemoryStoreConfig {
            db_path: dir.to_path_buf(),
            embedding_dim: 64,
            ..MemoryStoreConfig::default()
        };
        MemoryStore::open(cfg, Some(embedder)).unwrap()
    }

    fn new_entry(memory_type: MemoryType, content: &str, importance: f32, embedding: Option<Vec<f32>>) -> MemoryEntry {
        let now = Utc::now();
        MemoryEntry {
            id: String::new(),
            memory_type,
            content: content.to_owned(),
            importance,
            embedding,
            created_at: now,
            accessed_at: now,
            access_count: 0,
            source_turn_id: None,
        }
    }

    #[test]
    fn add_turn_and_get_history_ordered() {
        let tmp = tempfile_dir();
        let cfg = MemoryStoreConfig {
            db_path: tmp.clone(),
            ..MemoryStoreConfig::default()
        };
        let store = MemoryStore::open(cfg, None).unwrap();
        for i in 0..3 {
            store
                .add_turn(
                    "c1",
                    ConversationTurn {
                        id: format!("t{i}"),
                        conversation_id: "c1".into(),
                        role: sa_domain::tool::Role::User,
                        content: format!("msg {i}"),
                        tool_calls: None,
                        tool_results: None,
                        usage: Default::default(),
                        trace_id: None,
                        created_at: Utc::now(),
                    },
                )
                .unwrap();
        }
        let history = store.get_history("c1", None);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].id, "t0");
        let limited = store.get_history("c1", Some(2));
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, "t1");
    }

    #[test]
    fn importance_is_clamped_on_insert() {
        let tmp = tempfile_dir();
        let store = store_with_embedder(&tmp);
        let e = store
            .add(new_entry(MemoryType::Fact, "x", 5.0, Some(vec![0.0; 64])))
            .unwrap();
        assert_eq!(e.importance, 1.0);
        let e2 = store
            .add(new_entry(MemoryType::Fact, "y", -5.0, Some(vec![0.0; 64])))
            .unwrap();
        assert_eq!(e2.importance, 0.0);
    }

    #[test]
    fn embedding_dimension_mismatch_is_rejected() {
        let tmp = tempfile_dir();
        let store = store_with_embedder(&tmp);
        let result = store.add(new_entry(MemoryType::Fact, "x", 0.5, Some(vec![0.0; 8])));
        assert!(result.is_err());
    }

    #[test]
    fn find_similar_returns_nearest_above_threshold() {
        let tmp = tempfile_dir();
        let store = store_with_embedder(&tmp);
        let embedder = store.embedder().unwrap();
        let v = embedder.embed(&["User lives in Beijing".to_owned()]).remove(0);
        store
            .add(new_entry(MemoryType::Fact, "User lives in Beijing", 0.6, Some(v)))
            .unwrap();

        let found = store.find_similar("User is based in Beijing", MemoryType::Fact, 0.3);
        assert!(found.is_some());

        let not_found = store.find_similar("completely unrelated text about rockets", MemoryType::Fact, 0.9);
        assert!(not_found.is_none());
    }

    #[test]
    fn search_without_embedder_degrades_to_recency_and_importance() {
        let tmp = tempfile_dir();
        let cfg = MemoryStoreConfig {
            db_path: tmp,
            ..MemoryStoreConfig::default()
        };
        let store = MemoryStore::open(cfg, None).unwrap();
        store.add(new_entry(MemoryType::Fact, "a", 0.9, None)).unwrap();
        store.add(new_entry(MemoryType::Fact, "b", 0.1, None)).unwrap();
        let results = store.search("anything", SearchFilters::default(), None, None);
        assert_eq!(results.len(), 2);
        assert!(results[0].entry.importance >= results[1].entry.importance);
    }

    fn tempfile_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("sa-memory-test-{}", uuid::Uuid::new_v4()));
        dir
    }
}

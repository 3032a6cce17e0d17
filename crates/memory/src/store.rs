//! The incident store: persisted problem/solution pairs with similarity search.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::collection::{Collection, StoredIncident};
use crate::embedding::{cosine_distance, Embedder};
use crate::error::{MemoryError, MemoryResult};
use crate::record::{validate_metadata, IncidentRecord, Metadata, SimilarIncident, ID_PREFIX};

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "k8s_problems";

/// Default persistence directory.
pub const DEFAULT_PERSIST_DIR: &str = "./data/incidents";

/// Where and under which name a collection lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub persist_dir: PathBuf,
    pub collection_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from(DEFAULT_PERSIST_DIR),
            collection_name: DEFAULT_COLLECTION.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn new(persist_dir: impl Into<PathBuf>) -> Self {
        Self {
            persist_dir: persist_dir.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_collection(mut self, name: impl Into<String>) -> Self {
        self.collection_name = name.into();
        self
    }

    /// Path of the collection file.
    pub fn collection_path(&self) -> PathBuf {
        self.persist_dir
            .join(format!("{}.json", self.collection_name))
    }
}

/// Persistent, embedding-indexed memory of past incidents.
///
/// All mutations hold the write lock across embed, persist and swap, so
/// concurrent inserts never hand out the same ID. A failed write leaves the
/// in-memory view untouched.
pub struct IncidentStore {
    config: StoreConfig,
    path: PathBuf,
    embedder: Arc<dyn Embedder>,
    state: RwLock<Collection>,
}

impl std::fmt::Debug for IncidentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncidentStore")
            .field("config", &self.config)
            .field("embedding_model", &self.embedder.model_id())
            .finish_non_exhaustive()
    }
}

impl IncidentStore {
    /// Open (or create) the configured collection.
    pub async fn open(config: StoreConfig, embedder: Arc<dyn Embedder>) -> MemoryResult<Self> {
        if config.collection_name.trim().is_empty() {
            return Err(MemoryError::InvalidInput(
                "collection name must not be empty".to_string(),
            ));
        }

        tokio::fs::create_dir_all(&config.persist_dir)
            .await
            .map_err(|source| MemoryError::Io {
                path: config.persist_dir.display().to_string(),
                source,
            })?;

        let path = config.collection_path();
        let collection = match Collection::load(&path).await? {
            Some(existing) => {
                if existing.embedding_model != embedder.model_id() {
                    return Err(MemoryError::ModelMismatch {
                        collection: config.collection_name.clone(),
                        stored: existing.embedding_model,
                        configured: embedder.model_id().to_string(),
                    });
                }
                info!(
                    collection = %config.collection_name,
                    records = existing.records.len(),
                    "Opened incident store"
                );
                existing
            }
            None => {
                let fresh = Collection::empty(&config.collection_name, embedder.model_id());
                fresh.save(&path).await.map_err(|source| MemoryError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                info!(collection = %config.collection_name, "Created incident store");
                fresh
            }
        };

        Ok(Self {
            config,
            path,
            embedder,
            state: RwLock::new(collection),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Location of the collection file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_id()
    }

    /// Store a problem and its solution; returns the assigned ID.
    pub async fn add(
        &self,
        problem_description: &str,
        solution: &str,
        metadata: Metadata,
    ) -> MemoryResult<String> {
        if problem_description.trim().is_empty() {
            return Err(MemoryError::InvalidInput(
                "problem description must not be empty".to_string(),
            ));
        }
        if solution.trim().is_empty() {
            return Err(MemoryError::InvalidInput(
                "solution must not be empty".to_string(),
            ));
        }
        validate_metadata(&metadata).map_err(MemoryError::InvalidInput)?;

        let mut state = self.state.write().await;

        let embedding = self
            .embedder
            .embed(problem_description)
            .await
            .map_err(|e| MemoryError::Write(e.to_string()))?;

        let id = format!("{ID_PREFIX}_{}", state.next_id);
        let mut next = state.clone();
        next.next_id += 1;
        next.records.push(StoredIncident {
            record: IncidentRecord {
                id: id.clone(),
                problem_description: problem_description.to_string(),
                solution: solution.to_string(),
                metadata,
                created_at: Utc::now(),
            },
            embedding,
        });

        self.persist(&next).await?;
        *state = next;

        info!(id = %id, "Stored incident");
        Ok(id)
    }

    /// Past incidents similar to `query`, best match first.
    ///
    /// Similarity is `1 - d/2` over cosine distance `d`; only hits with
    /// similarity at or above `threshold` are returned. Equal scores keep
    /// insertion order.
    pub async fn find_similar(
        &self,
        query: &str,
        max_results: usize,
        threshold: f32,
    ) -> MemoryResult<Vec<SimilarIncident>> {
        if query.trim().is_empty() {
            return Err(MemoryError::InvalidInput(
                "query must not be empty".to_string(),
            ));
        }
        if max_results == 0 {
            return Err(MemoryError::InvalidInput(
                "max_results must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(MemoryError::InvalidInput(format!(
                "threshold must be within [0, 1], got {threshold}"
            )));
        }

        let state = self.state.read().await;
        if state.records.is_empty() {
            debug!("Incident store is empty, skipping similarity search");
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| MemoryError::Query(e.to_string()))?;

        // A zero vector has no direction, so it is similar to nothing
        if query_vec.iter().all(|x| *x == 0.0) {
            debug!("Query embedded to a zero vector, no similar incidents");
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, &StoredIncident)> = state
            .records
            .iter()
            .map(|stored| {
                let distance = cosine_distance(&query_vec, &stored.embedding);
                ((1.0 - distance / 2.0).clamp(0.0, 1.0), stored)
            })
            .collect();

        // sort_by is stable, so ties stay in insertion order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(max_results)
            .filter(|(similarity, _)| *similarity >= threshold)
            .map(|(similarity, stored)| SimilarIncident {
                id: stored.record.id.clone(),
                problem: stored.record.problem_description.clone(),
                solution: stored.record.solution.clone(),
                similarity,
                metadata: stored.record.metadata.clone(),
            })
            .collect())
    }

    /// Every stored record, in insertion order.
    pub async fn list_all(&self) -> Vec<IncidentRecord> {
        let state = self.state.read().await;
        state.records.iter().map(|s| s.record.clone()).collect()
    }

    /// Look up one record by ID.
    pub async fn get(&self, id: &str) -> Option<IncidentRecord> {
        let state = self.state.read().await;
        state
            .records
            .iter()
            .find(|s| s.record.id == id)
            .map(|s| s.record.clone())
    }

    /// Remove a record. Returns whether anything was removed.
    pub async fn delete(&self, id: &str) -> MemoryResult<bool> {
        let mut state = self.state.write().await;
        let Some(index) = state.records.iter().position(|s| s.record.id == id) else {
            debug!(id = %id, "Delete of unknown incident ignored");
            return Ok(false);
        };

        let mut next = state.clone();
        next.records.remove(index);
        self.persist(&next).await?;
        *state = next;

        info!(id = %id, "Deleted incident");
        Ok(true)
    }

    /// Drop the whole collection and start over with an empty one.
    ///
    /// The ID counter restarts at 1. If the empty collection cannot be
    /// written the store is still empty in memory; the next successful write
    /// recreates the file.
    pub async fn clear_all(&self) -> MemoryResult<()> {
        let mut state = self.state.write().await;

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(MemoryError::Write(e.to_string())),
        }

        // The old file is gone, so the old records must not be served or written back
        *state = Collection::empty(&self.config.collection_name, self.embedder.model_id());
        if let Err(e) = self.persist(&state).await {
            warn!(error = %e, "Collection removed but could not be recreated");
            return Err(e);
        }

        info!(collection = %self.config.collection_name, "Cleared incident store");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }

    async fn persist(&self, collection: &Collection) -> MemoryResult<()> {
        collection
            .save(&self.path)
            .await
            .map_err(|e| MemoryError::Write(format!("{}: {e}", self.path.display())))
    }
}

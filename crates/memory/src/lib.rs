//! Incident memory for the cluster monitor.
//!
//! Stores problem descriptions together with the solution that fixed them and
//! answers "have we seen something like this before?" via embedding
//! similarity. Collections are persisted as a single JSON file per name under
//! a configurable directory and survive restarts.
//!
//! Two embedders ship with the crate:
//!
//! - [`HashingEmbedder`]: deterministic local feature hashing, no network
//! - [`HttpEmbedder`]: any OpenAI-compatible `/embeddings` endpoint
//!
//! A collection remembers which embedder built it; reopening it with a
//! different one fails with [`MemoryError::ModelMismatch`].

pub mod collection;
pub mod embedding;
pub mod error;
pub mod record;
pub mod store;

pub use collection::DISTANCE_COSINE;
pub use embedding::{cosine_distance, Embedder, HashingEmbedder, HttpEmbedder, DEFAULT_DIMENSION};
pub use error::{EmbeddingError, MemoryError, MemoryResult};
pub use record::{IncidentRecord, Metadata, SimilarIncident};
pub use store::{IncidentStore, StoreConfig, DEFAULT_COLLECTION, DEFAULT_PERSIST_DIR};

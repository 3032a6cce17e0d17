//! On-disk collection format.
//!
//! One JSON document per collection holds the embedding model identity, the
//! distance metric, the next ID to hand out and every record with its vector.
//! Writes go to a sibling temp file that is renamed over the target.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{MemoryError, MemoryResult};
use crate::record::IncidentRecord;

/// Distance metric recorded with every collection.
pub const DISTANCE_COSINE: &str = "cosine";

/// A record together with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredIncident {
    #[serde(flatten)]
    pub record: IncidentRecord,
    pub embedding: Vec<f32>,
}

/// Persisted collection state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Collection {
    pub name: String,
    pub embedding_model: String,
    pub distance: String,
    /// Number handed to the next insert; only ever grows
    pub next_id: u64,
    #[serde(default)]
    pub records: Vec<StoredIncident>,
}

impl Collection {
    pub fn empty(name: &str, embedding_model: &str) -> Self {
        Self {
            name: name.to_string(),
            embedding_model: embedding_model.to_string(),
            distance: DISTANCE_COSINE.to_string(),
            next_id: 1,
            records: Vec::new(),
        }
    }

    /// Load a collection file, or `None` when it does not exist.
    pub async fn load(path: &Path) -> MemoryResult<Option<Self>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(MemoryError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let collection: Self =
            serde_json::from_str(&content).map_err(|e| MemoryError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        // Guard against hand-edited files whose counter lags behind the IDs.
        let highest = collection
            .records
            .iter()
            .filter_map(|r| parse_sequence(&r.record.id))
            .max()
            .unwrap_or(0);
        if collection.next_id <= highest {
            return Err(MemoryError::Corrupt {
                path: path.display().to_string(),
                reason: format!(
                    "next_id {} does not exceed highest stored id {highest}",
                    collection.next_id
                ),
            });
        }

        Ok(Some(collection))
    }

    /// Persist atomically (write temp file, then rename).
    pub async fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let tmp = temp_path(path);
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, path).await
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Numeric part of a `problem_<n>` ID.
pub(crate) fn parse_sequence(id: &str) -> Option<u64> {
    id.rsplit_once('_').and_then(|(_, n)| n.parse().ok())
}

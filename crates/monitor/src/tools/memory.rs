//! Incident memory tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::error;

use incident_memory::{IncidentStore, Metadata};

use super::{parse_args, Tool};

/// Default number of hits for `find_similar_problems`.
pub const DEFAULT_RESULTS: usize = 3;

/// Default similarity cut-off for `find_similar_problems`.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

#[derive(Debug, Deserialize)]
struct AddProblemArgs {
    problem_description: String,
    solution: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct FindSimilarArgs {
    query: String,
    #[serde(default = "default_results")]
    n_results: usize,
    #[serde(default = "default_threshold")]
    similarity_threshold: f32,
}

const fn default_results() -> usize {
    DEFAULT_RESULTS
}

const fn default_threshold() -> f32 {
    DEFAULT_SIMILARITY_THRESHOLD
}

/// `add_problem`
pub struct AddProblem {
    store: Arc<IncidentStore>,
}

impl AddProblem {
    pub fn new(store: Arc<IncidentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddProblem {
    fn name(&self) -> &'static str {
        "add_problem"
    }

    fn description(&self) -> &'static str {
        "Add a problem-solution pair to the incident memory for future reference."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "problem_description": {"type": "string", "description": "Description of the problem"},
                "solution": {"type": "string", "description": "Solution to the problem"},
                "metadata": {
                    "type": "object",
                    "description": "Additional metadata about the problem (string, number or boolean values)",
                    "additionalProperties": {"type": ["string", "number", "boolean"]}
                }
            },
            "required": ["problem_description", "solution"]
        })
    }

    async fn call(&self, args: Value) -> String {
        let args = match parse_args::<AddProblemArgs>(self.name(), args) {
            Ok(args) => args,
            Err(e) => return e,
        };

        match self
            .store
            .add(
                &args.problem_description,
                &args.solution,
                args.metadata.unwrap_or_default(),
            )
            .await
        {
            Ok(id) => format!("Successfully added problem with ID: {id}"),
            Err(e) => {
                error!(error = %e, "Failed to add problem");
                format!("Error adding problem: {e}")
            }
        }
    }
}

/// `find_similar_problems`
pub struct FindSimilarProblems {
    store: Arc<IncidentStore>,
}

impl FindSimilarProblems {
    pub fn new(store: Arc<IncidentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for FindSimilarProblems {
    fn name(&self) -> &'static str {
        "find_similar_problems"
    }

    fn description(&self) -> &'static str {
        "Find previously solved problems similar to the given description."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Problem description to search for"},
                "n_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return",
                    "default": DEFAULT_RESULTS
                },
                "similarity_threshold": {
                    "type": "number",
                    "description": "Minimum similarity score (0-1) for results",
                    "default": DEFAULT_SIMILARITY_THRESHOLD
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, args: Value) -> String {
        let args = match parse_args::<FindSimilarArgs>(self.name(), args) {
            Ok(args) => args,
            Err(e) => return e,
        };

        let hits = match self
            .store
            .find_similar(&args.query, args.n_results, args.similarity_threshold)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                error!(error = %e, "Similarity search failed");
                return format!("Error finding similar problems: {e}");
            }
        };

        if hits.is_empty() {
            return "No similar problems found.".to_string();
        }

        let mut out = String::from("Found similar problems:\n\n");
        for (i, hit) in hits.iter().enumerate() {
            let _ = writeln!(out, "Problem {} (Similarity: {:.2}):", i + 1, hit.similarity);
            let _ = writeln!(out, "Description: {}", hit.problem);
            let _ = writeln!(out, "Solution: {}\n", hit.solution);
        }
        out
    }
}

/// `get_all_problems`
pub struct GetAllProblems {
    store: Arc<IncidentStore>,
}

impl GetAllProblems {
    pub fn new(store: Arc<IncidentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetAllProblems {
    fn name(&self) -> &'static str {
        "get_all_problems"
    }

    fn description(&self) -> &'static str {
        "Get all recorded problems and their solutions."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _args: Value) -> String {
        let records = self.store.list_all().await;
        if records.is_empty() {
            return "No problems found in the incident memory.".to_string();
        }

        let mut out = format!("Found {} problems:\n\n", records.len());
        for (i, record) in records.iter().enumerate() {
            let _ = writeln!(out, "Problem {} (ID: {}):", i + 1, record.id);
            let _ = writeln!(out, "Description: {}", record.problem_description);
            let _ = writeln!(out, "Solution: {}\n", record.solution);
        }
        out
    }
}

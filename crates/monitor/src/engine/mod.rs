//! Reasoning engines.
//!
//! An engine takes a natural-language task plus a [`ToolSet`] and works
//! towards a final textual answer within a bounded number of steps.

pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

use crate::tools::ToolSet;

pub use openai::OpenAiEngine;

/// Step budget of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepLimits {
    /// Model turns allowed before a final answer is forced
    pub max_steps: usize,
    /// A planning instruction is injected every this many steps
    pub planning_interval: usize,
}

impl Default for StepLimits {
    fn default() -> Self {
        Self {
            max_steps: 10,
            planning_interval: 3,
        }
    }
}

impl StepLimits {
    /// Whether the planning instruction precedes `step` (1-based).
    pub const fn plans_at(&self, step: usize) -> bool {
        self.planning_interval > 0 && step.saturating_sub(1) % self.planning_interval == 0
    }
}

/// Errors raised by an engine run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transport-level failure talking to the model API
    #[error("model API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Model API answered with an error
    #[error("model API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Model API answered with something unusable
    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    /// Engine is missing a required setting
    #[error("engine not configured: {0}")]
    NotConfigured(String),
}

/// Produces a final answer for a task, calling tools along the way.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn run(
        &self,
        prompt: &str,
        tools: &ToolSet,
        limits: StepLimits,
    ) -> Result<String, EngineError>;
}

//! Autonomous Kubernetes health agent.
//!
//! The crate wires four collaborators into a monitoring cycle:
//!
//! - [`cluster`]: read-only cluster state via the Kubernetes API, plus the
//!   `kubectl` remediation executor
//! - [`tools`]: the named, schema-described callables a model can invoke
//! - [`engine`]: the reasoning engine abstraction and an OpenAI-compatible
//!   tool-calling implementation
//! - [`agent`]: the cycle driver (`monitor_once` / `monitor_loop`)
//!
//! Incident recall lives in the `incident-memory` crate and alert fan-out in
//! the `notify` crate; both are injected into the tool set.

pub mod agent;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod tools;

pub use agent::{analysis_prompt, CycleError, DriverSettings, MonitoringAgent};
pub use cluster::{ClusterError, ClusterReader, KubeClusterReader, KubectlExecutor};
pub use config::{AgentConfig, ConfigError};
pub use engine::{EngineError, OpenAiEngine, ReasoningEngine, StepLimits};
pub use tools::{standard_tools, Tool, ToolContext, ToolSet};

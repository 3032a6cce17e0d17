//! Tools exposed to the reasoning engine.
//!
//! A tool is a named callable described by a JSON schema. Tools never fail
//! towards the engine: errors come back as `"Error ...: <reason>"` text the
//! model can read and react to.

pub mod cluster;
pub mod memory;
pub mod notification;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use incident_memory::IncidentStore;
use notify::Notifier;

use crate::cluster::{ClusterReader, KubectlExecutor};

/// A callable the engine can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable name the model refers to.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    /// Run the tool; the result is handed back to the model verbatim.
    async fn call(&self, args: Value) -> String;
}

/// Name, description and schema of a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Ordered collection of tools with unique names.
#[derive(Default, Clone)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any earlier tool of the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            warn!(tool = tool.name(), "Replacing already registered tool");
            *existing = tool;
        } else {
            self.tools.push(tool);
        }
    }

    #[must_use]
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name(),
                description: t.description(),
                parameters: t.parameters(),
            })
            .collect()
    }

    /// Invoke a tool by name.
    pub async fn call(&self, name: &str, args: Value) -> String {
        match self.get(name) {
            Some(tool) => {
                debug!(tool = name, "Calling tool");
                tool.call(args).await
            }
            None => {
                warn!(tool = name, "Model requested unknown tool");
                format!("Error: unknown tool '{name}'")
            }
        }
    }
}

/// Collaborators the standard tools operate on.
#[derive(Clone)]
pub struct ToolContext {
    pub cluster: Arc<dyn ClusterReader>,
    /// `None` leaves `kubectl_exec` out of the tool set
    pub executor: Option<Arc<KubectlExecutor>>,
    pub store: Arc<IncidentStore>,
    pub notifier: Arc<Notifier>,
}

/// Every tool the monitoring agent works with.
pub fn standard_tools(ctx: &ToolContext) -> ToolSet {
    let mut set = ToolSet::new()
        .with(Arc::new(cluster::GetNodes::new(ctx.cluster.clone())))
        .with(Arc::new(cluster::GetPods::new(ctx.cluster.clone())))
        .with(Arc::new(cluster::GetEvents::new(ctx.cluster.clone())))
        .with(Arc::new(cluster::DescribePod::new(ctx.cluster.clone())))
        .with(Arc::new(cluster::GetPodLogs::new(ctx.cluster.clone())))
        .with(Arc::new(cluster::AnalyzeClusterState::new(ctx.cluster.clone())));

    if let Some(executor) = &ctx.executor {
        set.register(Arc::new(cluster::KubectlExec::new(executor.clone())));
    }

    set.with(Arc::new(memory::AddProblem::new(ctx.store.clone())))
        .with(Arc::new(memory::FindSimilarProblems::new(ctx.store.clone())))
        .with(Arc::new(memory::GetAllProblems::new(ctx.store.clone())))
        .with(Arc::new(notification::SendNotification::new(ctx.notifier.clone())))
        .with(Arc::new(notification::SendSlackNotification::new(ctx.notifier.clone())))
        .with(Arc::new(notification::SendTeamsNotification::new(ctx.notifier.clone())))
        .with(Arc::new(notification::SendEmailNotification::new(ctx.notifier.clone())))
}

/// Decode a tool's arguments; `null` is treated as an empty object.
pub(crate) fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, String> {
    let args = if args.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| format!("Error: invalid arguments for {tool}: {e}"))
}

/// Pretty JSON for the model, or an error line if serialization fails.
pub(crate) fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("Error: failed to serialize result: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    struct Echo(&'static str);

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &'static str {
            self.0
        }

        fn description(&self) -> &'static str {
            "Echo the arguments back"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn call(&self, args: Value) -> String {
            format!("{}:{args}", self.0)
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_name() {
        let set = ToolSet::new()
            .with(Arc::new(Echo("first")))
            .with(Arc::new(Echo("second")));

        assert_eq!(set.call("second", json!({"a": 1})).await, r#"second:{"a":1}"#);
        assert_eq!(set.call("third", Value::Null).await, "Error: unknown tool 'third'");
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut set = ToolSet::new();
        set.register(Arc::new(Echo("dup")));
        set.register(Arc::new(Echo("dup")));
        assert_eq!(set.len(), 1);
        assert_eq!(set.names(), vec!["dup"]);
    }

    #[test]
    fn test_parse_args_accepts_null() {
        #[derive(Deserialize)]
        struct Args {
            #[serde(default)]
            namespace: Option<String>,
        }

        let args: Args = parse_args("get_pods", Value::Null).unwrap();
        assert!(args.namespace.is_none());

        let err = parse_args::<Args>("get_pods", json!({"namespace": 7})).err().unwrap();
        assert!(err.starts_with("Error: invalid arguments for get_pods"));
    }
}

//! Cluster inspection and remediation tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

use super::{parse_args, to_json, Tool};
use crate::cluster::{ClusterReader, EventSummary, KubectlExecutor};

/// Default number of log lines returned by `get_pod_logs`.
pub const DEFAULT_TAIL_LINES: i64 = 100;

/// Most recent events handed to the model per call.
pub const MAX_EVENTS: usize = 50;

#[derive(Debug, Deserialize)]
struct NamespaceArgs {
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PodArgs {
    pod_name: String,
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PodLogArgs {
    pod_name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default = "default_tail_lines")]
    tail_lines: i64,
}

const fn default_tail_lines() -> i64 {
    DEFAULT_TAIL_LINES
}

fn namespace_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "namespace": {"type": "string", "description": description}
        }
    })
}

/// Newest first, capped at [`MAX_EVENTS`].
fn recent_events(mut events: Vec<EventSummary>) -> Vec<EventSummary> {
    events.sort_by(|a, b| b.last_timestamp.cmp(&a.last_timestamp));
    events.truncate(MAX_EVENTS);
    events
}

async fn render_nodes(cluster: &dyn ClusterReader) -> String {
    match cluster.list_nodes().await {
        Ok(nodes) => to_json(&nodes),
        Err(e) => {
            error!(error = %e, "Failed to list nodes");
            format!("Error getting nodes: {e}")
        }
    }
}

async fn render_pods(cluster: &dyn ClusterReader, namespace: Option<&str>) -> String {
    match cluster.list_pods(namespace).await {
        Ok(pods) => to_json(&pods),
        Err(e) => {
            error!(error = %e, namespace = ?namespace, "Failed to list pods");
            format!("Error getting pods: {e}")
        }
    }
}

async fn render_events(cluster: &dyn ClusterReader, namespace: Option<&str>) -> String {
    match cluster.list_events(namespace).await {
        Ok(events) => to_json(&recent_events(events)),
        Err(e) => {
            error!(error = %e, namespace = ?namespace, "Failed to list events");
            format!("Error getting events: {e}")
        }
    }
}

/// `get_nodes`
pub struct GetNodes {
    cluster: Arc<dyn ClusterReader>,
}

impl GetNodes {
    pub fn new(cluster: Arc<dyn ClusterReader>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl Tool for GetNodes {
    fn name(&self) -> &'static str {
        "get_nodes"
    }

    fn description(&self) -> &'static str {
        "Get information about all nodes in the Kubernetes cluster."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _args: Value) -> String {
        render_nodes(self.cluster.as_ref()).await
    }
}

/// `get_pods`
pub struct GetPods {
    cluster: Arc<dyn ClusterReader>,
}

impl GetPods {
    pub fn new(cluster: Arc<dyn ClusterReader>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl Tool for GetPods {
    fn name(&self) -> &'static str {
        "get_pods"
    }

    fn description(&self) -> &'static str {
        "Get information about pods in the specified namespace, or in all namespaces when none is given."
    }

    fn parameters(&self) -> Value {
        namespace_schema("Kubernetes namespace (omit for all namespaces)")
    }

    async fn call(&self, args: Value) -> String {
        match parse_args::<NamespaceArgs>(self.name(), args) {
            Ok(args) => render_pods(self.cluster.as_ref(), args.namespace.as_deref()).await,
            Err(e) => e,
        }
    }
}

/// `get_events`
pub struct GetEvents {
    cluster: Arc<dyn ClusterReader>,
}

impl GetEvents {
    pub fn new(cluster: Arc<dyn ClusterReader>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl Tool for GetEvents {
    fn name(&self) -> &'static str {
        "get_events"
    }

    fn description(&self) -> &'static str {
        "Get recent events from the specified namespace, or from all namespaces when none is given."
    }

    fn parameters(&self) -> Value {
        namespace_schema("Kubernetes namespace (omit for all namespaces)")
    }

    async fn call(&self, args: Value) -> String {
        match parse_args::<NamespaceArgs>(self.name(), args) {
            Ok(args) => render_events(self.cluster.as_ref(), args.namespace.as_deref()).await,
            Err(e) => e,
        }
    }
}

/// `describe_pod`
pub struct DescribePod {
    cluster: Arc<dyn ClusterReader>,
}

impl DescribePod {
    pub fn new(cluster: Arc<dyn ClusterReader>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl Tool for DescribePod {
    fn name(&self) -> &'static str {
        "describe_pod"
    }

    fn description(&self) -> &'static str {
        "Get detailed information about a specific pod."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pod_name": {"type": "string", "description": "Name of the pod"},
                "namespace": {"type": "string", "description": "Kubernetes namespace"}
            },
            "required": ["pod_name"]
        })
    }

    async fn call(&self, args: Value) -> String {
        let args = match parse_args::<PodArgs>(self.name(), args) {
            Ok(args) => args,
            Err(e) => return e,
        };

        match self
            .cluster
            .describe_pod(&args.pod_name, args.namespace.as_deref())
            .await
        {
            Ok(detail) => to_json(&detail),
            Err(e) => {
                error!(pod = %args.pod_name, error = %e, "Failed to describe pod");
                format!("Error describing pod {}: {e}", args.pod_name)
            }
        }
    }
}

/// `get_pod_logs`
pub struct GetPodLogs {
    cluster: Arc<dyn ClusterReader>,
}

impl GetPodLogs {
    pub fn new(cluster: Arc<dyn ClusterReader>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl Tool for GetPodLogs {
    fn name(&self) -> &'static str {
        "get_pod_logs"
    }

    fn description(&self) -> &'static str {
        "Get logs from a specific pod."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pod_name": {"type": "string", "description": "Name of the pod"},
                "namespace": {"type": "string", "description": "Kubernetes namespace"},
                "tail_lines": {
                    "type": "integer",
                    "description": "Number of lines to return from the end of the logs",
                    "default": DEFAULT_TAIL_LINES
                }
            },
            "required": ["pod_name"]
        })
    }

    async fn call(&self, args: Value) -> String {
        let args = match parse_args::<PodLogArgs>(self.name(), args) {
            Ok(args) => args,
            Err(e) => return e,
        };

        match self
            .cluster
            .pod_logs(&args.pod_name, args.namespace.as_deref(), args.tail_lines.max(1))
            .await
        {
            Ok(logs) if logs.is_empty() => format!("No logs available for pod {}", args.pod_name),
            Ok(logs) => logs,
            Err(e) => {
                error!(pod = %args.pod_name, error = %e, "Failed to fetch pod logs");
                format!("Error getting logs for pod {}: {e}", args.pod_name)
            }
        }
    }
}

/// `analyze_cluster_state`: nodes, pods and events in one report.
pub struct AnalyzeClusterState {
    cluster: Arc<dyn ClusterReader>,
}

impl AnalyzeClusterState {
    pub fn new(cluster: Arc<dyn ClusterReader>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl Tool for AnalyzeClusterState {
    fn name(&self) -> &'static str {
        "analyze_cluster_state"
    }

    fn description(&self) -> &'static str {
        "Gather the current state of the Kubernetes cluster: nodes, pods and recent events across all namespaces."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _args: Value) -> String {
        let cluster = self.cluster.as_ref();
        let nodes = render_nodes(cluster).await;
        let pods = render_pods(cluster, None).await;
        let events = render_events(cluster, None).await;

        format!(
            "=== Kubernetes Cluster State ===\n\n\
             === Nodes ===\n{nodes}\n\n\
             === Pods ===\n{pods}\n\n\
             === Events ===\n{events}\n"
        )
    }
}

#[derive(Debug, Deserialize)]
struct KubectlArgs {
    command: String,
}

/// `kubectl_exec`: the only tool that can change the cluster.
pub struct KubectlExec {
    executor: Arc<KubectlExecutor>,
}

impl KubectlExec {
    pub fn new(executor: Arc<KubectlExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for KubectlExec {
    fn name(&self) -> &'static str {
        "kubectl_exec"
    }

    fn description(&self) -> &'static str {
        "Executes a kubectl command and returns the output. Pass the arguments without the 'kubectl' prefix."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The kubectl command to execute (without 'kubectl' prefix)"
                }
            },
            "required": ["command"]
        })
    }

    async fn call(&self, args: Value) -> String {
        let args = match parse_args::<KubectlArgs>(self.name(), args) {
            Ok(args) => args,
            Err(e) => return e,
        };

        match self.executor.run(&args.command).await {
            Ok(output) => output,
            Err(e) => {
                error!(command = %args.command, error = %e, "kubectl execution failed");
                format!("Error executing kubectl {}: {e}", args.command)
            }
        }
    }
}

//! Read access to cluster state and the `kubectl` remediation executor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ContainerState, Event, Node, Pod};
use kube::api::{Api, ListParams, LogParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Errors raised while reading the cluster or running `kubectl`.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes API request failed
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Client could not be configured
    #[error("kubernetes client configuration failed: {0}")]
    Config(String),

    /// `kubectl` could not be started
    #[error("failed to run kubectl: {0}")]
    Command(String),
}

/// Condensed node view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub ready: bool,
    /// Type of the most recent condition reported by the kubelet
    pub status: Option<String>,
    /// Conditions other than `Ready` that are currently true
    pub pressure: Vec<String>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub kubelet_version: Option<String>,
}

/// Condensed pod view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodSummary {
    pub name: String,
    pub namespace: Option<String>,
    pub phase: Option<String>,
    pub ready: bool,
    pub restarts: i32,
    pub node: Option<String>,
    /// Waiting/terminated reasons of unhealthy containers (e.g. `CrashLoopBackOff`)
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvolvedObject {
    pub kind: Option<String>,
    pub name: Option<String>,
    pub namespace: Option<String>,
}

/// Condensed event view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSummary {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub count: Option<i32>,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub involved_object: InvolvedObject,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerDetail {
    pub name: String,
    pub image: String,
    pub ready: bool,
    pub restart_count: i32,
    /// `running`, `waiting`, `terminated` or `unknown`
    pub state: String,
    pub reason: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionDetail {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    pub message: Option<String>,
}

/// Detailed pod view, the equivalent of `kubectl describe pod`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodDetail {
    pub name: String,
    pub namespace: Option<String>,
    pub phase: Option<String>,
    pub ip: Option<String>,
    pub node: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub containers: Vec<ContainerDetail>,
    pub conditions: Vec<ConditionDetail>,
}

/// Read-only view of the cluster.
///
/// `namespace = None` means all namespaces for list operations and the
/// reader's default namespace for pod-scoped operations.
#[async_trait]
pub trait ClusterReader: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<NodeSummary>, ClusterError>;

    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<PodSummary>, ClusterError>;

    async fn list_events(&self, namespace: Option<&str>)
        -> Result<Vec<EventSummary>, ClusterError>;

    async fn pod_logs(
        &self,
        name: &str,
        namespace: Option<&str>,
        tail_lines: i64,
    ) -> Result<String, ClusterError>;

    async fn describe_pod(
        &self,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<PodDetail, ClusterError>;
}

// =============================================================================
// kube-rs implementation
// =============================================================================

/// [`ClusterReader`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeClusterReader {
    client: Client,
    default_namespace: String,
}

impl KubeClusterReader {
    pub fn new(client: Client, default_namespace: impl Into<String>) -> Self {
        Self {
            client,
            default_namespace: default_namespace.into(),
        }
    }

    /// Connect using the local kubeconfig (or in-cluster config).
    ///
    /// With `context = Some(..)` that kubeconfig context is selected,
    /// otherwise the current one.
    pub async fn connect(
        context: Option<&str>,
        default_namespace: impl Into<String>,
    ) -> Result<Self, ClusterError> {
        let client = match context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..KubeConfigOptions::default()
                };
                let config = Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| ClusterError::Config(e.to_string()))?;
                Client::try_from(config)?
            }
            None => Client::try_default().await?,
        };

        info!(context = context.unwrap_or("current"), "Connected to Kubernetes API");
        Ok(Self::new(client, default_namespace))
    }

    fn pods(&self, namespace: Option<&str>) -> Api<Pod> {
        Api::namespaced(
            self.client.clone(),
            namespace.unwrap_or(&self.default_namespace),
        )
    }
}

#[async_trait]
impl ClusterReader for KubeClusterReader {
    async fn list_nodes(&self) -> Result<Vec<NodeSummary>, ClusterError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes.list(&ListParams::default()).await?;
        debug!(count = list.items.len(), "Listed nodes");
        Ok(list.items.iter().map(summarize_node).collect())
    }

    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<PodSummary>, ClusterError> {
        let pods: Api<Pod> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let list = pods.list(&ListParams::default()).await?;
        debug!(count = list.items.len(), namespace = ?namespace, "Listed pods");
        Ok(list.items.iter().map(summarize_pod).collect())
    }

    async fn list_events(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<EventSummary>, ClusterError> {
        let events: Api<Event> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let list = events.list(&ListParams::default()).await?;
        debug!(count = list.items.len(), namespace = ?namespace, "Listed events");
        Ok(list.items.iter().map(summarize_event).collect())
    }

    async fn pod_logs(
        &self,
        name: &str,
        namespace: Option<&str>,
        tail_lines: i64,
    ) -> Result<String, ClusterError> {
        let params = LogParams {
            tail_lines: Some(tail_lines),
            ..LogParams::default()
        };
        Ok(self.pods(namespace).logs(name, &params).await?)
    }

    async fn describe_pod(
        &self,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<PodDetail, ClusterError> {
        let pod = self.pods(namespace).get(name).await?;
        Ok(detail_pod(&pod))
    }
}

// =============================================================================
// Conversions
// =============================================================================

pub(crate) fn summarize_node(node: &Node) -> NodeSummary {
    let status = node.status.as_ref();
    let conditions = status
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default();
    let capacity = status.and_then(|s| s.capacity.as_ref());

    NodeSummary {
        name: node.metadata.name.clone().unwrap_or_default(),
        ready: conditions
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == "True"),
        status: conditions.last().map(|c| c.type_.clone()),
        pressure: conditions
            .iter()
            .filter(|c| c.type_ != "Ready" && c.status == "True")
            .map(|c| c.type_.clone())
            .collect(),
        cpu: capacity.and_then(|c| c.get("cpu")).map(|q| q.0.clone()),
        memory: capacity.and_then(|c| c.get("memory")).map(|q| q.0.clone()),
        kubelet_version: status
            .and_then(|s| s.node_info.as_ref())
            .map(|info| info.kubelet_version.clone()),
    }
}

pub(crate) fn summarize_pod(pod: &Pod) -> PodSummary {
    let statuses = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default();

    PodSummary {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod.metadata.namespace.clone(),
        phase: pod.status.as_ref().and_then(|s| s.phase.clone()),
        ready: !statuses.is_empty() && statuses.iter().all(|c| c.ready),
        restarts: statuses.iter().map(|c| c.restart_count).sum(),
        node: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        reasons: statuses
            .iter()
            .filter_map(|c| c.state.as_ref())
            .filter_map(|state| describe_state(state).1)
            .collect(),
    }
}

pub(crate) fn summarize_event(event: &Event) -> EventSummary {
    EventSummary {
        event_type: event.type_.clone(),
        reason: event.reason.clone(),
        message: event.message.clone(),
        count: event.count,
        first_timestamp: event.first_timestamp.as_ref().map(|t| t.0),
        last_timestamp: event.last_timestamp.as_ref().map(|t| t.0),
        involved_object: InvolvedObject {
            kind: event.involved_object.kind.clone(),
            name: event.involved_object.name.clone(),
            namespace: event.involved_object.namespace.clone(),
        },
    }
}

pub(crate) fn detail_pod(pod: &Pod) -> PodDetail {
    let status = pod.status.as_ref();

    let containers = status
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default()
        .iter()
        .map(|c| {
            let (state, reason, message) = match c.state.as_ref() {
                Some(state) => {
                    let (name, reason) = describe_state(state);
                    (name, reason, state_message(state))
                }
                None => ("unknown", None, None),
            };
            ContainerDetail {
                name: c.name.clone(),
                image: c.image.clone(),
                ready: c.ready,
                restart_count: c.restart_count,
                state: state.to_string(),
                reason,
                message,
            }
        })
        .collect();

    let conditions = status
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default()
        .iter()
        .map(|c| ConditionDetail {
            condition_type: c.type_.clone(),
            status: c.status.clone(),
            message: c.message.clone(),
        })
        .collect();

    PodDetail {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod.metadata.namespace.clone(),
        phase: status.and_then(|s| s.phase.clone()),
        ip: status.and_then(|s| s.pod_ip.clone()),
        node: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        start_time: status.and_then(|s| s.start_time.as_ref()).map(|t| t.0),
        containers,
        conditions,
    }
}

/// State name plus the reason for non-running states.
fn describe_state(state: &ContainerState) -> (&'static str, Option<String>) {
    if let Some(waiting) = &state.waiting {
        ("waiting", waiting.reason.clone())
    } else if let Some(terminated) = &state.terminated {
        ("terminated", terminated.reason.clone())
    } else if state.running.is_some() {
        ("running", None)
    } else {
        ("unknown", None)
    }
}

fn state_message(state: &ContainerState) -> Option<String> {
    state
        .waiting
        .as_ref()
        .and_then(|w| w.message.clone())
        .or_else(|| state.terminated.as_ref().and_then(|t| t.message.clone()))
}

// =============================================================================
// kubectl executor
// =============================================================================

/// Runs `kubectl` with caller-supplied arguments.
///
/// Arguments are split on whitespace and passed directly to the process; no
/// shell is involved.
#[derive(Debug, Clone)]
pub struct KubectlExecutor {
    binary: PathBuf,
    context: Option<String>,
}

impl Default for KubectlExecutor {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("kubectl"),
            context: None,
        }
    }
}

impl KubectlExecutor {
    #[must_use]
    pub fn new(context: Option<String>) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    /// Use another executable (tests, wrapped kubectl).
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Arguments passed to the executable for `command`.
    pub fn arguments(&self, command: &str) -> Vec<String> {
        let tokens = command_tokens(command);

        let mut args = Vec::with_capacity(tokens.len() + 2);
        if let Some(context) = &self.context {
            if !tokens.iter().any(|t| t.starts_with("--context")) {
                args.push("--context".to_string());
                args.push(context.clone());
            }
        }
        args.extend(tokens.into_iter().map(str::to_string));
        args
    }

    /// Run a command; returns stdout on success and stderr otherwise.
    pub async fn run(&self, command: &str) -> Result<String, ClusterError> {
        if command_tokens(command).is_empty() {
            return Err(ClusterError::Command("empty command".to_string()));
        }
        let args = self.arguments(command);

        info!(command = %command, "Executing kubectl");
        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|e| ClusterError::Command(e.to_string()))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            warn!(command = %command, status = ?output.status.code(), "kubectl exited with failure");
            Ok(String::from_utf8_lossy(&output.stderr).into_owned())
        }
    }
}

/// Whitespace-split command with an optional leading `kubectl` removed.
fn command_tokens(command: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = command.split_whitespace().collect();
    if tokens.first() == Some(&"kubectl") {
        tokens.remove(0);
    }
    tokens
}

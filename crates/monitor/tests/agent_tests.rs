//! Monitoring cycle driver tests: containment, timeout and the continuous loop.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

use cluster_monitor::{
    analysis_prompt, ConfigError, DriverSettings, EngineError, MonitoringAgent, ReasoningEngine,
    StepLimits, Tool, ToolSet,
};
use notify::{ChannelError, Notification, Notifier, NotifyChannel};

#[derive(Clone, Copy)]
enum Behaviour {
    Answer(&'static str),
    Fail,
    Panic,
    Hang,
}

struct ScriptedEngine {
    behaviour: Behaviour,
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, Vec<&'static str>, StepLimits)>>,
    /// Signalled when the given call number starts
    signal: Option<(usize, Arc<Notify>)>,
}

impl ScriptedEngine {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            signal: None,
        })
    }

    fn signalling(behaviour: Behaviour, at_call: usize, notify: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            signal: Some((at_call, notify)),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn run(
        &self,
        prompt: &str,
        tools: &ToolSet,
        limits: StepLimits,
    ) -> Result<String, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen
            .lock()
            .unwrap()
            .push((prompt.to_string(), tools.names(), limits));
        if let Some((at, notify)) = &self.signal {
            if call == *at {
                notify.notify_one();
            }
        }

        match self.behaviour {
            Behaviour::Answer(text) => Ok(text.to_string()),
            Behaviour::Fail => Err(EngineError::Api {
                status: 500,
                message: "upstream unavailable".to_string(),
            }),
            Behaviour::Panic => panic!("tool exploded"),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

struct CountingChannel {
    sends: AtomicUsize,
    last: Mutex<Option<Notification>>,
    panics: bool,
}

impl CountingChannel {
    fn new(panics: bool) -> Arc<Self> {
        Arc::new(Self {
            sends: AtomicUsize::new(0),
            last: Mutex::new(None),
            panics,
        })
    }

    fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotifyChannel for CountingChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn send(&self, notification: &Notification) -> Result<(), ChannelError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(notification.clone());
        assert!(!self.panics, "webhook client blew up");
        Ok(())
    }
}

struct NoopTool;

#[async_trait]
impl Tool for NoopTool {
    fn name(&self) -> &'static str {
        "get_nodes"
    }

    fn description(&self) -> &'static str {
        "noop"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _args: serde_json::Value) -> String {
        "[]".to_string()
    }
}

fn settings(interval_secs: u64) -> DriverSettings {
    DriverSettings {
        monitoring_interval: Duration::from_secs(interval_secs),
        limits: StepLimits::default(),
        cycle_timeout: None,
    }
}

fn agent_with(
    engine: Arc<dyn ReasoningEngine>,
    channel: &Arc<CountingChannel>,
    settings: DriverSettings,
) -> MonitoringAgent {
    let channel: Arc<dyn NotifyChannel> = channel.clone();
    let tools = ToolSet::new().with(Arc::new(NoopTool));
    MonitoringAgent::new(
        engine,
        Arc::new(tools),
        Arc::new(Notifier::with_channels(vec![channel])),
        settings,
    )
    .unwrap()
}

#[tokio::test]
async fn test_monitor_once_returns_engine_text_verbatim() {
    let engine = ScriptedEngine::new(Behaviour::Answer("All 3 nodes Ready; no action taken."));
    let channel = CountingChannel::new(false);
    let agent = agent_with(engine.clone(), &channel, settings(300));

    let result = agent.monitor_once().await;

    assert_eq!(result, "All 3 nodes Ready; no action taken.");
    let seen = engine.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, analysis_prompt());
    assert_eq!(seen[0].1, vec!["get_nodes"]);
    assert_eq!(seen[0].2, StepLimits { max_steps: 10, planning_interval: 3 });
    assert_eq!(channel.sends(), 0);
}

#[tokio::test]
async fn test_monitor_once_contains_engine_error() {
    let engine = ScriptedEngine::new(Behaviour::Fail);
    let channel = CountingChannel::new(false);
    let agent = agent_with(engine, &channel, settings(300));

    let result = agent.monitor_once().await;

    assert_eq!(
        result,
        "Error in monitoring cycle: model API error (500): upstream unavailable"
    );
    // single-run mode does not notify
    assert_eq!(channel.sends(), 0);
}

#[tokio::test]
async fn test_monitor_once_contains_panic() {
    let engine = ScriptedEngine::new(Behaviour::Panic);
    let channel = CountingChannel::new(false);
    let agent = agent_with(engine, &channel, settings(300));

    let result = agent.monitor_once().await;

    assert_eq!(result, "Error in monitoring cycle: cycle panicked: tool exploded");
}

#[tokio::test(start_paused = true)]
async fn test_monitor_once_enforces_cycle_timeout() {
    let engine = ScriptedEngine::new(Behaviour::Hang);
    let channel = CountingChannel::new(false);
    let agent = agent_with(
        engine,
        &channel,
        DriverSettings {
            cycle_timeout: Some(Duration::from_secs(5)),
            ..settings(300)
        },
    );

    let result = agent.monitor_once().await;

    assert_eq!(result, "Error in monitoring cycle: cycle exceeded timeout of 5s");
}

#[tokio::test(start_paused = true)]
async fn test_loop_notifies_each_failure_until_shutdown() {
    let third_call = Arc::new(Notify::new());
    let engine = ScriptedEngine::signalling(Behaviour::Fail, 3, third_call.clone());
    let channel = CountingChannel::new(false);
    let agent = agent_with(engine.clone(), &channel, settings(60));

    agent
        .monitor_loop(async move { third_call.notified().await })
        .await;

    assert_eq!(engine.calls(), 3);
    assert_eq!(channel.sends(), 3);

    let last = channel.last.lock().unwrap().clone().unwrap();
    assert_eq!(last.title.as_deref(), Some("Monitoring Error"));
    assert_eq!(last.severity, notify::Severity::Error);
    assert!(last
        .message
        .starts_with("❌ Monitoring agent encountered an error:\n"));
    assert!(last.message.contains("upstream unavailable"));
}

#[tokio::test(start_paused = true)]
async fn test_loop_keeps_running_after_failed_cycle() {
    let engine = ScriptedEngine::new(Behaviour::Fail);
    let channel = CountingChannel::new(false);
    let agent = Arc::new(agent_with(engine.clone(), &channel, settings(60)));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn({
        let agent = agent.clone();
        async move {
            agent
                .monitor_loop(async move {
                    let _ = stop_rx.await;
                })
                .await;
        }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(engine.calls(), 1);
    assert_eq!(channel.sends(), 1);
    assert!(!handle.is_finished());

    // next cycle starts only after the full interval
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(engine.calls(), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(engine.calls(), 2);
    assert_eq!(channel.sends(), 2);

    stop_tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_loop_survives_panicking_error_notification() {
    let second_call = Arc::new(Notify::new());
    let engine = ScriptedEngine::signalling(Behaviour::Panic, 2, second_call.clone());
    let channel = CountingChannel::new(true);
    let agent = agent_with(engine.clone(), &channel, settings(10));

    agent
        .monitor_loop(async move { second_call.notified().await })
        .await;

    assert_eq!(engine.calls(), 2);
    assert_eq!(channel.sends(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_successful_cycles_do_not_notify() {
    let second_call = Arc::new(Notify::new());
    let engine = ScriptedEngine::signalling(Behaviour::Answer("healthy"), 2, second_call.clone());
    let channel = CountingChannel::new(false);
    let agent = agent_with(engine.clone(), &channel, settings(10));

    agent
        .monitor_loop(async move { second_call.notified().await })
        .await;

    assert_eq!(engine.calls(), 2);
    assert_eq!(channel.sends(), 0);
}

#[tokio::test]
async fn test_shutdown_before_first_cycle_runs_nothing() {
    let engine = ScriptedEngine::new(Behaviour::Answer("unused"));
    let channel = CountingChannel::new(false);
    let agent = agent_with(engine.clone(), &channel, settings(10));

    agent.monitor_loop(std::future::ready(())).await;

    assert_eq!(engine.calls(), 0);
}

#[test]
fn test_zero_interval_is_rejected_at_construction() {
    let engine = ScriptedEngine::new(Behaviour::Answer("unused"));
    let result = MonitoringAgent::new(
        engine,
        Arc::new(ToolSet::new()),
        Arc::new(Notifier::disabled()),
        DriverSettings {
            monitoring_interval: Duration::ZERO,
            ..DriverSettings::default()
        },
    );

    assert!(matches!(
        result,
        Err(ConfigError::Invalid {
            name: "MONITORING_INTERVAL",
            ..
        })
    ));
}

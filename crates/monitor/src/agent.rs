//! Monitoring cycle driver.
//!
//! One cycle hands the fixed analysis prompt and the tool set to the
//! reasoning engine and returns whatever text it produces. Everything that
//! can go wrong inside a cycle (engine errors, panics in the engine or a
//! tool, an exceeded cycle timeout) is contained here and turned into text;
//! the continuous loop additionally reports failures through the notifier and
//! keeps going.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use notify::{summarize, Notification, Notifier, Severity};

use crate::config::ConfigError;
use crate::engine::{EngineError, ReasoningEngine, StepLimits};
use crate::tools::ToolSet;

/// Prefix of the text returned for a failed cycle.
pub const CYCLE_ERROR_PREFIX: &str = "Error in monitoring cycle";

/// Title of the loop's failure notification.
pub const ERROR_NOTIFICATION_TITLE: &str = "Monitoring Error";

/// Errors a single cycle can end with.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("cycle exceeded timeout of {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("cycle panicked: {0}")]
    Panicked(String),
}

/// Driver settings fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    pub monitoring_interval: Duration,
    pub limits: StepLimits,
    pub cycle_timeout: Option<Duration>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            monitoring_interval: Duration::from_secs(crate::config::DEFAULT_MONITORING_INTERVAL_SECS),
            limits: StepLimits::default(),
            cycle_timeout: None,
        }
    }
}

/// The analysis task handed to the engine every cycle.
pub fn analysis_prompt() -> String {
    "\
Analyze the Kubernetes cluster state and identify any issues or potential problems.
Follow these steps:

1. First, use the analyze_cluster_state tool to get the current state of the cluster.
2. Identify any critical issues that need immediate attention.
3. Check for similar past issues using find_similar_problems.
4. Suggest potential solutions based on the available information.
5. If a solution is found and kubectl_exec is available, execute it using kubectl_exec.
6. If the issue requires human intervention, send a notification.
7. Store the problem and solution for future reference using add_problem.

Remember to be thorough in your analysis and provide clear explanations of your reasoning.
"
    .to_string()
}

/// Runs monitoring cycles against a reasoning engine.
pub struct MonitoringAgent {
    engine: Arc<dyn ReasoningEngine>,
    tools: Arc<ToolSet>,
    notifier: Arc<Notifier>,
    settings: DriverSettings,
}

impl MonitoringAgent {
    /// Build a driver; invalid settings are rejected here, never later.
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        tools: Arc<ToolSet>,
        notifier: Arc<Notifier>,
        settings: DriverSettings,
    ) -> Result<Self, ConfigError> {
        if settings.monitoring_interval.is_zero() {
            return Err(ConfigError::Invalid {
                name: "MONITORING_INTERVAL",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if settings.limits.max_steps == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_STEPS",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if settings.cycle_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Invalid {
                name: "CYCLE_TIMEOUT",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        info!(
            tools = tools.len(),
            interval_secs = settings.monitoring_interval.as_secs(),
            max_steps = settings.limits.max_steps,
            "Monitoring agent initialized"
        );

        Ok(Self {
            engine,
            tools,
            notifier,
            settings,
        })
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Run one cycle, surfacing failures as [`CycleError`].
    pub async fn run_cycle(&self) -> Result<String, CycleError> {
        let prompt = analysis_prompt();
        let run = AssertUnwindSafe(self.engine.run(&prompt, &self.tools, self.settings.limits))
            .catch_unwind();

        let outcome = match self.settings.cycle_timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| CycleError::Timeout(limit))?,
            None => run.await,
        };

        match outcome {
            Ok(result) => Ok(result?),
            Err(payload) => Err(CycleError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    /// Run one cycle; never fails.
    ///
    /// Returns the engine's final text verbatim, or
    /// `"Error in monitoring cycle: <reason>"`.
    pub async fn monitor_once(&self) -> String {
        match self.run_cycle().await {
            Ok(result) => result,
            Err(e) => {
                let message = format!("{CYCLE_ERROR_PREFIX}: {e}");
                error!(error = %e, "Monitoring cycle failed");
                message
            }
        }
    }

    /// Repeat cycles until `shutdown` resolves.
    ///
    /// Sleeps `monitoring_interval` after every cycle, failed or not. A failed
    /// cycle is also reported through the notifier on a best-effort basis.
    pub async fn monitor_loop<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let interval = self.settings.monitoring_interval;
        info!(interval_secs = interval.as_secs(), "Starting monitoring loop");

        loop {
            let outcome = tokio::select! {
                biased;
                () = &mut shutdown => break,
                outcome = self.run_cycle() => outcome,
            };

            match outcome {
                Ok(result) => info!(result = %result, "Monitoring cycle completed"),
                Err(e) => {
                    error!(error = %e, "Monitoring cycle failed");
                    self.report_failure(&e).await;
                }
            }

            tokio::select! {
                biased;
                () = &mut shutdown => break,
                () = tokio::time::sleep(interval) => {}
            }
        }

        info!("Monitoring loop interrupted, shutting down");
    }

    async fn report_failure(&self, failure: &CycleError) {
        let notification = Notification::new(format!(
            "❌ Monitoring agent encountered an error:\n{CYCLE_ERROR_PREFIX}: {failure}"
        ))
        .with_title(ERROR_NOTIFICATION_TITLE)
        .with_severity(Severity::Error);

        match AssertUnwindSafe(self.notifier.notify(&notification, None))
            .catch_unwind()
            .await
        {
            Ok(outcomes) => debug!(summary = %summarize(&outcomes), "Error notification dispatched"),
            Err(payload) => warn!(
                panic = %panic_message(payload.as_ref()),
                "Error notification panicked"
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

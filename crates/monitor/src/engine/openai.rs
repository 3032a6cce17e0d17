//! OpenAI-compatible tool-calling engine.
//!
//! Runs a plain chat-completions loop: the model either calls tools (which are
//! executed one after another and fed back) or answers. Every
//! `planning_interval` steps a separate tool-less request asks for a plan,
//! which stays in the conversation as assistant context. Works against any
//! endpoint implementing the `/chat/completions` function-calling API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{EngineError, ReasoningEngine, StepLimits};
use crate::tools::{ToolDefinition, ToolSet};

/// System instruction for the monitoring agent.
pub const SYSTEM_PROMPT: &str = "You are an experienced Kubernetes site reliability engineer \
operating a cluster autonomously. Use the available tools to inspect the cluster, consult the \
incident memory and act. Base every conclusion on tool output. When you are done, reply with a \
concise report of what you found and what you did.";

/// Sent as a tool-less request every `planning_interval` steps.
pub const PLANNING_PROMPT: &str = "Before continuing, write a short plan: summarise what you \
have learned so far, list what is still unknown, then name the next tool calls you intend to make.";

/// Sent once the step budget is spent.
pub const FINAL_ANSWER_PROMPT: &str = "You have reached the maximum number of steps. Do not call \
any more tools. Give your final report now based on what you have gathered.";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    fn tool_result(call_id: &str, content: String) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    /// JSON-encoded arguments object
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize)]
struct FunctionTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

/// Chat-completions engine with function calling.
pub struct OpenAiEngine {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiEngine {
    /// Create an engine for `model` against the public OpenAI endpoint.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            base_url: crate::config::DEFAULT_OPENAI_API_BASE.to_string(),
            model: model.into(),
            temperature: None,
        }
    }

    /// Set a custom base URL (Azure OpenAI, proxies, local servers).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Replace the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        definitions: Option<&[ToolDefinition]>,
    ) -> Result<ChatChoice, EngineError> {
        let tools = definitions
            .unwrap_or_default()
            .iter()
            .map(|function| FunctionTool {
                tool_type: "function",
                function,
            })
            .collect();

        let request = ChatRequest {
            model: &self.model,
            messages,
            tools,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(EngineError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::InvalidResponse("response contained no choices".to_string()))
    }

    /// Ask for a plan without offering tools and keep it in the history.
    ///
    /// The plan is context for the following steps and is never returned as
    /// the answer.
    async fn plan(&self, messages: &mut Vec<ChatMessage>, step: usize) -> Result<(), EngineError> {
        messages.push(ChatMessage::text("user", PLANNING_PROMPT));

        let choice = self.complete(messages, None).await?;
        match choice.message.content.filter(|c| !c.trim().is_empty()) {
            Some(plan) => {
                debug!(step, "Planning step completed");
                messages.push(ChatMessage::text("assistant", plan));
            }
            None => warn!(step, "Planning step returned no text"),
        }
        Ok(())
    }
}

#[async_trait]
impl ReasoningEngine for OpenAiEngine {
    async fn run(
        &self,
        prompt: &str,
        tools: &ToolSet,
        limits: StepLimits,
    ) -> Result<String, EngineError> {
        if self.api_key.is_empty() {
            return Err(EngineError::NotConfigured("API key is empty".to_string()));
        }

        let definitions = tools.definitions();
        let mut messages = vec![
            ChatMessage::text("system", SYSTEM_PROMPT),
            ChatMessage::text("user", prompt),
        ];

        for step in 1..=limits.max_steps {
            if limits.plans_at(step) {
                self.plan(&mut messages, step).await?;
            }

            let ChatChoice {
                message: reply,
                finish_reason,
            } = self.complete(&messages, Some(definitions.as_slice())).await?;

            if reply.tool_calls.is_empty() {
                if let Some(answer) = reply.content.as_deref().filter(|c| !c.trim().is_empty()) {
                    info!(step, "Model produced final answer");
                    return Ok(answer.to_string());
                }
                warn!(
                    step,
                    finish_reason = finish_reason.as_deref().unwrap_or("unknown"),
                    "Model returned neither tool calls nor content"
                );
                messages.push(reply);
                continue;
            }

            let calls = reply.tool_calls.clone();
            messages.push(reply);

            for call in calls {
                let args = if call.function.arguments.trim().is_empty() {
                    Value::Null
                } else {
                    match serde_json::from_str(&call.function.arguments) {
                        Ok(args) => args,
                        Err(e) => {
                            messages.push(ChatMessage::tool_result(
                                &call.id,
                                format!("Error: arguments are not valid JSON: {e}"),
                            ));
                            continue;
                        }
                    }
                };

                debug!(step, tool = %call.function.name, "Executing tool call");
                let output = tools.call(&call.function.name, args).await;
                messages.push(ChatMessage::tool_result(&call.id, output));
            }
        }

        info!(max_steps = limits.max_steps, "Step budget exhausted, requesting final answer");
        messages.push(ChatMessage::text("user", FINAL_ANSWER_PROMPT));

        let reply = self.complete(&messages, None).await?;
        reply
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| EngineError::InvalidResponse("final answer was empty".to_string()))
    }
}

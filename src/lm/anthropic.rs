//! Anthropic messages API backend.
use super::{
    classify_http_failure, http_agent, Generation, GenerationParams, GenerationService, LmError,
    ReasoningEffort,
};
use crate::session::{Message, Role};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicService {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

impl AnthropicService {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Self {
        Self {
            agent: http_agent(timeout),
            endpoint: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            api_key,
        }
    }
}

fn thinking_budget(effort: ReasoningEffort) -> u32 {
    match effort {
        ReasoningEffort::Low => 2_048,
        ReasoningEffort::Medium => 8_192,
        ReasoningEffort::High => 16_384,
    }
}

/// The system prompt travels outside the message list.
pub(crate) fn request_body(messages: &[Message], params: &GenerationParams) -> Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|message| message.role == Role::System)
        .map(|message| message.content.as_str())
        .collect();
    let turns: Vec<Value> = messages
        .iter()
        .filter(|message| message.role != Role::System)
        .map(|message| json!({"role": message.role.as_str(), "content": message.content}))
        .collect();

    let mut body = json!({
        "model": params.model,
        "max_tokens": params.max_output_tokens,
        "messages": turns,
    });
    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }
    // Extended thinking needs room left for the answer and fixes temperature.
    match params.reasoning_effort.map(thinking_budget) {
        Some(budget) if budget < params.max_output_tokens => {
            body["thinking"] = json!({"type": "enabled", "budget_tokens": budget});
        }
        _ => body["temperature"] = json!(params.temperature.min(1.0)),
    }
    body
}

fn parse_response(text: &str) -> Result<(String, u64, u64), LmError> {
    let response: MessagesResponse = serde_json::from_str(text)
        .map_err(|err| LmError::transient(format!("parse messages response: {err}")))?;
    let content: String = response
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text.as_deref())
        .collect::<Vec<_>>()
        .join("");
    if content.trim().is_empty() {
        let reason = response.stop_reason.unwrap_or_else(|| "unknown".to_string());
        if reason == "max_tokens" {
            return Err(LmError::context_length(
                "response hit max_tokens before producing text",
            ));
        }
        return Err(LmError::transient(format!(
            "messages response had no text (stop_reason {reason})"
        )));
    }
    let (input, output) = response
        .usage
        .map(|usage| (usage.input_tokens, usage.output_tokens))
        .unwrap_or((0, 0));
    Ok((content, input, output))
}

impl GenerationService for AnthropicService {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<Generation, LmError> {
        let body = request_body(messages, params);
        let start = Instant::now();
        let mut response = self
            .agent
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.as_str())
            .header("anthropic-version", API_VERSION)
            .send_json(&body)
            .map_err(|err| LmError::transient(format!("POST {}: {err}", self.endpoint)))?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|err| LmError::transient(format!("read response body: {err}")))?;
        let duration = start.elapsed();

        tracing::info!(
            elapsed_ms = duration.as_millis() as u64,
            status,
            response_bytes = text.len(),
            model = %params.model,
            "anthropic request complete"
        );

        if !(200..300).contains(&status) {
            let kind = classify_http_failure(status, &text);
            return Err(LmError {
                kind,
                message: format!(
                    "Anthropic returned {status}: {}",
                    crate::util::preview(&text, 500)
                ),
            });
        }

        let (content, input_tokens, output_tokens) = parse_response(&text)?;
        Ok(Generation {
            content,
            input_tokens,
            output_tokens,
            duration,
        })
    }
}

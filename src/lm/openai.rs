//! OpenAI chat completions backend.
use super::{
    classify_http_failure, http_agent, Generation, GenerationParams, GenerationService, LmError,
};
use crate::session::Message;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

pub struct OpenAiService {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl OpenAiService {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Self {
        Self {
            agent: http_agent(timeout),
            endpoint: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            api_key,
        }
    }
}

/// Reasoning models reject `temperature` and take `reasoning_effort` instead.
fn is_reasoning_model(model: &str) -> bool {
    let mut chars = model.chars();
    chars.next() == Some('o') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

pub(crate) fn request_body(messages: &[Message], params: &GenerationParams) -> Value {
    let mut body = json!({
        "model": params.model,
        "messages": messages,
        "max_completion_tokens": params.max_output_tokens,
    });
    if is_reasoning_model(&params.model) {
        if let Some(effort) = params.reasoning_effort {
            body["reasoning_effort"] = json!(effort.as_str());
        }
    } else {
        body["temperature"] = json!(params.temperature);
    }
    body
}

fn parse_response(text: &str) -> Result<(String, u64, u64), LmError> {
    let response: ChatResponse = serde_json::from_str(text)
        .map_err(|err| LmError::transient(format!("parse chat completion: {err}")))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LmError::transient("chat completion returned no choices"))?;
    let content = choice.message.content.unwrap_or_default();
    if content.trim().is_empty() {
        let reason = choice.finish_reason.unwrap_or_else(|| "unknown".to_string());
        if reason == "length" {
            return Err(LmError::context_length(
                "completion hit the token limit before producing content",
            ));
        }
        return Err(LmError::transient(format!(
            "chat completion was empty (finish_reason {reason})"
        )));
    }
    let (input, output) = response
        .usage
        .map(|usage| (usage.prompt_tokens, usage.completion_tokens))
        .unwrap_or((0, 0));
    Ok((content, input, output))
}

impl GenerationService for OpenAiService {
    fn name(&self) -> &str {
        "openai"
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
            .header("Authorization", format!("Bearer {}", self.api_key))
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
            "openai request complete"
        );

        if !(200..300).contains(&status) {
            let kind = classify_http_failure(status, &text);
            return Err(LmError {
                kind,
                message: format!("OpenAI returned {status}: {}", crate::util::preview(&text, 500)),
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

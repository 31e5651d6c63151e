use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use super::{AssistantError, LlmConfig};

/// The function call picked by the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub name: String,
    /// Raw JSON-encoded arguments, as sent by the model
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    tool_calls: Vec<ToolCallPayload>,
}

#[derive(Debug, Deserialize)]
struct ToolCallPayload {
    function: FunctionPayload,
}

#[derive(Debug, Deserialize)]
struct FunctionPayload {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Client for an OpenAI-compatible chat-completions endpoint
#[derive(Debug, Clone)]
pub struct ChatClient {
    http_client: reqwest::Client,
    config: LlmConfig,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Result<Self, AssistantError> {
        let http_client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http_client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send one completion request that must answer with a tool call
    pub async fn tool_call(
        &self,
        system: &str,
        prompt: &str,
        tools: &[JsonValue],
    ) -> Result<ToolCall, AssistantError> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
            "tools": tools,
            "tool_choice": "required",
            "temperature": 0,
        });

        let mut request = self.http_client.post(self.config.completions_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let payload: JsonValue = response.json().await?;
        first_tool_call(payload)
    }
}

/// First tool call of the first choice
pub fn first_tool_call(payload: JsonValue) -> Result<ToolCall, AssistantError> {
    let response: ChatResponse = serde_json::from_value(payload)
        .map_err(|e| AssistantError::InvalidResponse(e.to_string()))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.tool_calls.into_iter().next())
        .map(|call| ToolCall {
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .ok_or_else(|| AssistantError::InvalidResponse("model returned no tool call".to_string()))
}

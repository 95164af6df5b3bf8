use std::time::Duration;

use async_trait::async_trait;
use nexus_core::config::{LlmConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ERROR_BODY_LIMIT: usize = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry of the caller-owned conversation history. Serializes to the
/// OpenAI chat wire shape so history round-trips through the HTTP layer
/// untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// The assistant's intent message: recorded in history before any tool
    /// result so every `tool` message has a declared call id preceding it.
    pub fn assistant_intent(content: Option<String>, tool_calls: Vec<ToolCallEnvelope>) -> Self {
        Self { role: Role::Assistant, content, tool_calls, tool_call_id: None }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCallEnvelope {
    pub fn function_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: FunctionCall { name: name.into(), arguments: arguments.into() },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument payload exactly as the provider produced it.
    pub arguments: String,
}

/// A capability advertised to the LLM: name, description, and a strict
/// parameter schema (`additionalProperties: false`, `required` enumerated).
/// Descriptors are defined once at process start and never change.
#[derive(Clone, Debug, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolChoice {
    /// First call of a turn: the model decides whether to reply or act.
    Auto,
    /// Summarization call: no tools are offered at all.
    None,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LlmReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallEnvelope>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm network failure: {0}")]
    Network(String),
    #[error("llm request timed out")]
    Timeout,
    #[error("llm API error: {0}")]
    Api(String),
    #[error("llm response could not be parsed: {0}")]
    Parse(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
        tool_choice: ToolChoice,
    ) -> Result<LlmReply, LlmError>;
}

/// Chat-completions client for OpenAI and OpenAI-compatible servers (Ollama
/// exposes the same surface under its own base URL).
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Network(error.to_string()))?;

        let base_url = match (&config.base_url, config.provider) {
            (Some(base_url), _) => base_url.clone(),
            (None, LlmProvider::OpenAi) => OPENAI_BASE_URL.to_string(),
            (None, LlmProvider::Ollama) => {
                return Err(LlmError::Api("ollama provider requires llm.base_url".to_string()));
            }
        };

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn build_request_body(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
        tool_choice: ToolChoice,
    ) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });

        if matches!(tool_choice, ToolChoice::Auto) && !tools.is_empty() {
            let tool_defs = tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect::<Vec<_>>();
            body["tools"] = Value::Array(tool_defs);
            body["tool_choice"] = json!("auto");
        }

        body
    }

    fn parse_reply(&self, body: Value) -> Result<LlmReply, LlmError> {
        let message = body
            .pointer("/choices/0/message")
            .ok_or_else(|| LlmError::Parse("response is missing choices[0].message".to_string()))?;

        let content = message
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|text| !text.is_empty());

        let tool_calls = match message.get("tool_calls") {
            None | Some(Value::Null) => Vec::new(),
            Some(raw) => serde_json::from_value::<Vec<ToolCallEnvelope>>(raw.clone())
                .map_err(|error| LlmError::Parse(format!("bad tool_calls block: {error}")))?,
        };

        Ok(LlmReply { content, tool_calls })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
        tool_choice: ToolChoice,
    ) -> Result<LlmReply, LlmError> {
        let body = self.build_request_body(messages, tools, tool_choice);
        debug!(model = %self.model, message_count = messages.len(), "llm chat request");

        let mut request = self.http.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret()); // ubs:ignore
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Network(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text = text.chars().take(ERROR_BODY_LIMIT).collect::<String>();
            return Err(LlmError::Api(format!("HTTP {status}: {text}")));
        }

        let body =
            response.json::<Value>().await.map_err(|error| LlmError::Parse(error.to_string()))?;
        self.parse_reply(body)
    }
}

#[cfg(test)]
mod tests {
    use nexus_core::config::{LlmConfig, LlmProvider};
    use serde_json::json;

    use super::{ChatMessage, OpenAiClient, ToolCallEnvelope, ToolChoice, ToolDescriptor};

    fn client() -> OpenAiClient {
        OpenAiClient::from_config(&LlmConfig {
            provider: LlmProvider::OpenAi,
            api_key: Some("sk-test".to_string().into()),
            base_url: None,
            model: "gpt-4-turbo".to_string(),
            timeout_secs: 60,
        })
        .expect("client should build")
    }

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "get_lists",
            description: "Fetch existing subscriber lists.",
            parameters: json!({"type": "object", "properties": {}, "additionalProperties": false}),
        }
    }

    #[test]
    fn history_round_trips_through_the_wire_shape() {
        let intent = ChatMessage::assistant_intent(
            None,
            vec![ToolCallEnvelope::function_call("call_1", "get_lists", "{}")],
        );
        let wire = serde_json::to_value(&intent).expect("serialize");

        assert_eq!(wire["role"], "assistant");
        assert_eq!(wire["tool_calls"][0]["type"], "function");
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "get_lists");
        assert!(wire.get("content").is_none(), "absent content is omitted");

        let parsed: ChatMessage = serde_json::from_value(wire).expect("deserialize");
        assert_eq!(parsed, intent);
    }

    #[test]
    fn tool_messages_carry_their_call_id() {
        let message = ChatMessage::tool("call_1", "No lists found.");
        let wire = serde_json::to_value(&message).expect("serialize");
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call_1");
    }

    #[test]
    fn first_call_offers_tools_with_auto_choice() {
        let body = client().build_request_body(
            &[ChatMessage::user("what are my lists?")],
            &[descriptor()],
            ToolChoice::Auto,
        );

        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "get_lists");
    }

    #[test]
    fn summary_call_offers_no_tools() {
        let body = client().build_request_body(
            &[ChatMessage::user("what are my lists?")],
            &[descriptor()],
            ToolChoice::None,
        );

        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn reply_parsing_extracts_content_and_tool_calls() {
        let reply = client()
            .parse_reply(json!({
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_9",
                            "type": "function",
                            "function": {"name": "get_lists", "arguments": "{}"}
                        }]
                    }
                }]
            }))
            .expect("reply should parse");

        assert!(reply.content.is_none());
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].function.name, "get_lists");
    }

    #[test]
    fn shapeless_reply_is_a_parse_error() {
        assert!(client().parse_reply(json!({"ok": true})).is_err());
    }
}

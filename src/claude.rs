use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::agent::{AgentError, VisionModel};
use crate::conversation::{Conversation, Turn};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone, Debug)]
pub struct ClaudeConfig {
    pub api_base: String,  // e.g. "https://api.anthropic.com"
    pub api_key: String,
    pub model: String,     // e.g. "claude-sonnet-4-20250514"
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.anthropic.com".into(),
            api_key: String::new(),
            model: "claude-sonnet-4-20250514".into(),
            max_tokens: 4096,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub struct ClaudeClient {
    http: Client,
    cfg: ClaudeConfig,
}

impl ClaudeClient {
    pub fn new(cfg: ClaudeConfig) -> Result<Self, AgentError> {
        if cfg.api_key.trim().is_empty() {
            return Err(AgentError::Config("ANTHROPIC_API_KEY missing".into()));
        }
        let http = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("http client: {}", e)))?;
        Ok(Self { http, cfg })
    }

    pub async fn send(&self, conversation: &Conversation, system: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.cfg.api_base.trim_end_matches('/'));
        let req = Self::build_request(&self.cfg, conversation, system);

        let resp = self
            .http
            .post(url)
            .header("x-api-key", &self.cfg.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&req)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            bail!("Claude API error {}: {}", status, text);
        }
        let v: Value = serde_json::from_str(&text).context("failed to parse Claude response JSON")?;
        debug!(response = %v, "claude response");
        Self::reply_text(&v)
    }

    fn build_request(cfg: &ClaudeConfig, conversation: &Conversation, system: &str) -> Value {
        let messages: Vec<Value> = conversation.turns().iter().map(Self::encode_turn).collect();
        let mut req = json!({
          "model": cfg.model,
          "max_tokens": cfg.max_tokens,
          "messages": messages,
        });
        if !system.is_empty() {
            req["system"] = Value::String(system.to_string());
        }
        req
    }

    fn encode_turn(turn: &Turn) -> Value {
        match turn {
            Turn::User { image_base64, text } => json!({
              "role": "user",
              "content": [
                { "type": "image", "source": {
                    "type": "base64",
                    "media_type": "image/png",
                    "data": image_base64
                }},
                { "type": "text", "text": text }
              ]
            }),
            Turn::Assistant { text } => json!({ "role": "assistant", "content": text }),
        }
    }

    /// Concatenates every `text` block of `content`, in order.
    fn reply_text(v: &Value) -> Result<String> {
        let blocks = v
            .get("content")
            .and_then(|x| x.as_array())
            .context("missing content")?;
        Ok(blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect())
    }
}

#[async_trait]
impl VisionModel for ClaudeClient {
    async fn complete(&self, conversation: &Conversation, system: &str) -> Result<String, AgentError> {
        self.send(conversation, system)
            .await
            .map_err(|e| AgentError::Model(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_rejected() {
        let err = ClaudeClient::new(ClaudeConfig::default()).err().unwrap();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn request_encodes_image_and_text_turns() {
        let mut conv = Conversation::new();
        conv.push_user(b"png", "Task: open mail");
        conv.push_assistant(r#"{"action":"wait"}"#);
        let cfg = ClaudeConfig { api_key: "k".into(), ..Default::default() };
        let req = ClaudeClient::build_request(&cfg, &conv, "sys");

        assert_eq!(req["model"], "claude-sonnet-4-20250514");
        assert_eq!(req["max_tokens"], 4096);
        assert_eq!(req["system"], "sys");
        let user = &req["messages"][0];
        assert_eq!(user["role"], "user");
        assert_eq!(user["content"][0]["type"], "image");
        assert_eq!(user["content"][0]["source"]["media_type"], "image/png");
        assert_eq!(user["content"][0]["source"]["data"], "cG5n");
        assert_eq!(user["content"][1]["text"], "Task: open mail");
        assert_eq!(req["messages"][1], json!({"role": "assistant", "content": r#"{"action":"wait"}"#}));
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let req = ClaudeClient::build_request(&ClaudeConfig::default(), &Conversation::new(), "");
        assert!(req.get("system").is_none());
    }

    #[test]
    fn reply_text_joins_text_blocks() {
        let v = json!({
            "content": [
                {"type": "text", "text": "Clicking "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "now"}
            ]
        });
        assert_eq!(ClaudeClient::reply_text(&v).unwrap(), "Clicking now");
        assert!(ClaudeClient::reply_text(&json!({"error": {}})).is_err());
    }
}

//! 模型接口：OpenAI 兼容的 `/chat/completions`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EnrichmentError;
use crate::util::http_client::{HttpClient, HttpClientConfig};

/// 补全服务提供方；返回模型原始文本
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, EnrichmentError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    /// 为空时读取 IACI_LLM_API_KEY / MOONSHOT_API_KEY
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// 请求体附带 `enable_search: true`，由服务端联网检索
    pub enable_search: bool,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.moonshot.cn/v1".to_string(),
            api_key: String::new(),
            model: "moonshot-v1-8k".to_string(),
            temperature: 0.1,
            max_tokens: 1200,
            enable_search: true,
            timeout_secs: 120,
        }
    }
}

impl LlmSettings {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, system: &str, prompt: &str) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if self.enable_search {
            body["enable_search"] = Value::Bool(true);
        }
        body
    }
}

/// 取 `choices[0].message.content`；content 可能是字符串或分段数组
pub fn extract_message_content(body: &Value) -> Result<String, EnrichmentError> {
    let content = body
        .pointer("/choices/0/message/content")
        .ok_or_else(|| EnrichmentError::WrongShape("missing choices[0].message.content".to_string()))?;
    match content {
        Value::String(text) => Ok(text.clone()),
        Value::Array(parts) => Ok(parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.as_str()),
                Value::Object(obj) => obj.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")),
        other => Err(EnrichmentError::WrongShape(format!(
            "unexpected content type: {}",
            other
        ))),
    }
}

pub struct ChatCompletionProvider {
    settings: LlmSettings,
    http: HttpClient,
}

impl ChatCompletionProvider {
    pub fn new(settings: LlmSettings, http_config: &HttpClientConfig) -> anyhow::Result<Self> {
        let http = HttpClient::new(http_config.clone().with_timeout(settings.timeout_secs))?;
        Ok(Self { settings, http })
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }
}

#[async_trait]
impl CompletionProvider for ChatCompletionProvider {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, EnrichmentError> {
        let reply = self
            .http
            .post_json(
                &self.settings.endpoint(),
                &self.settings.api_key,
                &self.settings.request_body(system, prompt),
            )
            .await
            .map_err(|e| EnrichmentError::Transport(format!("{:#}", e)))?;

        if !reply.is_success() {
            return Err(EnrichmentError::Transport(format!(
                "HTTP {}: {}",
                reply.status,
                reply.body_head(200)
            )));
        }
        let body = reply
            .json()
            .map_err(|e| EnrichmentError::Transport(format!("{:#}", e)))?;
        extract_message_content(&body)
    }

    fn name(&self) -> &str {
        &self.settings.model
    }
}

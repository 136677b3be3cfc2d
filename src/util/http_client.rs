//! 共享HTTP客户端：院校官网页面抓取与模型接口调用
//!
//! 页面抓取只认 `200 + text/html`，5xx 与传输错误可重试，其余状态直接放弃；
//! 重试次数、退避和礼貌间隔由 [`RetryPolicy`] 决定，调用方负责循环。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

#[cfg(feature = "reqwest")]
use reqwest::Client;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// HTTP客户端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// 不少院校官网证书链不完整
    pub accept_invalid_certs: bool,
    pub user_agent: String,
    pub pool_max_idle_per_host: usize,
    pub proxy: ProxyConfig,
    pub retry: RetryPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            connect_timeout_secs: 10,
            accept_invalid_certs: true,
            user_agent: BROWSER_USER_AGENT.to_string(),
            pool_max_idle_per_host: 4,
            proxy: ProxyConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl HttpClientConfig {
    /// 覆盖请求超时，用于模型接口这类长请求
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// 代理设置；`from_env` 为真时空缺项由 `HTTP_PROXY` / `HTTPS_PROXY` 补齐
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    pub http: Option<String>,
    pub https: Option<String>,
    pub from_env: bool,
}

impl ProxyConfig {
    pub fn resolve<F>(&self, lookup: F) -> ProxyConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut resolved = self.clone();
        if self.from_env {
            resolved.http = resolved.http.or_else(|| lookup("HTTP_PROXY"));
            resolved.https = resolved.https.or_else(|| lookup("HTTPS_PROXY"));
        }
        resolved
    }
}

/// 页面抓取的重试策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// 单个页面最多尝试次数
    pub max_attempts: u32,
    /// 第 n 次失败后等待 n * backoff_ms
    pub backoff_ms: u64,
    /// 每次成功抓取后的等待
    pub politeness_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 2000,
            politeness_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(attempt as u64))
    }

    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }
}

/// 一次页面请求的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAttempt {
    Html(String),
    /// 5xx 或传输错误，可以再试
    Retryable(String),
    /// 其他状态或非 HTML 内容
    Rejected(String),
}

/// 只看状态码与 Content-Type 的判定；`None` 表示可以读取正文
pub fn classify_page_response(status: u16, content_type: &str) -> Option<PageAttempt> {
    if status == 200 && content_type.to_ascii_lowercase().contains("text/html") {
        None
    } else if (500..600).contains(&status) {
        Some(PageAttempt::Retryable(format!("HTTP {}", status)))
    } else {
        Some(PageAttempt::Rejected(format!(
            "HTTP {} ({})",
            status,
            if content_type.is_empty() { "-" } else { content_type }
        )))
    }
}

/// JSON 接口的原始回复
#[derive(Debug, Clone, PartialEq)]
pub struct JsonReply {
    pub status: u16,
    pub body: String,
}

impl JsonReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<Value> {
        serde_json::from_str(&self.body).context("响应不是合法 JSON")
    }

    /// 日志与错误信息只保留正文开头
    pub fn body_head(&self, max_chars: usize) -> String {
        self.body.chars().take(max_chars).collect()
    }
}

/// HTTP客户端包装器
#[derive(Clone)]
pub struct HttpClient {
    #[cfg(feature = "reqwest")]
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let mut config = config;
        config.proxy = config.proxy.resolve(|key| std::env::var(key).ok());

        #[cfg(feature = "reqwest")]
        {
            let client = Self::build_reqwest_client(&config)?;
            Ok(Self { client, config })
        }

        #[cfg(not(feature = "reqwest"))]
        {
            warn!("HTTP客户端功能在当前编译配置下未启用");
            Ok(Self { config })
        }
    }

    #[cfg(feature = "reqwest")]
    fn build_reqwest_client(config: &HttpClientConfig) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(&config.user_agent)
            .pool_max_idle_per_host(config.pool_max_idle_per_host);

        if let Some(url) = config.proxy.http.as_deref() {
            builder = Self::with_proxy(builder, "http", url, reqwest::Proxy::http(url));
        }
        if let Some(url) = config.proxy.https.as_deref() {
            builder = Self::with_proxy(builder, "https", url, reqwest::Proxy::https(url));
        }

        builder.build().context("构建HTTP客户端失败")
    }

    #[cfg(feature = "reqwest")]
    fn with_proxy(
        builder: reqwest::ClientBuilder,
        scheme: &str,
        url: &str,
        proxy: reqwest::Result<reqwest::Proxy>,
    ) -> reqwest::ClientBuilder {
        match proxy {
            Ok(proxy) => {
                info!(event = "http.proxy_enabled", scheme, proxy = %url);
                builder.proxy(proxy)
            }
            Err(e) => {
                warn!(event = "http.proxy_invalid", scheme, proxy = %url, error = %e);
                builder
            }
        }
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry
    }

    pub fn is_available(&self) -> bool {
        cfg!(feature = "reqwest")
    }

    /// 单次 GET 页面
    #[cfg(feature = "reqwest")]
    pub async fn get_page(&self, url: &str) -> PageAttempt {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return PageAttempt::Retryable(e.to_string()),
        };
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if let Some(verdict) = classify_page_response(response.status().as_u16(), &content_type) {
            return verdict;
        }
        match response.text().await {
            Ok(html) => PageAttempt::Html(html),
            Err(e) => PageAttempt::Retryable(format!("读取正文失败: {}", e)),
        }
    }

    #[cfg(not(feature = "reqwest"))]
    pub async fn get_page(&self, _url: &str) -> PageAttempt {
        PageAttempt::Rejected("HTTP客户端功能在当前编译配置下未启用".to_string())
    }

    /// 带 Bearer 认证的 JSON POST；非 2xx 也返回回复，由调用方判断
    #[cfg(feature = "reqwest")]
    pub async fn post_json(&self, url: &str, bearer: &str, body: &Value) -> Result<JsonReply> {
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .json(body)
            .send()
            .await
            .with_context(|| format!("请求失败: {}", url))?;
        let status = response.status().as_u16();
        let body = response.text().await.context("读取响应正文失败")?;
        Ok(JsonReply { status, body })
    }

    #[cfg(not(feature = "reqwest"))]
    pub async fn post_json(&self, _url: &str, _bearer: &str, _body: &Value) -> Result<JsonReply> {
        Err(anyhow::anyhow!("HTTP客户端功能在当前编译配置下未启用"))
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("available", &self.is_available())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HttpClientConfig::default();
        assert_eq!(config.timeout_secs, 15);
        assert_eq!(config.retry.attempts(), 3);
        assert!(config.user_agent.contains("Chrome"));
        assert!(!config.proxy.from_env);
    }

    #[test]
    fn test_proxy_resolution() {
        let lookup = |key: &str| match key {
            "HTTP_PROXY" => Some("http://proxy.example.com:8080".to_string()),
            "HTTPS_PROXY" => Some("http://env-https:8443".to_string()),
            _ => None,
        };

        let explicit = ProxyConfig {
            https: Some("http://explicit:3128".to_string()),
            from_env: true,
            ..ProxyConfig::default()
        };
        let resolved = explicit.resolve(lookup);
        assert_eq!(resolved.http.as_deref(), Some("http://proxy.example.com:8080"));
        assert_eq!(resolved.https.as_deref(), Some("http://explicit:3128"));

        let off = ProxyConfig::default().resolve(lookup);
        assert!(off.http.is_none());
    }

    #[test]
    fn test_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.politeness_delay(), Duration::from_secs(1));

        let zero = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(zero.attempts(), 1);
    }

    #[test]
    fn test_classify_page_response() {
        assert_eq!(classify_page_response(200, "text/html; charset=utf-8"), None);
        assert!(matches!(
            classify_page_response(503, "text/html"),
            Some(PageAttempt::Retryable(_))
        ));
        assert!(matches!(
            classify_page_response(200, "application/pdf"),
            Some(PageAttempt::Rejected(_))
        ));
        assert!(matches!(
            classify_page_response(404, "text/html"),
            Some(PageAttempt::Rejected(_))
        ));
    }

    #[test]
    fn test_json_reply() {
        let reply = JsonReply {
            status: 200,
            body: r#"{"ok": true}"#.to_string(),
        };
        assert!(reply.is_success());
        assert_eq!(reply.json().unwrap()["ok"], true);

        let error = JsonReply {
            status: 429,
            body: "请求过于频繁，请稍后再试".to_string(),
        };
        assert!(!error.is_success());
        assert_eq!(error.body_head(4), "请求过于");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: HttpClientConfig =
            serde_yaml::from_str("timeout_secs: 30\nretry:\n  max_attempts: 5\n").unwrap();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_ms, 2000);
    }
}

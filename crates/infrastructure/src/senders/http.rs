use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use tracing::{debug, instrument, warn};
use url::Url;

use hookcast_core::{Destination, HookcastError, HookcastResult, IncomingEvent, Sender};

use super::{Envelope, EVENT_HEADER, RETRY_COUNT_HEADER, TRACE_ID_HEADER};

/// HTTP 发送器配置
#[derive(Debug, Clone)]
pub struct HttpSenderConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSenderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: format!("hookcast/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// 以 JSON POST 投递到目标的回调地址
pub struct HttpSender {
    client: reqwest::Client,
    config: HttpSenderConfig,
}

impl HttpSender {
    pub fn new() -> Self {
        Self::with_config(HttpSenderConfig::default())
    }

    pub fn with_config(config: HttpSenderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// 地址错误属于配置问题，不可重试
    pub fn parse_callback_url(raw: &str) -> HookcastResult<Url> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(HookcastError::Unretryable("回调地址为空".to_string()));
        }
        let url = Url::parse(raw)
            .map_err(|e| HookcastError::Unretryable(format!("无法解析回调地址 {raw}: {e}")))?;
        match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(url),
            scheme => Err(HookcastError::Unretryable(format!(
                "回调地址 {raw} 的协议 {scheme} 不受支持或缺少主机"
            ))),
        }
    }

    fn build_request(
        &self,
        url: Url,
        event: &IncomingEvent,
        destination: &Destination,
    ) -> HookcastResult<reqwest::RequestBuilder> {
        let body = serde_json::to_vec(&Envelope::new(event, destination))?;

        let mut request = self
            .client
            .post(url)
            .timeout(self.config.timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, self.config.user_agent.as_str())
            .header(EVENT_HEADER, event.event_key.as_str())
            .header(RETRY_COUNT_HEADER, event.control.retry_count().to_string());
        if let Some(trace_id) = event.trace_id.as_deref() {
            request = request.header(TRACE_ID_HEADER, trace_id);
        }

        if let Some(headers) = event
            .control
            .transport_params
            .get("headers")
            .and_then(|h| h.as_object())
        {
            for (name, value) in headers {
                let Some(value) = value.as_str() else {
                    continue;
                };
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => request = request.header(name, value),
                    _ => warn!(destination = %destination.name(), "忽略非法的请求头: {}", name),
                }
            }
        }

        Ok(request.body(body))
    }
}

impl Default for HttpSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sender for HttpSender {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip_all, fields(event_key = %event.event_key, destination = %destination.name()))]
    async fn send_event(&self, event: &IncomingEvent, destination: &Destination) -> HookcastResult<()> {
        let url = Self::parse_callback_url(destination.callback_url())?;
        let request = self.build_request(url.clone(), event, destination)?;

        let start_time = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| HookcastError::Network(format!("HTTP请求失败 {url}: {e}")))?;

        let status = response.status();
        debug!(
            "HTTP投递完成: url={}, status={}, duration={}ms",
            url,
            status.as_u16(),
            start_time.elapsed().as_millis()
        );
        if !status.is_success() {
            return Err(HookcastError::Network(format!(
                "HTTP请求失败，状态码: {} ({url})",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

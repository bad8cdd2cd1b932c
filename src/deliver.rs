//! 投递模块 - 把 payload POST 到渲染端
//!
//! 同一时刻只有一个投递在进行，所以请求必须有超时，否则一个卡住的目标会冻结整个队列。
//!
//! 证书校验默认放宽（`accept_invalid_certs`）：渲染端是局域网内用户自己控制的设备，
//! 通常使用自签名证书。这是有意的信任决定，严格部署可以在设置里关闭。

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, info};

use crate::config::NotifierConfig;
use crate::error::{DispatchError, Result};
use crate::http::{ClientCache, ClientOptions};
use crate::payload::CanonicalPayload;

/// 投递器 trait
#[async_trait]
pub trait Deliver: Send + Sync {
    /// 投递器名称（用于日志）
    fn name(&self) -> &str;

    /// 投递一个 payload，任何 2xx 视为成功
    async fn send(&self, payload: &CanonicalPayload, config: &NotifierConfig) -> Result<()>;
}

/// HTTP 投递器
#[derive(Debug, Default)]
pub struct HttpDeliverer {
    clients: ClientCache,
}

impl HttpDeliverer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Deliver for HttpDeliverer {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, payload: &CanonicalPayload, config: &NotifierConfig) -> Result<()> {
        // 每次投递时检查，配置可能在构造之后才补上
        let url = parse_destination(config)?;

        let client = self.clients.get(ClientOptions {
            timeout: config.request_timeout(),
            accept_invalid_certs: config.accept_invalid_certs,
        })?;

        debug!(
            url = %url,
            payload = %payload.summary(),
            "Sending notification to renderer"
        );

        let start = std::time::Instant::now();
        let response = client.post(url.clone()).json(&payload.body()).send().await?;
        let status = response.status();

        if status.is_success() {
            info!(
                url = %url,
                status = status.as_u16(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Notification sent"
            );
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// 解析目标地址：必须是绝对的 http/https URL
pub fn parse_destination(config: &NotifierConfig) -> Result<Url> {
    let raw = config.destination().ok_or_else(|| {
        DispatchError::Configuration("server url is not configured".to_string())
    })?;

    let url = Url::parse(raw).map_err(|e| {
        DispatchError::Configuration(format!("invalid server url '{}': {}", raw, e))
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(DispatchError::Configuration(format!(
            "unsupported server url scheme '{}'",
            scheme
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{build_payload, NotifierOptions};

    #[tokio::test]
    async fn test_blank_destination_is_configuration_error() {
        let deliverer = HttpDeliverer::new();
        let config = NotifierConfig::default().with_server_url("  \t ");
        let payload = build_payload("Title", &NotifierOptions::new(), None, None, &config);

        let err = deliverer.send(&payload, &config).await.unwrap_err();
        assert!(matches!(err, DispatchError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_invalid_destination_is_configuration_error() {
        let deliverer = HttpDeliverer::new();

        for url in ["not a url", "ftp://tv.local/notify", "/notify"] {
            let config = NotifierConfig::default().with_server_url(url);
            let payload = build_payload("Title", &NotifierOptions::new(), None, None, &config);

            let err = deliverer.send(&payload, &config).await.unwrap_err();
            assert!(
                matches!(err, DispatchError::Configuration(_)),
                "{url}: {err}"
            );
        }
    }

    #[test]
    fn test_parse_destination_trims_and_accepts_http() {
        let config = NotifierConfig::default().with_server_url("  https://tv.local:5001/notify \n");
        let url = parse_destination(&config).unwrap();
        assert_eq!(url.as_str(), "https://tv.local:5001/notify");
    }

    #[test]
    fn test_deliverer_name() {
        assert_eq!(HttpDeliverer::new().name(), "http");
    }
}

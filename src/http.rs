//! HTTP 客户端缓存
//!
//! 超时和证书校验选项可能被实时修改，选项变化时才重建客户端。

use reqwest::Client;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;

/// 构建客户端所需的选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub timeout: Duration,
    /// 接受自签名/无效证书（局域网渲染端的信任决定）
    pub accept_invalid_certs: bool,
}

/// 按选项缓存的 reqwest 客户端
#[derive(Debug, Default)]
pub struct ClientCache {
    cached: Mutex<Option<(ClientOptions, Client)>>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取与选项匹配的客户端（Client 内部是 Arc，clone 很便宜）
    pub fn get(&self, options: ClientOptions) -> Result<Client> {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());

        if let Some((current, client)) = cached.as_ref() {
            if *current == options {
                return Ok(client.clone());
            }
        }

        debug!(
            timeout_ms = options.timeout.as_millis() as u64,
            accept_invalid_certs = options.accept_invalid_certs,
            "Building HTTP client"
        );

        let client = Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()?;

        *cached = Some((options, client.clone()));
        Ok(client)
    }
}

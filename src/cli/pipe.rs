//! pipe 命令处理
//!
//! 从 stdin 逐行读取 JSON 请求，全部经过同一个节流队列，EOF 后等待队列清空。

use anyhow::{Context, Result};
use clap::Args;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::open_settings;
use crate::notifier::{Notifier, OverlayNotifier};
use crate::payload::{Media, NotifierOptions};

/// pipe 命令参数
#[derive(Args)]
pub struct PipeArgs {
    /// 临时覆盖渲染端地址
    #[arg(long)]
    pub server_url: Option<String>,
    /// 设置文件路径
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// 单行请求
#[derive(Debug, Clone, Deserialize)]
pub struct PipeRequest {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub media: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub extra: Option<Map<String, Value>>,
}

impl PipeRequest {
    pub fn options(&self) -> NotifierOptions {
        let mut options = NotifierOptions::new();
        if let Some(body) = &self.body {
            options = options.with_body(body.clone());
        }
        if let Some(extra) = &self.extra {
            options = options.with_overrides(extra.clone());
        }
        options
    }
}

/// 解析一行输入，空行返回 None
pub fn parse_line(line: &str) -> Option<Result<PipeRequest>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line).context("Invalid request line"))
}

pub async fn handle_pipe(args: PipeArgs) -> Result<()> {
    let file = open_settings(args.config);
    let mut config = file
        .load()
        .with_context(|| format!("Failed to load settings from {}", file.path().display()))?;
    if let Some(url) = args.server_url {
        config = config.with_server_url(url);
    }

    let notifier = OverlayNotifier::new(config);
    notifier.start();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut accepted = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let request = match parse_line(&line) {
            None => continue,
            Some(Ok(request)) => request,
            Some(Err(e)) => {
                warn!(error = %e, "Skipping request line");
                continue;
            }
        };

        let options = request.options();
        notifier
            .send_notification(
                &request.title,
                Some(&options),
                request.media.map(Media::from),
                request.icon.map(Media::from),
            )
            .await;
        accepted += 1;
    }

    info!(accepted, depth = notifier.queue().depth(), "Input closed, draining queue");
    notifier.drain().await;
    notifier.shutdown().await;

    let stats = notifier.stats();
    info!(
        delivered = stats.delivered,
        failed = stats.failed,
        skipped = stats.skipped,
        "Pipe finished"
    );
    Ok(())
}

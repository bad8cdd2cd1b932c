//! send 命令处理

use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::info;

use super::{open_settings, parse_value};
use crate::cli::output::format_output;
use crate::notifier::{Notifier, OverlayNotifier};
use crate::payload::{Media, NotifierOptions};

/// send 命令参数
#[derive(Args)]
pub struct SendArgs {
    /// 通知标题
    #[arg(long, short)]
    pub title: String,
    /// 通知正文
    #[arg(long, short)]
    pub body: Option<String>,
    /// 图片：mdi 图标名、data URL 或 http(s) 地址
    #[arg(long, short, conflicts_with = "media_file")]
    pub media: Option<String>,
    /// 从本地文件读取图片
    #[arg(long)]
    pub media_file: Option<PathBuf>,
    /// 大图标（mdi 图标名时覆盖 largeIcon 设置）
    #[arg(long)]
    pub icon: Option<String>,
    /// 渲染端字段覆盖，格式 key=value，可重复
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
    /// 临时覆盖渲染端地址
    #[arg(long)]
    pub server_url: Option<String>,
    /// 设置文件路径
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// 以 JSON 输出队列统计
    #[arg(long)]
    pub json: bool,
}

/// 解析 key=value 覆盖项
pub fn parse_overrides(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid override '{}', expected KEY=VALUE", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid override '{}', key is empty", pair);
        }
        map.insert(key.to_string(), parse_value(value));
    }
    Ok(map)
}

/// 发送一条通知并等待队列清空
pub async fn handle_send(args: SendArgs) -> Result<()> {
    let file = open_settings(args.config);
    let mut config = file
        .load()
        .with_context(|| format!("Failed to load settings from {}", file.path().display()))?;

    if let Some(url) = args.server_url {
        config = config.with_server_url(url);
    }
    if config.destination().is_none() {
        bail!("Server URL is not configured, run `overlay-notify set serverUrl <url>` or pass --server-url");
    }

    let media = match (args.media, args.media_file) {
        (Some(text), _) => Some(Media::from(text)),
        (None, Some(path)) => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read media file {}", path.display()))?;
            Some(Media::from(bytes))
        }
        (None, None) => None,
    };

    let mut options = NotifierOptions::new();
    if let Some(body) = args.body {
        options = options.with_body(body);
    }
    let overrides = parse_overrides(&args.overrides)?;
    if !overrides.is_empty() {
        options = options.with_overrides(overrides);
    }

    let notifier = OverlayNotifier::new(config);
    notifier
        .send_notification(&args.title, Some(&options), media, args.icon.map(Media::from))
        .await;
    notifier.drain().await;
    notifier.shutdown().await;

    let stats = notifier.stats();
    info!(delivered = stats.delivered, failed = stats.failed, "Send finished");

    if args.json {
        println!("{}", format_output(&stats, true));
    }

    if stats.delivered == 0 {
        bail!("Notification was not delivered");
    }
    Ok(())
}

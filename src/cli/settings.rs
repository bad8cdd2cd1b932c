//! settings / set 命令处理

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use super::{open_settings, parse_value};
use crate::cli::output::format_settings;
use crate::notifier::{OverlayNotifier, Settings};

/// settings 命令参数
#[derive(Args)]
pub struct SettingsArgs {
    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
    /// 设置文件路径
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// set 命令参数
#[derive(Args)]
pub struct SetArgs {
    /// 设置项 key（如 serverUrl、duration、corner）
    pub key: String,
    /// 新值，能解析为 JSON 时按 JSON 处理
    pub value: String,
    /// 设置文件路径
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// 打印设置项
pub async fn handle_settings(args: SettingsArgs) -> Result<()> {
    let file = open_settings(args.config);
    let notifier = OverlayNotifier::from_settings_file(file.clone())
        .with_context(|| format!("Failed to load settings from {}", file.path().display()))?;

    println!("{}", format_settings(&notifier.settings(), args.json));
    Ok(())
}

/// 校验并持久化一个设置项
pub async fn handle_set(args: SetArgs) -> Result<()> {
    let file = open_settings(args.config);
    let notifier = OverlayNotifier::from_settings_file(file.clone())
        .with_context(|| format!("Failed to load settings from {}", file.path().display()))?;

    notifier
        .put_setting(&args.key, parse_value(&args.value))
        .with_context(|| format!("Failed to update setting '{}'", args.key))?;

    println!("{} updated in {}", args.key, file.path().display());
    Ok(())
}

//! CLI 命令处理

pub mod output;
pub mod pipe;
pub mod send;
pub mod settings;

pub use output::*;
pub use pipe::*;
pub use send::*;
pub use settings::*;

use serde_json::Value;
use std::path::PathBuf;

use crate::config::SettingsFile;

/// 命令行指定路径优先，否则使用默认位置
pub fn open_settings(path: Option<PathBuf>) -> SettingsFile {
    match path {
        Some(path) => SettingsFile::new(path),
        None => SettingsFile::default_location(),
    }
}

/// 命令行值：能解析为 JSON 就按 JSON，否则按字符串
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

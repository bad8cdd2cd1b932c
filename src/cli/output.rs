//! CLI 输出格式化

use serde::Serialize;

use crate::config::Setting;

/// 按 --json 标志输出 JSON，否则输出可读文本
pub fn format_output<T: Serialize>(data: &T, json: bool) -> String {
    if json {
        serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
    } else {
        serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string())
    }
}

/// 设置项表格
pub fn format_settings(settings: &[Setting], json: bool) -> String {
    if json {
        return format_output(&settings, true);
    }

    let width = settings.iter().map(|s| s.key.len()).max().unwrap_or(0);
    settings
        .iter()
        .map(|s| {
            let value = match &s.value {
                serde_json::Value::String(v) if v.is_empty() => "(unset)".to_string(),
                serde_json::Value::String(v) => v.clone(),
                other => other.to_string(),
            };
            format!("{:<width$}  {}  # {}", s.key, value, s.title, width = width)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

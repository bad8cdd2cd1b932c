//! 通知器配置 - 设置快照、设置项描述、设置文件读写
//!
//! 配置由宿主提供，分发器只读；`put_setting` 可以在两次调用之间实时更新。
//!
//! 设置文件（JSON，键名与设置项一致）默认位于
//! `~/.config/overlay-notifier/settings.json`，可用环境变量
//! `OVERLAY_NOTIFIER_CONFIG` 覆盖。

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DispatchError, Result};

/// 默认显示时长（秒），同时作为节流间隔
pub const DEFAULT_DURATION_SECS: u64 = 7;
pub const DEFAULT_LARGE_ICON: &str = "mdi:motion-sensor";
pub const DEFAULT_SMALL_ICON: &str = "mdi:camera";
pub const DEFAULT_SMALL_ICON_COLOR: &str = "#049cdb";
/// 投递请求超时（秒）
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
/// 远程图片下载超时（秒）
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;

/// 设置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "OVERLAY_NOTIFIER_CONFIG";

/// 分发器内共享的配置（宿主可实时更新）
pub type SharedConfig = Arc<RwLock<NotifierConfig>>;

/// 读取当前配置快照
pub fn snapshot(config: &SharedConfig) -> NotifierConfig {
    config.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// 通知在屏幕上的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopStart,
    TopEnd,
    BottomStart,
    #[default]
    BottomEnd,
}

impl Corner {
    /// 解析设置值，未知值返回 None
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "top_start" => Some(Self::TopStart),
            "top_end" => Some(Self::TopEnd),
            "bottom_start" => Some(Self::BottomStart),
            "bottom_end" => Some(Self::BottomEnd),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopStart => "top_start",
            Self::TopEnd => "top_end",
            Self::BottomStart => "bottom_start",
            Self::BottomEnd => "bottom_end",
        }
    }
}

/// 通知器配置快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotifierConfig {
    /// 标识符（写入 payload 的 id 字段）
    pub id: String,
    /// 渲染端地址，如 http://192.168.1.1:5001/notify
    pub server_url: String,
    /// 显示时长（秒），也是两次投递之间的最小间隔
    #[serde(deserialize_with = "lenient_duration")]
    pub duration: u64,
    #[serde(deserialize_with = "lenient_corner")]
    pub corner: Corner,
    pub large_icon: String,
    pub small_icon: String,
    pub small_icon_color: String,
    /// 接受自签名/无效证书。渲染端是局域网内用户自己的设备，默认开启
    #[serde(deserialize_with = "lenient_bool")]
    pub accept_invalid_certs: bool,
    #[serde(rename = "requestTimeout", deserialize_with = "lenient_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(rename = "fetchTimeout", deserialize_with = "lenient_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            server_url: String::new(),
            duration: DEFAULT_DURATION_SECS,
            corner: Corner::default(),
            large_icon: DEFAULT_LARGE_ICON.to_string(),
            small_icon: DEFAULT_SMALL_ICON.to_string(),
            small_icon_color: DEFAULT_SMALL_ICON_COLOR.to_string(),
            accept_invalid_certs: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

impl NotifierConfig {
    /// 设置目标地址
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// 设置标识符
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// 设置显示时长 / 节流间隔
    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration = secs.max(1);
        self
    }

    /// 去掉首尾空白后的目标地址，空白地址返回 None
    pub fn destination(&self) -> Option<&str> {
        let url = self.server_url.trim();
        if url.is_empty() {
            None
        } else {
            Some(url)
        }
    }

    /// 两次投递之间的最小间隔
    pub fn throttle_interval(&self) -> Duration {
        Duration::from_secs(self.duration.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    /// 当前配置的设置项列表
    pub fn settings(&self) -> Vec<Setting> {
        SettingKey::ALL
            .iter()
            .map(|key| Setting {
                key: key.as_str(),
                title: key.title(),
                kind: key.kind(),
                placeholder: key.placeholder(),
                default_value: key.default_value(),
                value: self.value_of(*key),
            })
            .collect()
    }

    /// 读取单个设置项的当前值
    pub fn value_of(&self, key: SettingKey) -> Value {
        match key {
            SettingKey::Id => Value::from(self.id.clone()),
            SettingKey::ServerUrl => Value::from(self.server_url.clone()),
            SettingKey::Duration => Value::from(self.duration),
            SettingKey::Corner => Value::from(self.corner.as_str()),
            SettingKey::LargeIcon => Value::from(self.large_icon.clone()),
            SettingKey::SmallIcon => Value::from(self.small_icon.clone()),
            SettingKey::SmallIconColor => Value::from(self.small_icon_color.clone()),
            SettingKey::AcceptInvalidCerts => Value::from(self.accept_invalid_certs),
            SettingKey::RequestTimeout => Value::from(self.request_timeout_secs),
            SettingKey::FetchTimeout => Value::from(self.fetch_timeout_secs),
        }
    }

    /// 应用一次设置更新
    ///
    /// 数字和布尔值可以用字符串传入。时长类设置无效时回退到默认值，
    /// 而不是报错；未知键和无法识别的位置会返回配置错误。
    pub fn apply(&mut self, key: &str, value: &Value) -> Result<()> {
        let key = SettingKey::parse(key)
            .ok_or_else(|| DispatchError::Configuration(format!("unknown setting: {}", key)))?;

        match key {
            SettingKey::Id => self.id = value_to_string(value),
            SettingKey::ServerUrl => self.server_url = value_to_string(value).trim().to_string(),
            SettingKey::Duration => {
                self.duration = coerce_secs(value).unwrap_or(DEFAULT_DURATION_SECS);
            }
            SettingKey::Corner => {
                let raw = value_to_string(value);
                self.corner = Corner::parse(&raw).ok_or_else(|| {
                    DispatchError::Configuration(format!("invalid corner: {}", raw))
                })?;
            }
            SettingKey::LargeIcon => {
                self.large_icon = non_empty_or(value, DEFAULT_LARGE_ICON);
            }
            SettingKey::SmallIcon => {
                self.small_icon = non_empty_or(value, DEFAULT_SMALL_ICON);
            }
            SettingKey::SmallIconColor => {
                self.small_icon_color = non_empty_or(value, DEFAULT_SMALL_ICON_COLOR);
            }
            SettingKey::AcceptInvalidCerts => {
                self.accept_invalid_certs = coerce_bool(value).ok_or_else(|| {
                    DispatchError::Configuration(format!(
                        "acceptInvalidCerts expects a boolean, got {}",
                        value
                    ))
                })?;
            }
            SettingKey::RequestTimeout => {
                self.request_timeout_secs =
                    coerce_secs(value).unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
            }
            SettingKey::FetchTimeout => {
                self.fetch_timeout_secs = coerce_secs(value).unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
            }
        }

        debug!(setting = key.as_str(), "Setting updated");
        Ok(())
    }
}

/// 设置项键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    Id,
    ServerUrl,
    Duration,
    Corner,
    LargeIcon,
    SmallIcon,
    SmallIconColor,
    AcceptInvalidCerts,
    RequestTimeout,
    FetchTimeout,
}

impl SettingKey {
    pub const ALL: [SettingKey; 10] = [
        Self::Id,
        Self::ServerUrl,
        Self::Duration,
        Self::Corner,
        Self::LargeIcon,
        Self::SmallIcon,
        Self::SmallIconColor,
        Self::AcceptInvalidCerts,
        Self::RequestTimeout,
        Self::FetchTimeout,
    ];

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == key)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::ServerUrl => "serverUrl",
            Self::Duration => "duration",
            Self::Corner => "corner",
            Self::LargeIcon => "largeIcon",
            Self::SmallIcon => "smallIcon",
            Self::SmallIconColor => "smallIconColor",
            Self::AcceptInvalidCerts => "acceptInvalidCerts",
            Self::RequestTimeout => "requestTimeout",
            Self::FetchTimeout => "fetchTimeout",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Id => "Identifier",
            Self::ServerUrl => "Server url",
            Self::Duration => "Notification visibility duration in seconds",
            Self::Corner => "Notification position",
            Self::LargeIcon => "Large icon",
            Self::SmallIcon => "Small icon",
            Self::SmallIconColor => "Icon color",
            Self::AcceptInvalidCerts => "Accept self-signed certificates",
            Self::RequestTimeout => "Request timeout in seconds",
            Self::FetchTimeout => "Image download timeout in seconds",
        }
    }

    pub fn kind(&self) -> SettingKind {
        match self {
            Self::Duration | Self::RequestTimeout | Self::FetchTimeout => SettingKind::Number,
            Self::AcceptInvalidCerts => SettingKind::Boolean,
            _ => SettingKind::String,
        }
    }

    fn placeholder(&self) -> Option<&'static str> {
        match self {
            Self::ServerUrl => Some("http://192.168.1.1:5001/notify"),
            _ => None,
        }
    }

    fn default_value(&self) -> Option<Value> {
        match self {
            Self::Id | Self::ServerUrl => None,
            other => Some(NotifierConfig::default().value_of(*other)),
        }
    }
}

/// 设置项类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingKind {
    String,
    Number,
    Boolean,
}

/// 设置项描述（供宿主渲染设置表单）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub key: &'static str,
    pub title: &'static str,
    #[serde(rename = "type")]
    pub kind: SettingKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    pub value: Value,
}

/// 设置文件
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 默认位置：环境变量优先，其次 ~/.config/overlay-notifier/settings.json
    pub fn default_location() -> Self {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.trim().is_empty() {
                return Self::new(path);
            }
        }

        let path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("overlay-notifier")
            .join("settings.json");
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取设置，文件不存在时返回默认配置
    pub fn load(&self) -> Result<NotifierConfig> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Settings file not found, using defaults");
            return Ok(NotifierConfig::default());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(NotifierConfig::default());
        }

        Ok(serde_json::from_str(&content)?)
    }

    /// 写入设置（带文件锁）
    pub fn save(&self, config: &NotifierConfig) -> Result<()> {
        use fs2::FileExt;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(config)?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;

        file.lock_exclusive()?;
        let written = file
            .set_len(0)
            .and_then(|_| file.write_all(content.as_bytes()))
            .and_then(|_| file.write_all(b"\n"));
        file.unlock()?;
        written?;

        info!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn non_empty_or(value: &Value, fallback: &str) -> String {
    let s = value_to_string(value);
    if s.trim().is_empty() {
        fallback.to_string()
    } else {
        s
    }
}

/// 把数字或数字字符串转换为正整数秒数（小数向上取整）
fn coerce_secs(value: &Value) -> Option<u64> {
    let secs = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if secs.is_finite() && secs > 0.0 {
        Some(secs.ceil() as u64)
    } else {
        None
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

fn lenient_duration<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_secs(&value).unwrap_or(DEFAULT_DURATION_SECS))
}

fn lenient_request_timeout<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_secs(&value).unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
}

fn lenient_fetch_timeout<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_secs(&value).unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS))
}

fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_bool(&value).unwrap_or(true))
}

fn lenient_corner<'de, D>(deserializer: D) -> std::result::Result<Corner, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .and_then(Corner::parse)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = NotifierConfig::default();
        assert_eq!(config.duration, 7);
        assert_eq!(config.corner, Corner::BottomEnd);
        assert_eq!(config.large_icon, "mdi:motion-sensor");
        assert_eq!(config.small_icon, "mdi:camera");
        assert_eq!(config.small_icon_color, "#049cdb");
        assert!(config.accept_invalid_certs);
        assert_eq!(config.throttle_interval(), Duration::from_secs(7));
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_destination_blank_is_none() {
        let config = NotifierConfig::default().with_server_url("   ");
        assert_eq!(config.destination(), None);

        let config = NotifierConfig::default().with_server_url(" http://tv:5001/notify ");
        assert_eq!(config.destination(), Some("http://tv:5001/notify"));
    }

    #[test]
    fn test_apply_duration_coercion() {
        let mut config = NotifierConfig::default();

        config.apply("duration", &json!("12")).unwrap();
        assert_eq!(config.duration, 12);

        config.apply("duration", &json!(2.5)).unwrap();
        assert_eq!(config.duration, 3);

        // 非法值回退到默认
        config.apply("duration", &json!("abc")).unwrap();
        assert_eq!(config.duration, DEFAULT_DURATION_SECS);

        config.apply("duration", &json!(-4)).unwrap();
        assert_eq!(config.duration, DEFAULT_DURATION_SECS);

        config.apply("duration", &Value::Null).unwrap();
        assert_eq!(config.duration, DEFAULT_DURATION_SECS);
    }

    #[test]
    fn test_apply_corner() {
        let mut config = NotifierConfig::default();
        config.apply("corner", &json!("top_start")).unwrap();
        assert_eq!(config.corner, Corner::TopStart);

        let err = config.apply("corner", &json!("middle")).unwrap_err();
        assert!(matches!(err, DispatchError::Configuration(_)));
        assert_eq!(config.corner, Corner::TopStart);
    }

    #[test]
    fn test_apply_bool_from_string() {
        let mut config = NotifierConfig::default();
        config.apply("acceptInvalidCerts", &json!("false")).unwrap();
        assert!(!config.accept_invalid_certs);
        assert!(config.apply("acceptInvalidCerts", &json!("maybe")).is_err());
    }

    #[test]
    fn test_apply_unknown_key() {
        let mut config = NotifierConfig::default();
        let err = config.apply("volume", &json!(3)).unwrap_err();
        assert!(err.to_string().contains("volume"));
    }

    #[test]
    fn test_empty_icon_falls_back_to_default() {
        let mut config = NotifierConfig::default();
        config.apply("smallIcon", &json!("")).unwrap();
        assert_eq!(config.small_icon, DEFAULT_SMALL_ICON);
    }

    #[test]
    fn test_settings_surface() {
        let config = NotifierConfig::default().with_server_url("http://tv:5001/notify");
        let settings = config.settings();

        assert_eq!(settings.len(), SettingKey::ALL.len());

        let server = settings.iter().find(|s| s.key == "serverUrl").unwrap();
        assert_eq!(server.value, json!("http://tv:5001/notify"));
        assert_eq!(server.placeholder, Some("http://192.168.1.1:5001/notify"));
        assert_eq!(server.default_value, None);

        let duration = settings.iter().find(|s| s.key == "duration").unwrap();
        assert_eq!(duration.kind, SettingKind::Number);
        assert_eq!(duration.default_value, Some(json!(7)));
    }

    #[test]
    fn test_lenient_deserialize() {
        let config: NotifierConfig = serde_json::from_value(json!({
            "serverUrl": "http://tv:5001/notify",
            "duration": "bogus",
            "corner": "sideways"
        }))
        .unwrap();

        assert_eq!(config.server_url, "http://tv:5001/notify");
        assert_eq!(config.duration, DEFAULT_DURATION_SECS);
        assert_eq!(config.corner, Corner::BottomEnd);
        assert_eq!(config.small_icon, DEFAULT_SMALL_ICON);
    }

    #[test]
    fn test_lenient_deserialize_timeouts_and_certs() {
        let config: NotifierConfig = serde_json::from_value(json!({
            "requestTimeout": "20",
            "fetchTimeout": "soon",
            "acceptInvalidCerts": "false"
        }))
        .unwrap();

        assert_eq!(config.request_timeout_secs, 20);
        assert_eq!(config.fetch_timeout_secs, DEFAULT_FETCH_TIMEOUT_SECS);
        assert!(!config.accept_invalid_certs);

        let config: NotifierConfig = serde_json::from_value(json!({
            "requestTimeout": -3,
            "acceptInvalidCerts": "maybe"
        }))
        .unwrap();
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert!(config.accept_invalid_certs);
    }

    #[test]
    fn test_settings_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = SettingsFile::new(dir.path().join("nested").join("settings.json"));

        // 文件不存在时返回默认配置
        assert_eq!(file.load().unwrap(), NotifierConfig::default());

        let config = NotifierConfig::default()
            .with_server_url("https://tv.local:5001/notify")
            .with_id("living-room")
            .with_duration(10);
        file.save(&config).unwrap();

        assert_eq!(file.load().unwrap(), config);
    }
}

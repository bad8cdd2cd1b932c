//! Payload 归一化模块 - 把通知请求转换为渲染端 payload
//!
//! 媒体输入有四种形态（图标关键字、data URL、远程 URL、原始字节），
//! 统一折叠为 payload 的 `image` 字段：要么省略，要么是 `mdi:*` 关键字，
//! 要么是 base64 字符串，不会是原始 URL 或原始字节。
//!
//! Payload 格式：
//! ```json
//! {
//!   "id": "living-room",
//!   "title": "Front door",
//!   "message": "Motion detected",
//!   "corner": "bottom_end",
//!   "duration": 7,
//!   "largeIcon": "mdi:motion-sensor",
//!   "smallIcon": "mdi:camera",
//!   "smallIconColor": "#049cdb",
//!   "image": "<base64>"
//! }
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::{Corner, NotifierConfig};
use crate::error::{DispatchError, Result};
use crate::http::{ClientCache, ClientOptions};

/// 图标关键字前缀（渲染端自己解析）
pub const ICON_KEYWORD_PREFIX: &str = "mdi:";

/// `NotifierOptions::data` 中存放覆盖字段的命名空间键
pub const EXTENSION_KEY: &str = "androidTvOverlay";

/// 宿主传入的媒体
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Media {
    /// 关键字、data URL、远程 URL 或其他字符串
    Text(String),
    /// 已解码的原始字节
    Bytes(Vec<u8>),
}

impl From<&str> for Media {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Media {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for Media {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// 文本媒体的分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind<'a> {
    Empty,
    IconKeyword(&'a str),
    DataUrl(&'a str),
    RemoteUrl(&'a str),
    Other(&'a str),
}

/// 对文本媒体分类（按顺序匹配，第一条命中为准）
///
/// 前缀判断忽略首尾空白；无法识别的字符串原样返回（不去空白）。
pub fn classify(media: &str) -> MediaKind<'_> {
    let trimmed = media.trim();
    let lower = trimmed.get(..8).unwrap_or(trimmed).to_ascii_lowercase();

    if trimmed.is_empty() {
        MediaKind::Empty
    } else if trimmed.starts_with(ICON_KEYWORD_PREFIX) {
        MediaKind::IconKeyword(trimmed)
    } else if lower.starts_with("data:") {
        MediaKind::DataUrl(trimmed)
    } else if lower.starts_with("http://") || lower.starts_with("https://") {
        MediaKind::RemoteUrl(trimmed)
    } else {
        MediaKind::Other(media)
    }
}

/// 去掉 data URL 第一个逗号（含）之前的部分，剩余部分原样作为 base64
pub fn decode_data_url(url: &str) -> Result<&str> {
    match url.split_once(',') {
        Some((_, data)) if !data.is_empty() => Ok(data),
        Some(_) => Err(DispatchError::Transform("data URL has no payload".to_string())),
        None => Err(DispatchError::Transform(
            "data URL is missing the ',' separator".to_string(),
        )),
    }
}

/// 通知选项（正文、带副标题的正文、扩展数据）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_with_subtitle: Option<String>,
    /// 扩展数据；`androidTvOverlay` 键下的对象会原样合并进 payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl NotifierOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_body_with_subtitle(mut self, body: impl Into<String>) -> Self {
        self.body_with_subtitle = Some(body.into());
        self
    }

    /// 设置覆盖字段（写入 `data.androidTvOverlay`）
    pub fn with_overrides(mut self, overrides: Map<String, Value>) -> Self {
        self.data
            .get_or_insert_with(Map::new)
            .insert(EXTENSION_KEY.to_string(), Value::Object(overrides));
        self
    }

    /// 取出覆盖字段，值不是对象时忽略
    pub fn overrides(&self) -> Map<String, Value> {
        match self.data.as_ref().and_then(|d| d.get(EXTENSION_KEY)) {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                warn!(
                    key = EXTENSION_KEY,
                    value_type = json_type(other),
                    "Ignoring overrides that are not an object"
                );
                Map::new()
            }
        }
    }

    /// 正文：body 优先，其次 bodyWithSubtitle
    pub fn message(&self) -> Option<String> {
        self.body.clone().or_else(|| self.body_with_subtitle.clone())
    }
}

/// 归一化后的 payload（队列中的实体）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalPayload {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub corner: Corner,
    /// 渲染端显示时长（秒）
    pub duration: u64,
    pub large_icon: String,
    pub small_icon: String,
    pub small_icon_color: String,
    /// 省略、`mdi:*` 关键字或 base64
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// 调用方覆盖字段，构建请求体时最后合并
    #[serde(skip)]
    pub overrides: Map<String, Value>,
}

impl CanonicalPayload {
    /// 构建请求体：规范字段 + 覆盖字段（同名时覆盖字段优先）
    pub fn body(&self) -> Map<String, Value> {
        let mut body = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        for (key, value) in &self.overrides {
            body.insert(key.clone(), value.clone());
        }

        body
    }

    /// 日志用摘要（不输出 base64 图片内容）
    pub fn summary(&self) -> String {
        match &self.image {
            Some(image) if image.starts_with(ICON_KEYWORD_PREFIX) => {
                format!("{} [image: {}]", self.title, image)
            }
            Some(image) => format!("{} [image: {} bytes base64]", self.title, image.len()),
            None => self.title.clone(),
        }
    }
}

/// 用已解析好的图片构建 payload（纯函数，无 I/O）
pub fn build_payload(
    title: &str,
    options: &NotifierOptions,
    icon: Option<&Media>,
    image: Option<String>,
    config: &NotifierConfig,
) -> CanonicalPayload {
    let large_icon = match icon {
        Some(Media::Text(text)) => match classify(text) {
            MediaKind::IconKeyword(keyword) => keyword.to_string(),
            _ => {
                debug!("Icon is not an icon keyword, using configured large icon");
                config.large_icon.clone()
            }
        },
        Some(Media::Bytes(_)) => {
            debug!("Binary icon is not supported, using configured large icon");
            config.large_icon.clone()
        }
        None => config.large_icon.clone(),
    };

    CanonicalPayload {
        id: config.id.clone(),
        title: title.to_string(),
        message: options.message(),
        corner: config.corner,
        duration: config.duration,
        large_icon,
        small_icon: config.small_icon.clone(),
        small_icon_color: config.small_icon_color.clone(),
        image,
        overrides: options.overrides(),
    }
}

/// Payload 归一化器
#[derive(Debug, Default)]
pub struct PayloadNormalizer {
    clients: ClientCache,
}

impl PayloadNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 归一化通知请求
    ///
    /// 只有在需要下载远程图片且下载失败时返回错误，由调用方决定是否去掉图片重试。
    pub async fn normalize(
        &self,
        title: &str,
        options: &NotifierOptions,
        media: Option<&Media>,
        icon: Option<&Media>,
        config: &NotifierConfig,
    ) -> Result<CanonicalPayload> {
        let image = self.resolve_image(media, config).await?;
        Ok(build_payload(title, options, icon, image, config))
    }

    /// 解析媒体为 image 字段
    pub async fn resolve_image(
        &self,
        media: Option<&Media>,
        config: &NotifierConfig,
    ) -> Result<Option<String>> {
        let text = match media {
            None => return Ok(None),
            Some(Media::Bytes(bytes)) if bytes.is_empty() => return Ok(None),
            Some(Media::Bytes(bytes)) => return Ok(Some(STANDARD.encode(bytes))),
            Some(Media::Text(text)) => text,
        };

        match classify(text) {
            MediaKind::Empty => Ok(None),
            MediaKind::IconKeyword(keyword) => Ok(Some(keyword.to_string())),
            MediaKind::DataUrl(url) => match decode_data_url(url) {
                Ok(data) => Ok(Some(data.to_string())),
                Err(e) => {
                    warn!(error = %e, "Malformed data URL, sending without image");
                    Ok(None)
                }
            },
            MediaKind::RemoteUrl(url) => {
                let bytes = self.fetch(url, config).await?;
                debug!(url, size = bytes.len(), "Fetched remote image");
                Ok(Some(STANDARD.encode(&bytes)))
            }
            MediaKind::Other(other) => Ok(Some(other.to_string())),
        }
    }

    /// 下载远程图片（有超时，证书校验按配置放宽）
    async fn fetch(&self, url: &str, config: &NotifierConfig) -> Result<Vec<u8>> {
        let client = self.clients.get(ClientOptions {
            timeout: config.fetch_timeout(),
            accept_invalid_certs: config.accept_invalid_certs,
        })?;

        let response = client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

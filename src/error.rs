//! 分发错误类型
//!
//! 所有错误都不会终止分发器：在归一化或投递点记录日志后继续下一个 tick。

use thiserror::Error;

/// 分发器错误
#[derive(Debug, Error)]
pub enum DispatchError {
    /// 目标地址缺失或设置值非法（跳过本次投递）
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 媒体输入格式错误（图片字段被省略，通知照常投递）
    #[error("media transform error: {0}")]
    Transform(String),

    /// 连接失败或超时
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// 非 2xx 响应
    #[error("unexpected response status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("settings file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DispatchError {
    /// 是否为网络类错误（连接、超时、非 2xx）
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Status { .. })
    }

    /// 是否为超时
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Network(e) if e.is_timeout())
    }
}

pub type Result<T, E = DispatchError> = std::result::Result<T, E>;

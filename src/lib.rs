//! Overlay Notifier - 按设备节流地把通知推送到 Android TV 叠加层渲染端
//!
//! 调用方传入标题、正文、可选图片和图标；通知被归一化为渲染端 payload，
//! 进入节流队列，由后台循环按配置的间隔逐个 POST 到渲染端。

pub mod cli;
pub mod config;
pub mod deliver;
pub mod error;
pub mod http;
pub mod notifier;
pub mod payload;
pub mod queue;

pub use config::{Corner, NotifierConfig, Setting, SettingKey, SettingKind, SettingsFile, SharedConfig};
pub use deliver::{Deliver, HttpDeliverer};
pub use error::{DispatchError, Result};
pub use notifier::{Notifier, OverlayNotifier, Settings};
pub use payload::{build_payload, CanonicalPayload, Media, MediaKind, NotifierOptions, PayloadNormalizer};
pub use queue::{DeliveryOutcome, QueueStats, ThrottledQueue, TickOutcome};

//! 通知器 - 宿主调用的入口
//!
//! 宿主只需要两件事：用配置构造通知器，以及在需要显示内容时调用 `send_notification`。
//! 投递与调用方解耦，调用方只能通过日志观察投递失败。

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{snapshot, NotifierConfig, Setting, SettingsFile, SharedConfig};
use crate::deliver::{Deliver, HttpDeliverer};
use crate::error::Result;
use crate::payload::{build_payload, Media, NotifierOptions, PayloadNormalizer};
use crate::queue::{QueueStats, ThrottledQueue};

/// 通知入口 trait
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 归一化并入队一个通知，不返回投递结果
    async fn send_notification(
        &self,
        title: &str,
        options: Option<&NotifierOptions>,
        media: Option<Media>,
        icon: Option<Media>,
    );
}

/// 设置 trait
pub trait Settings {
    /// 设置项列表（含当前值）
    fn settings(&self) -> Vec<Setting>;

    /// 实时更新一个设置项
    fn put_setting(&self, key: &str, value: Value) -> Result<()>;
}

/// Android TV 叠加层通知器
pub struct OverlayNotifier {
    config: SharedConfig,
    normalizer: PayloadNormalizer,
    queue: ThrottledQueue,
    settings_file: Option<SettingsFile>,
    /// 宿主显式停止后，发送只入队不再自动启动循环
    stopped: AtomicBool,
}

impl OverlayNotifier {
    /// 使用 HTTP 投递器创建
    pub fn new(config: NotifierConfig) -> Self {
        Self::with_deliverer(config, Arc::new(HttpDeliverer::new()))
    }

    /// 使用自定义投递器创建
    pub fn with_deliverer(config: NotifierConfig, deliverer: Arc<dyn Deliver>) -> Self {
        let config: SharedConfig = Arc::new(RwLock::new(config));
        let queue = ThrottledQueue::new(config.clone(), deliverer);

        Self {
            config,
            normalizer: PayloadNormalizer::new(),
            queue,
            settings_file: None,
            stopped: AtomicBool::new(false),
        }
    }

    /// 从设置文件加载配置，之后的 `put_setting` 会写回该文件
    pub fn from_settings_file(file: SettingsFile) -> Result<Self> {
        let config = file.load()?;
        info!(path = %file.path().display(), "Loaded notifier settings");

        let mut notifier = Self::new(config);
        notifier.settings_file = Some(file);
        Ok(notifier)
    }

    /// 设置队列 tick 周期
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.queue = self.queue.with_tick_period(period);
        self
    }

    /// 当前配置快照
    pub fn config(&self) -> NotifierConfig {
        snapshot(&self.config)
    }

    pub fn queue(&self) -> &ThrottledQueue {
        &self.queue
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// 启动（或重启）后台循环，并清除停止状态
    pub fn start(&self) {
        self.stopped.store(false, Ordering::SeqCst);
        self.queue.start();
    }

    /// 停止后台循环；之后的 `send_notification` 只入队，直到再次 `start`
    pub fn stop(&self) -> bool {
        self.stopped.store(true, Ordering::SeqCst);
        self.queue.stop()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// 等待已入队的通知全部投递完（循环未运行时会启动它）
    pub async fn drain(&self) {
        if !self.queue.is_running() {
            self.start();
        }
        self.queue.drain().await;
    }

    pub async fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.queue.shutdown().await;
    }
}

#[async_trait]
impl Notifier for OverlayNotifier {
    async fn send_notification(
        &self,
        title: &str,
        options: Option<&NotifierOptions>,
        media: Option<Media>,
        icon: Option<Media>,
    ) {
        let config = snapshot(&self.config);
        let options = options.cloned().unwrap_or_default();

        let payload = match self
            .normalizer
            .normalize(title, &options, media.as_ref(), icon.as_ref(), &config)
            .await
        {
            Ok(payload) => payload,
            Err(e) => {
                // 图片下载失败时不阻塞调用方，去掉图片继续发送
                warn!(title, error = %e, "Image fetch failed, queueing without image");
                build_payload(title, &options, icon.as_ref(), None, &config)
            }
        };

        self.queue.enqueue(payload);

        if !self.queue.is_running() && !self.is_stopped() {
            self.queue.start();
        }
    }
}

impl Settings for OverlayNotifier {
    fn settings(&self) -> Vec<Setting> {
        snapshot(&self.config).settings()
    }

    /// 先写文件再替换内存中的配置，写入失败时配置保持不变
    fn put_setting(&self, key: &str, value: Value) -> Result<()> {
        let mut config = self.config.write().unwrap_or_else(|e| e.into_inner());
        let mut updated = config.clone();
        updated.apply(key, &value)?;

        if let Some(file) = &self.settings_file {
            file.save(&updated)?;
        }

        *config = updated;
        info!(setting = key, "Notifier setting updated");
        Ok(())
    }
}

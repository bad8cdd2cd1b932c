//! 节流队列 - 无界 FIFO + 后台调度循环
//!
//! 每个 tick 最多放行一个 payload，且距离上一次放行至少经过一个节流间隔。
//! 节流间隔在每个 tick 从配置读取，配置实时更新后下一个 tick 生效。
//!
//! 状态：
//! - Idle：队列为空，tick 什么都不做
//! - Pending：队列非空，距上次放行不足一个间隔
//! - Releasing：队列非空且间隔已到，弹出队首交给投递器，放行时间更新为本次 tick
//!
//! 投递失败和成功一样会消耗 payload，不重试、不重新入队。

use chrono::Utc;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{snapshot, SharedConfig};
use crate::deliver::Deliver;
use crate::error::DispatchError;
use crate::payload::CanonicalPayload;

/// 默认 tick 周期，必须不大于最小节流间隔（1 秒）
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

/// 一次投递的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 渲染端返回 2xx
    Delivered,
    /// 配置错误，未发出请求
    Skipped(String),
    /// 网络错误或非 2xx，payload 被丢弃
    Failed(String),
}

/// 一次 tick 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Pending { remaining: Duration },
    Released { outcome: DeliveryOutcome },
}

/// 队列统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub depth: usize,
    pub delivered: u64,
    pub failed: u64,
    pub skipped: u64,
    /// 最近一次放行时间（RFC 3339）
    pub last_delivery_at: Option<String>,
}

struct Shared {
    pending: Mutex<VecDeque<CanonicalPayload>>,
    /// 只由 tick 写入
    last_release: Mutex<Option<Instant>>,
    /// 保证同一时刻最多一个投递（重启时旧循环可能还在跑最后一个 tick）
    delivery_gate: tokio::sync::Mutex<()>,
    config: SharedConfig,
    deliverer: Arc<dyn Deliver>,
    stats: Mutex<QueueStats>,
    active_loops: AtomicUsize,
}

impl Shared {
    async fn tick(&self) -> TickOutcome {
        let _gate = self.delivery_gate.lock().await;
        let config = snapshot(&self.config);
        let now = Instant::now();

        let payload = {
            let mut pending = lock(&self.pending);
            if pending.is_empty() {
                return TickOutcome::Idle;
            }

            let mut last_release = lock(&self.last_release);
            if let Some(last) = *last_release {
                let elapsed = now.saturating_duration_since(last);
                let interval = config.throttle_interval();
                if elapsed < interval {
                    return TickOutcome::Pending {
                        remaining: interval - elapsed,
                    };
                }
            }

            let Some(payload) = pending.pop_front() else {
                return TickOutcome::Idle;
            };
            *last_release = Some(now);
            payload
        };

        debug!(
            payload = %payload.summary(),
            deliverer = self.deliverer.name(),
            "Releasing notification"
        );

        let outcome = match self.deliverer.send(&payload, &config).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(DispatchError::Configuration(reason)) => {
                warn!(
                    title = %payload.title,
                    reason = %reason,
                    "Delivery skipped, notification dropped"
                );
                DeliveryOutcome::Skipped(reason)
            }
            Err(e) => {
                error!(
                    title = %payload.title,
                    error = %e,
                    timeout = e.is_timeout(),
                    "Delivery failed, notification dropped"
                );
                DeliveryOutcome::Failed(e.to_string())
            }
        };

        self.record(&outcome);
        TickOutcome::Released { outcome }
    }

    fn record(&self, outcome: &DeliveryOutcome) {
        let mut stats = lock(&self.stats);
        match outcome {
            DeliveryOutcome::Delivered => stats.delivered += 1,
            DeliveryOutcome::Skipped(_) => stats.skipped += 1,
            DeliveryOutcome::Failed(_) => stats.failed += 1,
        }
        stats.last_delivery_at = Some(Utc::now().to_rfc3339());
    }
}

struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// 节流队列
pub struct ThrottledQueue {
    shared: Arc<Shared>,
    tick_period: Duration,
    worker: Mutex<Option<Worker>>,
}

impl ThrottledQueue {
    /// 创建队列（不会自动启动循环）
    pub fn new(config: SharedConfig, deliverer: Arc<dyn Deliver>) -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(VecDeque::new()),
                last_release: Mutex::new(None),
                delivery_gate: tokio::sync::Mutex::new(()),
                config,
                deliverer,
                stats: Mutex::new(QueueStats::default()),
                active_loops: AtomicUsize::new(0),
            }),
            tick_period: DEFAULT_TICK_PERIOD,
            worker: Mutex::new(None),
        }
    }

    /// 设置 tick 周期
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period.max(Duration::from_millis(1));
        self
    }

    /// 追加到队尾，不阻塞、不拒绝
    pub fn enqueue(&self, payload: CanonicalPayload) -> usize {
        let title = payload.title.clone();
        let depth = {
            let mut pending = lock(&self.shared.pending);
            pending.push_back(payload);
            pending.len()
        };

        info!(title = %title, depth, "Notification queued");
        depth
    }

    /// 当前队列深度
    pub fn depth(&self) -> usize {
        lock(&self.shared.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    /// 执行一次 tick（后台循环调用的就是它）
    pub async fn tick(&self) -> TickOutcome {
        self.shared.tick().await
    }

    /// 启动后台循环；已在运行时先停止旧循环
    pub fn start(&self) {
        let mut worker = lock(&self.worker);

        if let Some(previous) = worker.take() {
            debug!("Stopping previous queue loop before restart");
            previous.token.cancel();
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            self.shared.clone(),
            self.tick_period,
            token.clone(),
        ));

        info!(
            tick_period_ms = self.tick_period.as_millis() as u64,
            "Throttled queue loop started"
        );
        *worker = Some(Worker { token, handle });
    }

    /// 停止后台循环（可重复调用）。正在进行的 tick 会完成投递后再退出。
    pub fn stop(&self) -> bool {
        match lock(&self.worker).take() {
            Some(worker) => {
                worker.token.cancel();
                info!("Throttled queue loop stopping");
                true
            }
            None => false,
        }
    }

    /// 停止后台循环并等待其退出
    pub async fn shutdown(&self) {
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            worker.token.cancel();
            if let Err(e) = worker.handle.await {
                warn!(error = %e, "Queue loop task ended abnormally");
            }
        }
    }

    /// 循环是否在运行
    pub fn is_running(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .map(|w| !w.handle.is_finished())
            .unwrap_or(false)
    }

    /// 当前存活的循环数量（重启期间旧循环退出前可能短暂为 2）
    pub fn active_loops(&self) -> usize {
        self.shared.active_loops.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = lock(&self.shared.stats).clone();
        stats.depth = self.depth();
        stats
    }

    /// 等待队列清空（循环需在运行）
    pub async fn drain(&self) {
        while !self.is_empty() {
            tokio::time::sleep(self.tick_period).await;
        }
        // 最后一个 payload 出队后投递可能还在进行
        let _gate = self.shared.delivery_gate.lock().await;
    }
}

impl Drop for ThrottledQueue {
    fn drop(&mut self) {
        if let Some(worker) = lock(&self.worker).take() {
            worker.token.cancel();
        }
    }
}

/// 存活循环计数守卫
struct LoopGuard(Arc<Shared>);

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.active_loops.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn run_loop(shared: Arc<Shared>, period: Duration, token: CancellationToken) {
    shared.active_loops.fetch_add(1, Ordering::SeqCst);
    let _guard = LoopGuard(shared.clone());

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                shared.tick().await;
            }
        }
    }

    info!("Throttled queue loop stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

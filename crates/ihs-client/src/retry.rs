//! 上位リクエストの再送タスク
//!
//! トランスポート層は再送しない。応答が来るまで同じリクエストを送り直すのは
//! このタスクの役目（CONNECT、ペアリング・ストリーミング開始の要求など）。
//! 一定間隔で発火し、回数の上限に達するか取り消されたら止まる。

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// 取り消しフラグ（複製して別タスクから立てられる）
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// 取り消されるまで待つ
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// 固定間隔の再送タスク
pub struct RetryTask {
    interval: Interval,
    period: Duration,
    max_attempts: u32,
    attempts: u32,
    /// 最後の送信から 1 周期待っても応答がなかった
    expired: bool,
    cancel: CancelFlag,
}

impl RetryTask {
    /// 最初の発火は `period` 後
    ///
    /// `max_attempts` は最初の送信を含む総回数。
    pub fn new(period: Duration, max_attempts: u32) -> Self {
        Self::with_cancel(period, max_attempts, CancelFlag::new())
    }

    pub fn with_cancel(period: Duration, max_attempts: u32, cancel: CancelFlag) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        RetryTask {
            interval,
            period,
            max_attempts,
            // 最初の送信は呼び出し側が済ませている
            attempts: 1,
            expired: false,
            cancel,
        }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// これまでの送信回数（最初の送信を含む）
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// まだ待っているか
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.expired
    }

    /// 次の発火を待つ
    ///
    /// 再送すべきなら送信回数（2 以上）を返す。最後の送信からさらに 1 周期
    /// 経った（期限切れ）か、取り消されたら `None`。
    pub async fn tick(&mut self) -> Option<u32> {
        if !self.is_active() {
            return None;
        }
        tokio::select! {
            _ = self.interval.tick() => {}
            _ = self.cancel.cancelled() => return None,
        }
        if self.attempts >= self.max_attempts {
            self.expired = true;
            return None;
        }
        self.attempts += 1;
        Some(self.attempts)
    }

    /// 応答が得られるまで `attempt` を繰り返す
    ///
    /// `attempt` には送信回数（1 始まり）が渡る。`Some` が返ればそれを返す。
    pub async fn run<T, F, Fut>(&mut self, mut attempt: F) -> Option<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let mut n = self.attempts;
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            if let Some(value) = attempt(n).await {
                return Some(value);
            }
            n = self.tick().await?;
        }
    }
}

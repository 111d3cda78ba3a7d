//! 投递确认：发布句柄、确认方式、监听器与计数

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rumqttc::QoS;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::DeliveryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// QoS 0 表示已写出，QoS 1/2 表示收到 PUBACK / PUBCOMP
    Acknowledged { pkid: u16 },
    Failed(String),
    Pending,
}

/// 一次发布的确认句柄，可以等待，也可以直接丢弃
#[derive(Debug)]
pub struct DeliveryHandle {
    rx: oneshot::Receiver<DeliveryOutcome>,
}

impl DeliveryHandle {
    /// 创建一对通知端和句柄，通知端由事件循环持有
    pub fn pair() -> (oneshot::Sender<DeliveryOutcome>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// 已经有结果的句柄
    pub fn resolved(outcome: DeliveryOutcome) -> Self {
        let (tx, handle) = Self::pair();
        let _ = tx.send(outcome);
        handle
    }

    /// 非阻塞地查看当前结果
    pub fn try_outcome(&mut self) -> DeliveryOutcome {
        match self.rx.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::error::TryRecvError::Empty) => DeliveryOutcome::Pending,
            Err(oneshot::error::TryRecvError::Closed) => {
                DeliveryOutcome::Failed(DeliveryError::Dropped.to_string())
            }
        }
    }

    /// 等待投递完成，返回 packet id
    pub async fn wait(self) -> Result<u16, DeliveryError> {
        match self.rx.await {
            Ok(DeliveryOutcome::Acknowledged { pkid }) => Ok(pkid),
            Ok(DeliveryOutcome::Failed(cause)) => Err(DeliveryError::Failed(cause)),
            Ok(DeliveryOutcome::Pending) | Err(_) => Err(DeliveryError::Dropped),
        }
    }

    pub async fn wait_for(self, timeout: Duration) -> Result<u16, DeliveryError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| DeliveryError::TimedOut)?
    }
}

/// 投递结果回调
pub trait DeliveryListener: Send + Sync {
    fn on_success(&self, pkid: u16);
    fn on_failure(&self, error: &DeliveryError);
}

/// 只写日志的监听器
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl DeliveryListener for LoggingListener {
    fn on_success(&self, pkid: u16) {
        info!(pkid = pkid, "监听器：投递成功");
    }

    fn on_failure(&self, error: &DeliveryError) {
        warn!(error = %error, "监听器：投递失败");
    }
}

/// 发布后如何处理确认
#[derive(Clone, Default)]
pub enum ConfirmMode {
    /// 发出即返回，结果在后台计数
    #[default]
    None,
    /// 阻塞等待确认
    Blocking,
    /// 最多等待指定时长
    Timeout(Duration),
    /// 后台等待，结果交给监听器
    Listener(Arc<dyn DeliveryListener>),
}

impl fmt::Debug for ConfirmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Blocking => write!(f, "Blocking"),
            Self::Timeout(d) => write!(f, "Timeout({d:?})"),
            Self::Listener(_) => write!(f, "Listener"),
        }
    }
}

#[derive(Debug, Default)]
pub struct DeliveryStats {
    published: AtomicU64,
    acknowledged: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverySnapshot {
    pub published: u64,
    pub acknowledged: u64,
    pub failed: u64,
    pub timed_out: u64,
}

impl DeliveryStats {
    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self, result: &Result<u16, DeliveryError>) {
        let counter = match result {
            Ok(_) => &self.acknowledged,
            Err(DeliveryError::TimedOut) => &self.timed_out,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            published: self.published.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

struct Waiting {
    seq: u64,
    qos: QoS,
    tx: oneshot::Sender<DeliveryOutcome>,
}

#[derive(Default)]
struct TrackerState {
    next_seq: u64,
    // 已提交给客户端、还没看到 Outgoing::Publish 的请求，按提交顺序排列
    queued: VecDeque<Waiting>,
    // 已写出、等待 PUBACK / PUBCOMP
    inflight: HashMap<u16, oneshot::Sender<DeliveryOutcome>>,
}

/// 把出站 PUBLISH 的 packet id 和后续的 ACK 对应起来
#[derive(Clone, Default)]
pub(crate) struct DeliveryTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl DeliveryTracker {
    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn register(&self, qos: QoS) -> (u64, DeliveryHandle) {
        let (tx, handle) = DeliveryHandle::pair();
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queued.push_back(Waiting { seq, qos, tx });
        (seq, handle)
    }

    /// 请求没能交给客户端时撤销登记
    pub(crate) fn cancel(&self, seq: u64) {
        self.lock().queued.retain(|w| w.seq != seq);
    }

    pub(crate) fn on_outgoing_publish(&self, pkid: u16) {
        let mut state = self.lock();
        let Some(waiting) = state.queued.pop_front() else {
            debug!(pkid = pkid, "出站 PUBLISH 没有对应的等待者");
            return;
        };
        if waiting.qos == QoS::AtMostOnce {
            let _ = waiting.tx.send(DeliveryOutcome::Acknowledged { pkid });
        } else {
            state.inflight.insert(pkid, waiting.tx);
        }
    }

    pub(crate) fn on_ack(&self, pkid: u16) -> bool {
        match self.lock().inflight.remove(&pkid) {
            Some(tx) => {
                let _ = tx.send(DeliveryOutcome::Acknowledged { pkid });
                true
            }
            None => false,
        }
    }

    pub(crate) fn fail_all(&self, cause: &str) -> usize {
        let mut state = self.lock();
        let queued = std::mem::take(&mut state.queued);
        let inflight = std::mem::take(&mut state.inflight);
        let count = queued.len() + inflight.len();
        for tx in queued.into_iter().map(|w| w.tx).chain(inflight.into_values()) {
            let _ = tx.send(DeliveryOutcome::Failed(cause.to_string()));
        }
        count
    }

    pub(crate) fn pending(&self) -> usize {
        let state = self.lock();
        state.queued.len() + state.inflight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn qos1_resolves_on_puback() {
        let tracker = DeliveryTracker::default();
        let (_, mut handle) = tracker.register(QoS::AtLeastOnce);
        tracker.on_outgoing_publish(7);
        assert_eq!(handle.try_outcome(), DeliveryOutcome::Pending);
        assert_eq!(tracker.pending(), 1);
        assert!(tracker.on_ack(7));
        assert_eq!(handle.wait().await, Ok(7));
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn qos0_resolves_once_written() {
        let tracker = DeliveryTracker::default();
        let (_, handle) = tracker.register(QoS::AtMostOnce);
        tracker.on_outgoing_publish(0);
        assert_eq!(handle.wait().await, Ok(0));
    }

    #[tokio::test]
    async fn packets_are_matched_in_submission_order() {
        let tracker = DeliveryTracker::default();
        let (_, first) = tracker.register(QoS::AtLeastOnce);
        let (_, second) = tracker.register(QoS::AtLeastOnce);
        tracker.on_outgoing_publish(1);
        tracker.on_outgoing_publish(2);
        assert!(tracker.on_ack(2));
        assert!(tracker.on_ack(1));
        assert!(!tracker.on_ack(1));
        assert_eq!(first.wait().await, Ok(1));
        assert_eq!(second.wait().await, Ok(2));
    }

    #[tokio::test]
    async fn cancelled_request_is_not_matched() {
        let tracker = DeliveryTracker::default();
        let (seq, _dropped) = tracker.register(QoS::AtLeastOnce);
        tracker.cancel(seq);
        let (_, handle) = tracker.register(QoS::AtLeastOnce);
        tracker.on_outgoing_publish(3);
        tracker.on_ack(3);
        assert_eq!(handle.wait().await, Ok(3));
    }

    #[tokio::test]
    async fn connection_loss_fails_everything_pending() {
        let tracker = DeliveryTracker::default();
        let (_, queued) = tracker.register(QoS::AtLeastOnce);
        let (_, inflight) = tracker.register(QoS::AtLeastOnce);
        tracker.on_outgoing_publish(1);
        // 第一个注册的先被写出
        assert_eq!(tracker.fail_all("connection lost"), 2);
        assert_eq!(queued.wait().await, Err(DeliveryError::Failed("connection lost".into())));
        assert_eq!(inflight.wait().await, Err(DeliveryError::Failed("connection lost".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_times_out() {
        let (_tx, handle) = DeliveryHandle::pair();
        assert_eq!(handle.wait_for(Duration::from_secs(1)).await, Err(DeliveryError::TimedOut));
    }

    #[tokio::test]
    async fn dropped_notifier_reports_dropped() {
        let (tx, handle) = DeliveryHandle::pair();
        drop(tx);
        assert_eq!(handle.wait().await, Err(DeliveryError::Dropped));
    }

    #[test]
    fn stats_count_each_outcome() {
        let stats = DeliveryStats::default();
        stats.record_published();
        stats.record_published();
        stats.record(&Ok(1));
        stats.record(&Err(DeliveryError::TimedOut));
        stats.record(&Err(DeliveryError::Failed("x".into())));
        assert_eq!(
            stats.snapshot(),
            DeliverySnapshot { published: 2, acknowledged: 1, failed: 1, timed_out: 1 }
        );
    }
}

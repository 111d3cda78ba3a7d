//! 周期发布器：按固定间隔生成 payload 并发布
//!
//! 计时器是发布器自己的字段，等待下一次发送用 `sleep_until`，
//! 投递确认通过 [`ConfirmMode`] 选择是否等待。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::QoS;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::delivery::{ConfirmMode, DeliveryHandle, DeliveryListener, DeliverySnapshot, DeliveryStats};
use crate::error::{ConnectionError, DeliveryError, PublishError, TalkerError};
use crate::mqtt::{ConnectionState, DEFAULT_TOPIC};
use crate::payload::PayloadSource;
use crate::timer::SendTimer;

/// 发布目标，生产环境是 MQTT 客户端
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: Vec<u8>,
    ) -> Result<DeliveryHandle, PublishError>;

    fn connection_state(&self) -> watch::Receiver<ConnectionState>;
}

#[async_trait]
impl<T: TelemetrySink + ?Sized> TelemetrySink for Arc<T> {
    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: Vec<u8>,
    ) -> Result<DeliveryHandle, PublishError> {
        (**self).publish(topic, qos, payload).await
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        (**self).connection_state()
    }
}

#[derive(Clone, Debug)]
pub struct PublishSettings {
    pub topic: String,
    pub qos: QoS,
    pub interval: Duration,
    pub confirm: ConfirmMode,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            qos: QoS::AtLeastOnce,
            interval: Duration::from_secs(5),
            confirm: ConfirmMode::None,
        }
    }
}

pub struct PeriodicPublisher<S> {
    sink: S,
    settings: PublishSettings,
    timer: SendTimer,
    source: Box<dyn PayloadSource>,
    stats: Arc<DeliveryStats>,
}

impl<S: TelemetrySink> PeriodicPublisher<S> {
    pub fn new(sink: S, settings: PublishSettings, source: Box<dyn PayloadSource>) -> Self {
        let timer = SendTimer::new(settings.interval, Instant::now());
        Self { sink, settings, timer, source, stats: Arc::new(DeliveryStats::default()) }
    }

    pub fn settings(&self) -> &PublishSettings {
        &self.settings
    }

    pub fn stats(&self) -> DeliverySnapshot {
        self.stats.snapshot()
    }

    pub fn tick(&self, now: Instant) -> bool {
        self.timer.tick(now)
    }

    pub fn reset_timer(&mut self, now: Instant) {
        self.timer.reset(now);
    }

    /// 发布一份已编码的 payload，不等待确认
    pub async fn publish(&self, payload: Vec<u8>) -> Result<DeliveryHandle, PublishError> {
        let handle = self
            .sink
            .publish(&self.settings.topic, self.settings.qos, payload)
            .await?;
        self.stats.record_published();
        Ok(handle)
    }

    /// 到期则发送一次；返回是否发送
    pub async fn on_tick(&mut self, now: Instant) -> Result<bool, TalkerError> {
        if !self.tick(now) {
            return Ok(false);
        }
        let payload = self.source.next_payload().map_err(PublishError::from)?;
        let payload_len = payload.len();
        let handle = self.publish(payload).await?;
        self.reset_timer(now);
        info!(
            topic = %self.settings.topic,
            payload_len = payload_len,
            qos = ?self.settings.qos,
            "已发送遥测消息"
        );
        self.confirm(handle).await;
        Ok(true)
    }

    async fn confirm(&self, handle: DeliveryHandle) {
        match &self.settings.confirm {
            ConfirmMode::None => {
                tokio::spawn(observe(handle, self.stats.clone(), None));
            }
            ConfirmMode::Listener(listener) => {
                tokio::spawn(observe(handle, self.stats.clone(), Some(listener.clone())));
            }
            ConfirmMode::Blocking => {
                let result = handle.wait().await;
                self.record(&result);
            }
            ConfirmMode::Timeout(limit) => {
                let result = handle.wait_for(*limit).await;
                self.record(&result);
            }
        }
    }

    fn record(&self, result: &Result<u16, DeliveryError>) {
        self.stats.record(result);
        match result {
            Ok(pkid) => debug!(pkid = pkid, "已收到投递确认"),
            Err(e) => warn!(error = %e, "投递确认失败"),
        }
    }

    /// 发送循环，只有连接断开或发布请求失败时返回
    pub async fn run(&mut self) -> Result<(), TalkerError> {
        let mut state = self.sink.connection_state();
        if *state.borrow_and_update() != ConnectionState::Connected {
            return Err(ConnectionError::Closed.into());
        }
        self.reset_timer(Instant::now());

        loop {
            let deadline = self.timer.next_deadline();
            debug!(
                next_broadcast_secs = self.timer.remaining(Instant::now()).as_secs_f64(),
                interval_secs = self.timer.interval().as_secs_f64(),
                "等待下次广播"
            );
            tokio::select! {
                _ = sleep_until(deadline) => {}
                changed = state.changed() => {
                    if changed.is_err() || *state.borrow_and_update() == ConnectionState::Disconnected {
                        warn!("MQTT 连接已断开，停止发送");
                        return Err(ConnectionError::Closed.into());
                    }
                    continue;
                }
            }
            self.on_tick(Instant::now()).await?;
        }
    }
}

async fn observe(
    handle: DeliveryHandle,
    stats: Arc<DeliveryStats>,
    listener: Option<Arc<dyn DeliveryListener>>,
) {
    let result = handle.wait().await;
    stats.record(&result);
    match (&result, listener) {
        (Ok(pkid), Some(listener)) => listener.on_success(*pkid),
        (Err(e), Some(listener)) => listener.on_failure(e),
        (Ok(pkid), None) => debug!(pkid = pkid, "已收到投递确认"),
        (Err(e), None) => warn!(error = %e, "投递确认失败"),
    }
}

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS,
};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::delivery::{DeliveryHandle, DeliveryTracker};
use crate::error::{ConfigError, ConnectionError, PublishError};
use crate::publisher::TelemetrySink;
use crate::utils::parse_broker_address;

pub const DEFAULT_BROKER: &str = "broker.hivemq.com:1883";
pub const DEFAULT_CLIENT_ID: &str = "paho_cpp_async_publish";
pub const DEFAULT_TOPIC: &str = "Transmit";
pub const DEFAULT_WILL_PAYLOAD: &str = "Last will and testament.";

#[derive(Clone, Debug, PartialEq)]
pub struct WillConfig {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
    pub retain: bool,
}

impl Default for WillConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            payload: DEFAULT_WILL_PAYLOAD.to_string(),
            qos: QoS::AtLeastOnce,
            retain: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub connect_timeout: Duration,
    /// 只记录在日志里，未确认的消息保存在内存中
    pub persist_dir: Option<PathBuf>,
    pub will: Option<WillConfig>,
}

impl MqttConfig {
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            keep_alive_secs: 30,
            connect_timeout: Duration::from_secs(10),
            persist_dir: None,
            will: Some(WillConfig::default()),
        }
    }

    /// 从 `host:port` 形式的地址构建
    pub fn from_address(address: &str, client_id: impl Into<String>) -> Result<Self, ConfigError> {
        let (host, port) = parse_broker_address(address)?;
        Ok(Self::new(host, port, client_id))
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs));
        // clean_session = true：断开后 broker 不保留会话
        options.set_clean_session(true);
        if let Some(will) = &self.will {
            options.set_last_will(LastWill::new(
                will.topic.clone(),
                will.payload.clone(),
                will.qos,
                will.retain,
            ));
        }
        options
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// 已连接的 MQTT 客户端，事件循环在后台任务里运行
pub struct TalkerMqtt {
    client: AsyncClient,
    tracker: DeliveryTracker,
    // 登记等待者和提交请求必须按同一顺序进行，tracker 按登记顺序匹配 packet id
    submit: AsyncMutex<()>,
    state: watch::Receiver<ConnectionState>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    address: String,
}

/// 建立连接并等待 CONNACK，失败或超时返回 `ConnectionError`
pub async fn connect(config: &MqttConfig) -> Result<TalkerMqtt, ConnectionError> {
    let address = config.address();
    if let Some(dir) = &config.persist_dir {
        info!(persist_dir = %dir.display(), "未确认的消息只保存在内存中，persist_dir 仅作记录");
    }

    let (client, mut eventloop) = AsyncClient::new(config.mqtt_options(), 10);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

    info!(address = %address, client_id = %config.client_id, "正在连接 MQTT broker");
    let session_present = tokio::time::timeout(config.connect_timeout, wait_for_connack(&mut eventloop))
        .await
        .map_err(|_| ConnectionError::Timeout(config.connect_timeout))??;
    info!(
        address = %address,
        session_present = session_present,
        "MQTT 连接已建立"
    );
    let _ = state_tx.send(ConnectionState::Connected);

    let tracker = DeliveryTracker::default();
    let handle = tokio::spawn(drive_event_loop(eventloop, tracker.clone(), state_tx));

    Ok(TalkerMqtt {
        client,
        tracker,
        submit: AsyncMutex::new(()),
        state: state_rx,
        event_loop: Mutex::new(Some(handle)),
        address,
    })
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<bool, ConnectionError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(ack.session_present)
                } else {
                    Err(ConnectionError::Refused(format!("{:?}", ack.code)))
                };
            }
            Ok(event) => debug!(event = ?event, "等待 CONNACK"),
            Err(rumqttc::ConnectionError::ConnectionRefused(code)) => {
                return Err(ConnectionError::Refused(format!("{code:?}")));
            }
            Err(e) => return Err(ConnectionError::Transport(e.to_string())),
        }
    }
}

/// 轮询事件循环，把 PUBLISH / ACK 交给 tracker；连接断开后不重连
async fn drive_event_loop(
    mut eventloop: EventLoop,
    tracker: DeliveryTracker,
    state: watch::Sender<ConnectionState>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                debug!(pkid = pkid, "PUBLISH 已写出");
                tracker.on_outgoing_publish(pkid);
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                if tracker.on_ack(ack.pkid) {
                    info!(pkid = ack.pkid, "投递完成");
                }
            }
            Ok(Event::Incoming(Packet::PubComp(comp))) => {
                if tracker.on_ack(comp.pkid) {
                    info!(pkid = comp.pkid, "投递完成（QoS 2）");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("已发送 DISCONNECT，退出事件循环");
                tracker.fail_all("client disconnected");
                break;
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("broker 发送了 DISCONNECT");
                tracker.fail_all("disconnected by broker");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                let cause = e.to_string();
                let failed = tracker.fail_all(&cause);
                error!(cause = %cause, failed_deliveries = failed, "MQTT 连接丢失，退出事件循环");
                break;
            }
        }
    }
    let _ = state.send(ConnectionState::Disconnected);
}

impl TalkerMqtt {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// 还没有拿到确认的发布数量
    pub fn pending_deliveries(&self) -> usize {
        self.tracker.pending()
    }

    /// 单一发布路径：登记等待者后把请求交给客户端
    ///
    /// 可以并发调用，登记和提交在同一把锁内完成。
    pub async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: Vec<u8>,
    ) -> Result<DeliveryHandle, PublishError> {
        if self.state() != ConnectionState::Connected {
            return Err(PublishError::NotConnected);
        }
        let payload_len = payload.len();
        let _submit = self.submit.lock().await;
        let (seq, handle) = self.tracker.register(qos);
        match self.client.publish(topic, qos, false, payload).await {
            Ok(_) => {
                debug!(topic = %topic, payload_len = payload_len, qos = ?qos, "发布请求已提交");
                Ok(handle)
            }
            Err(e) => {
                self.tracker.cancel(seq);
                error!(topic = %topic, payload_len = payload_len, error = %e, "MQTT 消息发布失败");
                Err(PublishError::Client(e.to_string()))
            }
        }
    }

    /// 发送 DISCONNECT 并等待事件循环退出
    pub async fn disconnect(&self) -> Result<(), PublishError> {
        let pending = self.pending_deliveries();
        if pending > 0 {
            warn!(pending = pending, "断开前仍有未确认的投递");
        }
        if self.state() == ConnectionState::Connected {
            self.client
                .disconnect()
                .await
                .map_err(|e| PublishError::Client(e.to_string()))?;
        }
        let handle = self
            .event_loop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
                warn!("等待事件循环退出超时");
            }
        }
        info!(address = %self.address, "MQTT 连接已断开");
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for TalkerMqtt {
    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: Vec<u8>,
    ) -> Result<DeliveryHandle, PublishError> {
        TalkerMqtt::publish(self, topic, qos, payload).await
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

use serde::Deserialize;
use talker_share::PayloadFormat;

#[derive(Debug, Clone, Deserialize)]
pub struct MqttSettings {
    pub broker: String,
    pub client_id: String,
    #[serde(default)]
    pub persist_dir: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmKind {
    None,
    Blocking,
    Timeout,
    Listener,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishSection {
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    #[serde(default = "default_confirm")]
    pub confirm: ConfirmKind,
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
    #[serde(default)]
    pub format: PayloadFormat,
}

fn default_topic() -> String {
    "Transmit".to_string()
}

fn default_qos() -> u8 {
    1
}

fn default_interval_secs() -> f64 {
    5.0
}

fn default_confirm() -> ConfirmKind {
    ConfirmKind::None
}

fn default_confirm_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Position,
    VehicleState,
    Text,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayloadSection {
    #[serde(default = "default_payload_kind")]
    pub kind: PayloadKind,
    #[serde(default = "default_message_type")]
    pub message_type: i32,
    #[serde(default = "default_id")]
    pub id: i32,
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
    /// 文本模式下轮流发送，为空时使用内置的四条演示文本
    #[serde(default)]
    pub texts: Vec<String>,
}

fn default_payload_kind() -> PayloadKind {
    PayloadKind::Position
}

fn default_message_type() -> i32 {
    1
}

fn default_id() -> i32 {
    47
}

fn default_latitude() -> f64 {
    22.0222
}

fn default_longitude() -> f64 {
    98.4555
}

#[derive(Debug, Clone, Deserialize)]
pub struct WillSection {
    #[serde(default = "default_will_enabled")]
    pub enabled: bool,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_will_payload")]
    pub payload: String,
    #[serde(default = "default_qos")]
    pub qos: u8,
}

fn default_will_enabled() -> bool {
    true
}

fn default_will_payload() -> String {
    "Last will and testament.".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub mqtt: MqttSettings,
    #[serde(default = "default_publish_section")]
    pub publish: PublishSection,
    #[serde(default = "default_payload_section")]
    pub payload: PayloadSection,
    #[serde(default = "default_will_section")]
    pub will: WillSection,
}

fn default_publish_section() -> PublishSection {
    PublishSection {
        topic: default_topic(),
        qos: default_qos(),
        interval_secs: default_interval_secs(),
        confirm: default_confirm(),
        confirm_timeout_ms: default_confirm_timeout_ms(),
        format: PayloadFormat::Binary,
    }
}

fn default_payload_section() -> PayloadSection {
    PayloadSection {
        kind: default_payload_kind(),
        message_type: default_message_type(),
        id: default_id(),
        latitude: default_latitude(),
        longitude: default_longitude(),
        texts: Vec::new(),
    }
}

fn default_will_section() -> WillSection {
    WillSection {
        enabled: default_will_enabled(),
        topic: default_topic(),
        payload: default_will_payload(),
        qos: default_qos(),
    }
}

use thiserror::Error;

/// 连接阶段的错误（致命，进程以 1 退出）
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("连接 broker 超时（{0:?}）")]
    Timeout(std::time::Duration),
    #[error("broker 拒绝连接: {0}")]
    Refused(String),
    #[error("网络传输错误: {0}")]
    Transport(String),
    #[error("MQTT 连接已断开")]
    Closed,
}

/// 发布请求无法交给客户端
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("MQTT 客户端拒绝发布请求: {0}")]
    Client(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("当前未连接到 broker")]
    NotConnected,
}

/// 投递确认失败，只记录和计数，不影响发送循环
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("投递失败: {0}")]
    Failed(String),
    #[error("等待投递确认超时")]
    TimedOut,
    #[error("投递结果已丢失（事件循环已退出）")]
    Dropped,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload 长度错误: 期望 {expected} 字节，实际 {actual} 字节")]
    Length { expected: usize, actual: usize },
    #[error("JSON 编解码失败: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("broker 地址为空")]
    Empty,
    #[error("broker 地址 `{0}` 缺少主机名")]
    MissingHost(String),
    #[error("broker 地址 `{address}` 的端口无效: {port}")]
    InvalidPort { address: String, port: String },
    #[error("不支持的 QoS 等级: {0}")]
    InvalidQos(u8),
}

#[derive(Debug, Error)]
pub enum TalkerError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, TalkerError>;

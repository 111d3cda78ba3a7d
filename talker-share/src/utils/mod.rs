use rumqttc::QoS;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{CodecError, ConfigError};

pub const DEFAULT_MQTT_PORT: u16 = 1883;

pub fn encode_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(value)?)
}

pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// 获取当前时间戳（毫秒）
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 获取当前时间戳（秒，带小数）
pub fn now_timestamp_seconds() -> f64 {
    now_timestamp() as f64 / 1000.0
}

/// 解析 broker 地址
///
/// 支持 `host`、`host:port`、`tcp://host:port`、`mqtt://host:port` 以及 `[::1]:port`，
/// 未写端口时使用 1883。
pub fn parse_broker_address(address: &str) -> Result<(String, u16), ConfigError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Empty);
    }
    let rest = trimmed
        .strip_prefix("tcp://")
        .or_else(|| trimmed.strip_prefix("mqtt://"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    let (host, port) = if let Some(v6) = rest.strip_prefix('[') {
        match v6.split_once(']') {
            Some((host, "")) => (host, None),
            Some((host, tail)) => (host, tail.strip_prefix(':').or(Some(tail))),
            None => return Err(ConfigError::MissingHost(address.to_string())),
        }
    } else {
        match rest.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (rest, None),
        }
    };

    if host.is_empty() {
        return Err(ConfigError::MissingHost(address.to_string()));
    }
    let port = match port {
        Some(p) => p.parse::<u16>().ok().filter(|p| *p != 0).ok_or_else(|| {
            ConfigError::InvalidPort { address: address.to_string(), port: p.to_string() }
        })?,
        None => DEFAULT_MQTT_PORT,
    };
    Ok((host.to_string(), port))
}

pub fn qos_from_level(level: u8) -> Result<QoS, ConfigError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(ConfigError::InvalidQos(other)),
    }
}

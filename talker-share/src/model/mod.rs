use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// 车辆位置报文
///
/// 二进制布局固定为小端序 24 字节，没有填充：
/// `i32 message_type | i32 id | f64 latitude | f64 longitude`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimpleMessage {
    pub message_type: i32,
    pub id: i32,
    pub latitude: f64,
    pub longitude: f64,
}

impl SimpleMessage {
    pub const ENCODED_LEN: usize = 24;

    pub fn new(message_type: i32, id: i32, latitude: f64, longitude: f64) -> Self {
        Self { message_type, id, latitude, longitude }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::ENCODED_LEN);
        buf.put_i32_le(self.message_type);
        buf.put_i32_le(self.id);
        buf.put_f64_le(self.latitude);
        buf.put_f64_le(self.longitude);
        buf.freeze()
    }

    pub fn decode(mut bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(CodecError::Length { expected: Self::ENCODED_LEN, actual: bytes.len() });
        }
        Ok(Self {
            message_type: bytes.get_i32_le(),
            id: bytes.get_i32_le(),
            latitude: bytes.get_f64_le(),
            longitude: bytes.get_f64_le(),
        })
    }
}

impl Default for SimpleMessage {
    fn default() -> Self {
        Self::new(1, 47, 22.0222, 98.4555)
    }
}

/// 车辆完整状态，8 个 f64 字段，小端序 64 字节
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    pub speed: f64,
    /// 秒级时间戳（带小数）
    pub timestamp: f64,
}

impl VehicleState {
    pub const ENCODED_LEN: usize = 64;

    fn fields(&self) -> [f64; 8] {
        [
            self.latitude,
            self.longitude,
            self.altitude,
            self.yaw,
            self.pitch,
            self.roll,
            self.speed,
            self.timestamp,
        ]
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::ENCODED_LEN);
        for value in self.fields() {
            buf.put_f64_le(value);
        }
        buf.freeze()
    }

    pub fn decode(mut bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(CodecError::Length { expected: Self::ENCODED_LEN, actual: bytes.len() });
        }
        Ok(Self {
            latitude: bytes.get_f64_le(),
            longitude: bytes.get_f64_le(),
            altitude: bytes.get_f64_le(),
            yaw: bytes.get_f64_le(),
            pitch: bytes.get_f64_le(),
            roll: bytes.get_f64_le(),
            speed: bytes.get_f64_le(),
            timestamp: bytes.get_f64_le(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn simple_message_round_trips_through_fixed_layout() {
        let msg = SimpleMessage::new(1, 47, 22.0222, 98.4555);
        let bytes = msg.encode();
        assert_eq!(bytes.len(), SimpleMessage::ENCODED_LEN);
        assert_eq!(SimpleMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn simple_message_layout_is_little_endian() {
        let bytes = SimpleMessage::new(1, 47, 0.0, 0.0).encode();
        assert_eq!(&bytes[..8], &[1, 0, 0, 0, 47, 0, 0, 0]);
        assert_eq!(&bytes[8..24], &[0u8; 16]);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let err = SimpleMessage::decode(&[0u8; 23]).unwrap_err();
        assert!(matches!(err, CodecError::Length { expected: 24, actual: 23 }));
    }

    #[test]
    fn vehicle_state_keeps_field_order() {
        let state = VehicleState {
            latitude: 22.0222,
            longitude: 98.4555,
            altitude: 120.5,
            yaw: 1.0,
            pitch: -0.25,
            roll: 0.5,
            speed: 13.9,
            timestamp: 1_700_000_000.5,
        };
        let bytes = state.encode();
        assert_eq!(&bytes[16..24], &120.5f64.to_le_bytes());
        assert_eq!(VehicleState::decode(&bytes).unwrap(), state);
    }
}

use serde::Deserialize;

use crate::error::CodecError;
use crate::model::{SimpleMessage, VehicleState};
use crate::utils::{encode_json, now_timestamp_seconds};

pub const DEMO_TEXTS: [&str; 4] = [
    "Hello World!",
    "Hi there!",
    "Is anyone listening?",
    "Someone is always listening.",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    #[default]
    Binary,
    Json,
}

/// 每次发送前产生一份新的 payload
pub trait PayloadSource: Send + Sync {
    fn next_payload(&mut self) -> Result<Vec<u8>, CodecError>;
}

pub struct PositionSource {
    message: SimpleMessage,
    format: PayloadFormat,
}

impl PositionSource {
    pub fn new(message: SimpleMessage, format: PayloadFormat) -> Self {
        Self { message, format }
    }
}

impl PayloadSource for PositionSource {
    fn next_payload(&mut self) -> Result<Vec<u8>, CodecError> {
        match self.format {
            PayloadFormat::Binary => Ok(self.message.encode().to_vec()),
            PayloadFormat::Json => encode_json(&self.message),
        }
    }
}

/// 车辆状态，每次发送前刷新时间戳
pub struct VehicleStateSource {
    state: VehicleState,
    format: PayloadFormat,
}

impl VehicleStateSource {
    pub fn new(state: VehicleState, format: PayloadFormat) -> Self {
        Self { state, format }
    }
}

impl PayloadSource for VehicleStateSource {
    fn next_payload(&mut self) -> Result<Vec<u8>, CodecError> {
        self.state.timestamp = now_timestamp_seconds();
        match self.format {
            PayloadFormat::Binary => Ok(self.state.encode().to_vec()),
            PayloadFormat::Json => encode_json(&self.state),
        }
    }
}

/// 文本消息，每次发送取下一条，循环使用
pub struct TextSource {
    texts: Vec<String>,
    next: usize,
}

impl TextSource {
    pub fn new(texts: Vec<String>) -> Self {
        let texts = if texts.is_empty() {
            DEMO_TEXTS.iter().map(|t| t.to_string()).collect()
        } else {
            texts
        };
        Self { texts, next: 0 }
    }
}

impl PayloadSource for TextSource {
    fn next_payload(&mut self) -> Result<Vec<u8>, CodecError> {
        let text = &self.texts[self.next % self.texts.len()];
        self.next = (self.next + 1) % self.texts.len();
        Ok(text.clone().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::decode_json;

    #[test]
    fn position_source_emits_fixed_layout() {
        let mut source = PositionSource::new(SimpleMessage::default(), PayloadFormat::Binary);
        let bytes = source.next_payload().unwrap();
        assert_eq!(SimpleMessage::decode(&bytes).unwrap(), SimpleMessage::default());
    }

    #[test]
    fn position_source_json() {
        let mut source = PositionSource::new(SimpleMessage::default(), PayloadFormat::Json);
        let bytes = source.next_payload().unwrap();
        assert_eq!(decode_json::<SimpleMessage>(&bytes).unwrap(), SimpleMessage::default());
    }

    #[test]
    fn vehicle_state_source_stamps_time() {
        let mut source = VehicleStateSource::new(VehicleState::default(), PayloadFormat::Binary);
        let state = VehicleState::decode(&source.next_payload().unwrap()).unwrap();
        assert!(state.timestamp > 0.0);
    }

    #[test]
    fn text_source_rotates() {
        let mut source = TextSource::new(Vec::new());
        let sent: Vec<String> = (0..5)
            .map(|_| String::from_utf8(source.next_payload().unwrap()).unwrap())
            .collect();
        assert_eq!(sent[..4], DEMO_TEXTS.map(String::from));
        assert_eq!(sent[4], "Hello World!");
    }
}

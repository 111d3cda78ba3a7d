pub mod delivery;
pub mod error;
pub mod model;
pub mod mqtt;
pub mod payload;
pub mod publisher;
pub mod timer;
pub mod utils;

// Re-exports for convenience
pub use delivery::{
    ConfirmMode, DeliveryHandle, DeliveryListener, DeliveryOutcome, DeliverySnapshot, DeliveryStats,
    LoggingListener,
};
pub use error::{CodecError, ConfigError, ConnectionError, DeliveryError, PublishError, TalkerError};
pub use model::{SimpleMessage, VehicleState};
pub use mqtt::{ConnectionState, MqttConfig, TalkerMqtt, WillConfig, connect};
pub use payload::{PayloadFormat, PayloadSource, PositionSource, TextSource, VehicleStateSource};
pub use publisher::{PeriodicPublisher, PublishSettings, TelemetrySink};
pub use rumqttc::QoS;
pub use timer::SendTimer;
pub use utils::{decode_json, encode_json, now_timestamp, parse_broker_address, qos_from_level};

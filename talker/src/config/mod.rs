mod settings;

use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, bail};
use talker_share::{
    ConfirmMode, LoggingListener, MqttConfig, PayloadSource, PositionSource, PublishSettings,
    SimpleMessage, TextSource, VehicleState, VehicleStateSource, WillConfig, parse_broker_address,
    qos_from_level,
};

use crate::cli::Cli;
pub use settings::{AppConfig, ConfirmKind, PayloadKind};

const DEFAULT_CONFIG_PATH: &str = "talker/config.toml";

/// 发送间隔下限，更小的值换算后可能变成 0
const MIN_INTERVAL: Duration = Duration::from_millis(1);

const DEFAULT_CONFIG: &str = r#"
[mqtt]
broker = "broker.hivemq.com:1883"
client_id = "paho_cpp_async_publish"
persist_dir = "./persist"
keep_alive_secs = 30
connect_timeout_secs = 10

[publish]
topic = "Transmit"
qos = 1
interval_secs = 5.0
confirm = "none"
confirm_timeout_ms = 1000
format = "binary"

[payload]
kind = "position"
message_type = 1
id = 47
latitude = 22.0222
longitude = 98.4555

[will]
enabled = true
topic = "Transmit"
payload = "Last will and testament."
qos = 1
"#;

impl ConfirmKind {
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        Ok(match value.to_lowercase().as_str() {
            "none" => Self::None,
            "blocking" => Self::Blocking,
            "timeout" => Self::Timeout,
            "listener" => Self::Listener,
            other => bail!("未知的确认方式: {other}（可选 none, blocking, timeout, listener）"),
        })
    }
}

impl AppConfig {
    /// 读取配置：内置默认值 → 配置文件 → 环境变量
    ///
    /// 未显式指定路径且默认文件不存在时使用内置默认配置；显式指定的文件必须存在。
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let explicit = path
            .map(str::to_string)
            .or_else(|| std::env::var("TALKER_CONFIG").ok());
        let path = explicit.clone().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let mut config: AppConfig = match fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("invalid talker config file: {path}"))?,
            Err(e) if explicit.is_some() => {
                return Err(e).with_context(|| format!("无法读取配置文件: {path}"));
            }
            Err(_) => toml::from_str(DEFAULT_CONFIG).context("invalid default config")?,
        };

        // 支持环境变量覆盖 broker 配置
        if let Ok(broker) = std::env::var("TALKER_BROKER") {
            config.mqtt.broker = broker;
        }
        if let Ok(client_id) = std::env::var("TALKER_CLIENT_ID") {
            config.mqtt.client_id = client_id;
        }

        Ok(config)
    }

    /// 命令行参数优先级最高
    pub fn apply_cli(&mut self, cli: &Cli) -> anyhow::Result<()> {
        if let Some(broker) = &cli.broker {
            self.mqtt.broker = broker.clone();
        }
        if let Some(client_id) = &cli.client_id {
            self.mqtt.client_id = client_id.clone();
        }
        if let Some(interval) = cli.interval_secs {
            self.publish.interval_secs = interval;
        }
        if let Some(qos) = cli.qos {
            self.publish.qos = qos;
        }
        if let Some(topic) = &cli.topic {
            self.publish.topic = topic.clone();
        }
        if let Some(confirm) = &cli.confirm {
            self.publish.confirm = ConfirmKind::parse(confirm)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.interval()?;
        if self.mqtt.client_id.is_empty() {
            bail!("client_id 不能为空");
        }
        if self.publish.topic.is_empty() {
            bail!("发布主题不能为空");
        }
        parse_broker_address(&self.mqtt.broker)?;
        qos_from_level(self.publish.qos)?;
        if self.will.enabled {
            qos_from_level(self.will.qos)?;
        }
        Ok(())
    }

    pub fn mqtt_config(&self) -> anyhow::Result<MqttConfig> {
        let mut config = MqttConfig::from_address(&self.mqtt.broker, self.mqtt.client_id.clone())?;
        config.keep_alive_secs = self.mqtt.keep_alive_secs;
        config.connect_timeout = Duration::from_secs(self.mqtt.connect_timeout_secs);
        config.persist_dir = self.mqtt.persist_dir.as_ref().map(PathBuf::from);
        config.will = if self.will.enabled {
            Some(WillConfig {
                topic: self.will.topic.clone(),
                payload: self.will.payload.clone(),
                qos: qos_from_level(self.will.qos)?,
                retain: false,
            })
        } else {
            None
        };
        Ok(config)
    }

    pub fn publish_settings(&self) -> anyhow::Result<PublishSettings> {
        let confirm = match self.publish.confirm {
            ConfirmKind::None => ConfirmMode::None,
            ConfirmKind::Blocking => ConfirmMode::Blocking,
            ConfirmKind::Timeout => {
                ConfirmMode::Timeout(Duration::from_millis(self.publish.confirm_timeout_ms))
            }
            ConfirmKind::Listener => ConfirmMode::Listener(Arc::new(LoggingListener)),
        };
        Ok(PublishSettings {
            topic: self.publish.topic.clone(),
            qos: qos_from_level(self.publish.qos)?,
            interval: self.interval()?,
            confirm,
        })
    }

    fn interval(&self) -> anyhow::Result<Duration> {
        let secs = self.publish.interval_secs;
        if !secs.is_finite() || secs <= 0.0 {
            bail!("发送间隔必须大于 0 秒，当前为 {secs}");
        }
        let interval = Duration::try_from_secs_f64(secs).context("发送间隔无效")?;
        if interval < MIN_INTERVAL {
            bail!("发送间隔不能小于 {MIN_INTERVAL:?}，当前为 {secs} 秒");
        }
        Ok(interval)
    }

    pub fn payload_source(&self) -> Box<dyn PayloadSource> {
        let p = &self.payload;
        let format = self.publish.format;
        match p.kind {
            PayloadKind::Position => Box::new(PositionSource::new(
                SimpleMessage::new(p.message_type, p.id, p.latitude, p.longitude),
                format,
            )),
            PayloadKind::VehicleState => Box::new(VehicleStateSource::new(
                VehicleState { latitude: p.latitude, longitude: p.longitude, ..VehicleState::default() },
                format,
            )),
            PayloadKind::Text => Box::new(TextSource::new(p.texts.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use talker_share::{PayloadFormat, QoS};

    fn defaults() -> AppConfig {
        toml::from_str(DEFAULT_CONFIG).unwrap()
    }

    #[test]
    fn default_config_matches_reference_values() {
        let cfg = defaults();
        assert_eq!(cfg.mqtt.broker, "broker.hivemq.com:1883");
        assert_eq!(cfg.mqtt.client_id, "paho_cpp_async_publish");
        assert_eq!(cfg.publish.topic, "Transmit");
        assert_eq!(cfg.publish.qos, 1);
        assert_eq!(cfg.publish.interval_secs, 5.0);
        assert_eq!(cfg.publish.format, PayloadFormat::Binary);
        assert_eq!(cfg.payload.kind, PayloadKind::Position);
        assert!(cfg.will.enabled);
        cfg.validate().unwrap();
    }

    #[test]
    fn minimal_file_fills_sections_with_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [mqtt]
            broker = "localhost"
            client_id = "car-1"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.publish.confirm, ConfirmKind::None);
        assert_eq!(cfg.payload.id, 47);
        assert_eq!(cfg.will.payload, "Last will and testament.");
        assert_eq!(cfg.mqtt.connect_timeout_secs, 10);
    }

    #[test]
    #[serial]
    fn explicit_file_and_env_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [mqtt]
            broker = "tcp://10.1.1.1:1884"
            client_id = "from-file"

            [publish]
            qos = 0
            confirm = "timeout"
            confirm_timeout_ms = 250
            "#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cfg = temp_env::with_vars(
            [("TALKER_CLIENT_ID", Some("from-env")), ("TALKER_BROKER", None::<&str>)],
            || AppConfig::load(Some(&path)).unwrap(),
        );

        assert_eq!(cfg.mqtt.broker, "tcp://10.1.1.1:1884");
        assert_eq!(cfg.mqtt.client_id, "from-env");
        let mqtt = cfg.mqtt_config().unwrap();
        assert_eq!((mqtt.host.as_str(), mqtt.port), ("10.1.1.1", 1884));
        let publish = cfg.publish_settings().unwrap();
        assert_eq!(publish.qos, QoS::AtMostOnce);
        assert!(matches!(publish.confirm, ConfirmMode::Timeout(d) if d == Duration::from_millis(250)));
    }

    #[test]
    #[serial]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let result = temp_env::with_var_unset("TALKER_CONFIG", || {
            AppConfig::load(Some(path.to_str().unwrap()))
        });
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mqtt]\nbroker = 5").unwrap();
        assert!(AppConfig::load(file.path().to_str()).is_err());
    }

    #[test]
    fn cli_overrides_config() {
        let mut cfg = defaults();
        let cli = Cli {
            broker: Some("localhost:1999".into()),
            client_id: Some("cli-id".into()),
            interval_secs: Some(0.5),
            confirm: Some("Blocking".into()),
            ..Cli::default()
        };
        cfg.apply_cli(&cli).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.mqtt.client_id, "cli-id");
        let publish = cfg.publish_settings().unwrap();
        assert_eq!(publish.interval, Duration::from_millis(500));
        assert!(matches!(publish.confirm, ConfirmMode::Blocking));
    }

    #[test]
    fn rejects_unknown_confirm_mode() {
        let mut cfg = defaults();
        let cli = Cli { confirm: Some("sometimes".into()), ..Cli::default() };
        assert!(cfg.apply_cli(&cli).is_err());
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut cfg = defaults();
        cfg.publish.interval_secs = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = defaults();
        cfg.publish.qos = 3;
        assert!(cfg.validate().is_err());

        let mut cfg = defaults();
        cfg.publish.interval_secs = f64::INFINITY;
        assert!(cfg.validate().is_err());

        let mut cfg = defaults();
        cfg.mqtt.broker = "host:notaport".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn interval_that_rounds_to_zero_is_rejected() {
        let mut cfg = defaults();
        cfg.publish.interval_secs = 1e-12;
        assert!(cfg.validate().is_err());
        assert!(cfg.publish_settings().is_err());

        cfg.publish.interval_secs = 0.001;
        cfg.validate().unwrap();
        assert_eq!(cfg.publish_settings().unwrap().interval, Duration::from_millis(1));
    }

    #[test]
    fn will_can_be_disabled() {
        let mut cfg = defaults();
        cfg.will.enabled = false;
        assert!(cfg.mqtt_config().unwrap().will.is_none());

        let cfg = defaults();
        let will = cfg.mqtt_config().unwrap().will.unwrap();
        assert_eq!(will.payload, "Last will and testament.");
        assert_eq!(will.qos, QoS::AtLeastOnce);
    }

    #[test]
    fn payload_source_follows_kind() {
        let mut cfg = defaults();
        let bytes = cfg.payload_source().next_payload().unwrap();
        assert_eq!(SimpleMessage::decode(&bytes).unwrap(), SimpleMessage::default());

        cfg.payload.kind = PayloadKind::Text;
        cfg.payload.texts = vec!["ping".into()];
        assert_eq!(cfg.payload_source().next_payload().unwrap(), b"ping".to_vec());

        cfg.payload.kind = PayloadKind::VehicleState;
        let bytes = cfg.payload_source().next_payload().unwrap();
        assert_eq!(bytes.len(), VehicleState::ENCODED_LEN);
    }
}

//! 命令行参数定义（使用 clap）

use clap::Parser;

/// 周期性向 MQTT broker 广播车辆遥测数据
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "talker")]
#[command(version)]
#[command(about = "连接 MQTT broker，按固定间隔发布车辆位置报文")]
#[command(long_about = None)]
pub struct Cli {
    /// broker 地址，例如 broker.hivemq.com:1883
    #[arg(value_name = "BROKER")]
    pub broker: Option<String>,

    /// MQTT client id
    #[arg(value_name = "CLIENT_ID")]
    pub client_id: Option<String>,

    /// 配置文件路径（默认读取环境变量 TALKER_CONFIG，再退回 talker/config.toml）
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<String>,

    /// 日志级别（trace, debug, info, warn, error）
    #[arg(short, long, default_value = "info", value_name = "LEVEL")]
    pub log_level: String,

    /// 发送间隔（秒）
    #[arg(long, value_name = "SECS")]
    pub interval_secs: Option<f64>,

    /// 发布 QoS（0, 1, 2）
    #[arg(long, value_name = "QOS")]
    pub qos: Option<u8>,

    /// 发布主题
    #[arg(long, value_name = "TOPIC")]
    pub topic: Option<String>,

    /// 投递确认方式：none, blocking, timeout, listener
    #[arg(long, value_name = "MODE")]
    pub confirm: Option<String>,
}

impl Cli {
    /// 解析命令行参数
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// 获取日志过滤器字符串
    pub fn log_filter(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.log_level.clone())
    }
}

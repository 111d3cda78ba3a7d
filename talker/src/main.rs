//! talker：周期性 MQTT 遥测发布器
//! - 连接：clean session + last will
//! - 发送：固定间隔发布车辆位置报文（小端序定长布局）
//! - 退出：连接失败或发送循环出错时退出码为 1，Ctrl-C 正常退出

mod cli;
mod config;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use talker_share::{PeriodicPublisher, connect};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(cli.log_filter())
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("talker 退出: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: cli::Cli) -> anyhow::Result<()> {
    let mut cfg = config::AppConfig::load(cli.config.as_deref())?;
    cfg.apply_cli(&cli)?;
    cfg.validate()?;

    let mqtt_config = cfg.mqtt_config()?;
    let settings = cfg.publish_settings()?;
    info!(
        broker = %mqtt_config.address(),
        client_id = %mqtt_config.client_id,
        topic = %settings.topic,
        interval_secs = settings.interval.as_secs_f64(),
        confirm = ?settings.confirm,
        "正在初始化"
    );

    let mqtt = Arc::new(
        connect(&mqtt_config)
            .await
            .with_context(|| format!("无法连接 broker {}", mqtt_config.address()))?,
    );

    let mut publisher = PeriodicPublisher::new(mqtt.clone(), settings, cfg.payload_source());

    let outcome = tokio::select! {
        result = publisher.run() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let stats = publisher.stats();
    info!(
        published = stats.published,
        acknowledged = stats.acknowledged,
        failed = stats.failed,
        timed_out = stats.timed_out,
        "发送统计"
    );

    match outcome {
        Some(result) => {
            result.context("发送循环异常退出")?;
            Ok(())
        }
        None => {
            info!("收到退出信号，正在断开连接");
            mqtt.disconnect().await?;
            Ok(())
        }
    }
}

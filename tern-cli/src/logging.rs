//! CLI 日志系统初始化
//!
//! 基于 `tracing-subscriber` 实现分阶段日志控制。日志写到 stderr，
//! 不干扰程序输出。

use crate::config::LogConfig;
use std::io;
use tern_config::Phase;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    Layer, Registry,
};

/// 日志输出格式
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// 彩色格式化（开发使用）
    Pretty,
    /// 紧凑格式
    Compact,
    /// JSON 格式（工具集成）
    Json,
}

fn level_filter(level: Option<tracing::Level>) -> LevelFilter {
    level.map(LevelFilter::from_level).unwrap_or(LevelFilter::OFF)
}

/// 由日志配置构建分阶段过滤器
pub fn build_targets(log_config: &LogConfig) -> Targets {
    Phase::ALL.iter().fold(
        Targets::new().with_default(level_filter(log_config.global)),
        |targets, phase| targets.with_target(phase.target(), level_filter(log_config.level_for(*phase))),
    )
}

/// 使用指定格式和日志配置初始化日志系统
pub fn init(log_config: &LogConfig, format: LogFormat) {
    let targets = build_targets(log_config);
    let layer = create_format_layer::<Registry>(format).with_filter(targets);
    // 已有全局 subscriber 时保持原样
    let _ = tracing_subscriber::registry().with(layer).try_init();
}

/// Create formatter layer based on format
fn create_format_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .without_time()
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
    }
}

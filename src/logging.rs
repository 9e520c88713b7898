//! 日志初始化
//!
//! RUST_LOG 优先; 未设置时由命令行 `-v` 次数决定级别。

use tracing_subscriber::EnvFilter;

/// `-v` 次数 → 默认过滤级别
pub fn default_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// 初始化全局 tracing subscriber (重复调用时忽略)
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

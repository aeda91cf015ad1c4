//! 可观测性：tracing 日志初始化
//!
//! 默认 info；`RUST_LOG` 可覆盖（如 `RUST_LOG=jobscout=debug` 查看每个被跳过的 ID）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // hyper 连接日志只保留 warn 以上
    let filter = match "hyper=warn".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

//! JobScout Telegram 机器人
//!
//! 入口：加载 .env 与配置、初始化日志、构建核心组件并运行长轮询，直到 Ctrl+C / SIGTERM。
//!
//! 环境变量:
//! - TOKEN 或 JOBSCOUT__BOT__TOKEN: Telegram Bot 令牌
//! - OWNER_ID 或 JOBSCOUT__BOT__OWNER_ID: 所有者 ID（保留，未使用）
//! - JOBSCOUT__*: 其他配置项覆盖（见 config/default.toml）

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use jobscout::batch::SchedulerCleanup;
use jobscout::config::load_config;
use jobscout::core::shutdown::run_with_graceful_shutdown;
use jobscout::core::{BotBuilder, ShutdownCoordinator, ShutdownManager};
use jobscout::cursor::spawn_sweeper;
use jobscout::integrations::telegram::{run_polling, spawn_notification_delivery, TelegramClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    jobscout::observability::init();

    let config = load_config(std::env::args().nth(1).map(Into::into))
        .context("Failed to load config")?;
    let token = config
        .bot
        .token
        .clone()
        .context("Bot token missing: set TOKEN or JOBSCOUT__BOT__TOKEN")?;
    if config.bot.owner_id.is_none() {
        tracing::debug!("OWNER_ID not set");
    }

    let shutdown = Arc::new(ShutdownManager::new());
    let components = BotBuilder::new(config.clone())
        .with_shutdown(shutdown.token())
        .build()
        .context("Failed to build bot")?;

    if config.store.idle_ttl_secs.is_some() {
        spawn_sweeper(
            Arc::clone(&components.store),
            Arc::clone(&components.clock),
            Duration::from_secs(config.store.sweep_interval_secs.max(1)),
            shutdown.token(),
        );
    }

    let client = Arc::new(TelegramClient::new(&token, config.bot.poll_timeout_secs)?);
    spawn_notification_delivery(Arc::clone(&client), components.notifications, shutdown.token());

    let mut coordinator = ShutdownCoordinator::new(Arc::clone(&shutdown));
    coordinator.register(SchedulerCleanup::new(Arc::clone(&components.scheduler)));

    tracing::info!("Bot is running...");
    run_with_graceful_shutdown(
        coordinator,
        run_polling(
            components.bot,
            client,
            config.bot.poll_timeout_secs,
            shutdown.token(),
        ),
    )
    .await;

    Ok(())
}

//! 端到端流程测试：前端调用 → 进度推进 → 延迟批量 → 游标回写 → batch_ready 通知

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use jobscout::batch::{BatchOutcome, ReconcileMode};
use jobscout::config::AppConfig;
use jobscout::core::{BotBuilder, BotComponents};
use jobscout::cursor::{CatchupMode, ManualClock};
use jobscout::prober::OracleChecker;
use jobscout::JobBot;

fn build(
    start_id: u64,
    live: &[u64],
    delays: &[(&str, u64)],
    reconcile: ReconcileMode,
) -> (BotComponents, Arc<OracleChecker>, Arc<ManualClock>) {
    let mut config = AppConfig::default();
    config.jobs.start_id = start_id;
    config.jobs.base_url = "https://jobs.example.com/view".to_string();
    config.batch.reconcile = reconcile;
    config.batch.delays = delays.iter().map(|(k, v)| (k.to_string(), *v)).collect();

    let checker = Arc::new(OracleChecker::new(live.iter().copied()));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 3, 8, 30, 0).unwrap(),
    ));
    let components = BotBuilder::new(config)
        .with_checker(checker.clone())
        .with_clock(clock.clone())
        .build()
        .unwrap();
    (components, checker, clock)
}

#[tokio::test(start_paused = true)]
async fn test_fresh_conversation_batch_of_two() {
    let (mut components, checker, _) = build(
        1000,
        &[1000, 1002, 1004],
        &[("1", 15), ("2", 30), ("3", 60)],
        ReconcileMode::Monotonic,
    );
    let bot = Arc::clone(&components.bot);

    let (handle, ack) = bot.on_request_batch("chat-1", 2).await.unwrap();
    assert_eq!(ack.text, "✅ Your 2 live job links will be sent in a few minutes.");
    // 乐观预留立即生效
    assert_eq!(components.store.snapshot("chat-1").await.unwrap().next_id, 1002);

    let result = handle.join().await.unwrap();
    let ids: Vec<_> = result.live.iter().map(|j| j.job_id).collect();
    assert_eq!(ids, vec![1000, 1002]);
    assert_eq!(result.next_id, 1003);
    assert_eq!(checker.checked(), vec![1000, 1001, 1002]);

    let state = components.store.snapshot("chat-1").await.unwrap();
    assert_eq!(state.next_id, 1003);
    assert_eq!(state.lifetime_count, 2);

    let notification = components.notifications.recv().await.unwrap();
    assert_eq!(notification.conversation_id, "chat-1");
    let message = JobBot::render_notification(&notification).unwrap();
    assert_eq!(
        message.text,
        "https://jobs.example.com/view/1000 - ✅ Live\nhttps://jobs.example.com/view/1002 - ✅ Live"
    );
}

#[tokio::test(start_paused = true)]
async fn test_delay_tiers_are_applied() {
    let (components, _, _) = build(
        1,
        &[1, 2, 3, 4, 5, 6, 7, 8],
        &[("1", 15), ("3", 60)],
        ReconcileMode::Monotonic,
    );
    let bot = Arc::clone(&components.bot);

    let started = tokio::time::Instant::now();
    let (single, _) = bot.on_request_batch("a", 1).await.unwrap();
    let (triple, _) = bot.on_request_batch("b", 3).await.unwrap();

    single.join().await.unwrap();
    let short = started.elapsed();
    triple.join().await.unwrap();
    let long = started.elapsed();

    assert!(short >= Duration::from_secs(15) && short < Duration::from_secs(60));
    assert!(long >= Duration::from_secs(60));
    assert!(long >= Duration::from_secs(15) * 4);
}

#[tokio::test(start_paused = true)]
async fn test_single_links_during_batch_are_not_lost() {
    let (components, _, _) = build(
        5000,
        &[5000, 5001, 5002],
        &[("1", 15), ("3", 60)],
        ReconcileMode::Monotonic,
    );
    let bot = Arc::clone(&components.bot);

    let (handle, _) = bot.on_request_batch("chat", 1).await.unwrap();
    // 预留了 5000，随后两个单链接拿到 5001、5002
    let first = bot.on_advance("chat").await;
    let second = bot.on_advance("chat").await;
    assert!(first[0].text.ends_with("/5001"));
    assert!(second[0].text.ends_with("/5002"));

    let result = handle.join().await.unwrap();
    assert_eq!(result.next_id, 5001);

    let state = components.store.snapshot("chat").await.unwrap();
    assert_eq!(state.next_id, 5003);
    assert!(bot.on_advance("chat").await[0].text.ends_with("/5003"));
}

#[tokio::test(start_paused = true)]
async fn test_last_write_wins_is_explicit() {
    let (components, _, _) = build(
        5000,
        &[5000],
        &[("1", 15)],
        ReconcileMode::LastWriteWins,
    );
    let bot = Arc::clone(&components.bot);

    let (handle, _) = bot.on_request_batch("chat", 1).await.unwrap();
    bot.on_advance("chat").await;
    bot.on_advance("chat").await;
    handle.join().await.unwrap();

    // 期间的两个单链接推进被覆盖
    assert_eq!(components.store.snapshot("chat").await.unwrap().next_id, 5001);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_batches_never_overlap() {
    let (components, checker, _) = build(
        100,
        &(100u64..200).collect::<Vec<_>>(),
        &[("3", 60)],
        ReconcileMode::Monotonic,
    );
    let bot = Arc::clone(&components.bot);

    let (a, _) = bot.on_request_batch("chat", 3).await.unwrap();
    let (b, _) = bot.on_request_batch("chat", 3).await.unwrap();
    let a = a.join().await.unwrap();
    let b = b.join().await.unwrap();

    let a_ids: Vec<_> = a.live.iter().map(|j| j.job_id).collect();
    let b_ids: Vec<_> = b.live.iter().map(|j| j.job_id).collect();
    assert_eq!(a_ids, vec![100, 101, 102]);
    assert_eq!(b_ids, vec![103, 104, 105]);
    assert_eq!(checker.checked().len(), 6);
    assert_eq!(components.store.snapshot("chat").await.unwrap().next_id, 106);
}

#[tokio::test(start_paused = true)]
async fn test_daily_catchup_applies_before_batch() {
    let (components, _, clock) = build(
        1000,
        &[3000, 3001],
        &[("1", 15)],
        ReconcileMode::Monotonic,
    );
    let bot = Arc::clone(&components.bot);
    bot.on_start("chat").await;

    clock.advance(chrono::Duration::days(2));
    let (handle, _) = bot.on_request_batch("chat", 1).await.unwrap();
    let result = handle.join().await.unwrap();
    assert_eq!(result.live[0].job_id, 3000);

    // 同一天内不再追赶
    assert!(bot.on_advance("chat").await[0].text.ends_with("/3001"));
}

#[tokio::test]
async fn test_flat_catchup_mode_via_config() {
    let mut config = AppConfig::default();
    config.jobs.start_id = 5000;
    config.jobs.catchup_mode = CatchupMode::Flat;
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 3, 8, 30, 0).unwrap(),
    ));
    let components = BotBuilder::new(config)
        .with_checker(Arc::new(OracleChecker::new([])))
        .with_clock(clock.clone())
        .build()
        .unwrap();

    components.bot.on_start("chat").await;
    clock.advance(chrono::Duration::days(2));
    let reply = components.bot.on_advance("chat").await;
    assert!(reply[0].text.ends_with("/6000"));

    let state = components.store.snapshot("chat").await.unwrap();
    assert_eq!(
        state.last_catchup_at,
        Utc.with_ymd_and_hms(2024, 6, 5, 8, 30, 0).unwrap()
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_batch_and_keeps_gap() {
    let mut config = AppConfig::default();
    config.jobs.start_id = 10;
    let shutdown = tokio_util::sync::CancellationToken::new();
    let mut components = BotBuilder::new(config)
        .with_checker(Arc::new(OracleChecker::new([10])))
        .with_shutdown(shutdown.clone())
        .build()
        .unwrap();

    let (handle, _) = components.bot.on_request_batch("chat", 3).await.unwrap();
    shutdown.cancel();
    assert!(handle.join().await.is_err());

    assert_eq!(components.store.snapshot("chat").await.unwrap().next_id, 13);
    let notification = components.notifications.recv().await.unwrap();
    assert!(matches!(notification.outcome, BatchOutcome::Cancelled));
}

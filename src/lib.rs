//! JobScout - 顺序职位链接分发与延迟在线检测
//!
//! 模块划分：
//! - **bot**: 前端调用的核心入口（start / 单链接 / 批量 / 批量完成通知渲染）
//! - **batch**: 延迟批量调度（延迟表、可取消任务、游标回写）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、组件构建、优雅关闭
//! - **cursor**: 会话游标状态、日切追赶与存储
//! - **integrations**: 聊天前端（Telegram）
//! - **prober**: 职位在线探测（唯一的网络 I/O）
//! - **progression**: 单链接与批量请求的游标推进策略
//! - **replies**: 回复文本与内联键盘

pub mod batch;
pub mod bot;
pub mod config;
pub mod core;
pub mod cursor;
pub mod integrations;
pub mod observability;
pub mod prober;
pub mod progression;
pub mod replies;

pub use bot::JobBot;
pub use crate::core::{BotBuilder, JobError};

//! 核心层：错误类型、组件构建、优雅关闭

pub mod builder;
pub mod error;
pub mod shutdown;

pub use builder::{BotBuilder, BotComponents};
pub use error::JobError;
pub use shutdown::{ShutdownCoordinator, ShutdownManager, ShutdownReason};

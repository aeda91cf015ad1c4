//! 延迟批量：延迟表与调度器

mod delay;
mod scheduler;

pub use delay::DelayTable;
pub use scheduler::{
    BatchHandle, BatchId, BatchNotification, BatchOutcome, BatchScheduler, ReconcileMode,
    SchedulerCleanup,
};

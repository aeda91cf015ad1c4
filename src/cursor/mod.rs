//! 会话游标：状态、日切追赶、存储与时钟

mod clock;
mod state;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use state::{CatchupMode, CursorState};
pub use store::{
    create_cursor_store, spawn_sweeper, ConversationId, CursorHandle, CursorStore, MemoryCursorStore,
};

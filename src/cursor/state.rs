//! 会话游标状态与日切追赶规则
//!
//! 追赶以 UTC 日历日为界（不是经过的时长），`last_catchup_at` 只前移整天数，
//! 保留一天之内的时刻，避免漂移。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 日切追赶模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatchupMode {
    /// 每经过一天加一次步长（步长 × 天数）
    #[default]
    PerDay,
    /// 只要跨过日界，无论几天都只加一次步长
    Flat,
}

/// 单个会话的游标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorState {
    /// 下一个要发放或探测的职位 ID
    pub next_id: u64,
    /// 日切追赶的基准时间，只在实际追赶时前移
    pub last_catchup_at: DateTime<Utc>,
    /// 累计发放/探测的 ID 数（仅统计用途）
    pub lifetime_count: u64,
}

impl CursorState {
    pub fn new(start_id: u64, now: DateTime<Utc>) -> Self {
        Self {
            next_id: start_id,
            last_catchup_at: now,
            lifetime_count: 0,
        }
    }

    /// 应用日切追赶，返回本次追赶的整天数（0 表示未变化）
    ///
    /// 同一 UTC 日内重复调用不产生变化；`now` 早于基准（时钟回拨）时同样不变。
    pub fn apply_daily_catchup(&mut self, now: DateTime<Utc>, step: u64, mode: CatchupMode) -> i64 {
        let days = (now.date_naive() - self.last_catchup_at.date_naive()).num_days();
        if days < 1 {
            return 0;
        }

        let jump = match mode {
            CatchupMode::PerDay => step.saturating_mul(days as u64),
            CatchupMode::Flat => step,
        };
        self.next_id = self.next_id.saturating_add(jump);
        self.last_catchup_at += Duration::days(days);
        days
    }

    pub fn advance_by(&mut self, delta: u64) {
        self.next_id = self.next_id.saturating_add(delta);
    }

    /// 无条件覆盖（后写者胜）
    pub fn set_next_id(&mut self, value: u64) {
        self.next_id = value;
    }

    /// 只前移不后退，返回是否发生了变化
    pub fn raise_next_id(&mut self, value: u64) -> bool {
        if value > self.next_id {
            self.next_id = value;
            true
        } else {
            false
        }
    }

    pub fn record_issued(&mut self, count: u64) {
        self.lifetime_count = self.lifetime_count.saturating_add(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_catchup_same_day_is_noop() {
        let mut state = CursorState::new(5000, at(2024, 3, 1, 1));
        assert_eq!(state.apply_daily_catchup(at(2024, 3, 1, 23), 1000, CatchupMode::PerDay), 0);
        assert_eq!(state.apply_daily_catchup(at(2024, 3, 1, 23), 1000, CatchupMode::PerDay), 0);
        assert_eq!(state.next_id, 5000);
        assert_eq!(state.last_catchup_at, at(2024, 3, 1, 1));
    }

    #[test]
    fn test_catchup_uses_calendar_days_not_duration() {
        // 不到 24 小时但跨过了 UTC 零点
        let mut state = CursorState::new(5000, at(2024, 3, 1, 23));
        assert_eq!(state.apply_daily_catchup(at(2024, 3, 2, 1), 1000, CatchupMode::PerDay), 1);
        assert_eq!(state.next_id, 6000);
        assert_eq!(state.last_catchup_at, at(2024, 3, 2, 23));
    }

    #[test]
    fn test_catchup_per_day_multiplies() {
        let mut state = CursorState::new(5000, at(2024, 3, 1, 10));
        let days = state.apply_daily_catchup(at(2024, 3, 4, 8), 1000, CatchupMode::PerDay);
        assert_eq!(days, 3);
        assert_eq!(state.next_id, 8000);
        assert_eq!(state.last_catchup_at, at(2024, 3, 4, 10));
    }

    #[test]
    fn test_catchup_flat_jumps_once() {
        let mut state = CursorState::new(5000, at(2024, 3, 1, 10));
        let days = state.apply_daily_catchup(at(2024, 3, 3, 12), 1000, CatchupMode::Flat);
        assert_eq!(days, 2);
        assert_eq!(state.next_id, 6000);
        // 基准前移整两天，而不是重置为 now
        assert_eq!(state.last_catchup_at, at(2024, 3, 3, 10));

        assert_eq!(state.apply_daily_catchup(at(2024, 3, 3, 20), 1000, CatchupMode::Flat), 0);
        assert_eq!(state.next_id, 6000);
    }

    #[test]
    fn test_catchup_ignores_clock_going_backwards() {
        let mut state = CursorState::new(5000, at(2024, 3, 5, 10));
        assert_eq!(state.apply_daily_catchup(at(2024, 3, 1, 10), 1000, CatchupMode::PerDay), 0);
        assert_eq!(state.next_id, 5000);
    }

    #[test]
    fn test_raise_never_decreases() {
        let mut state = CursorState::new(100, at(2024, 3, 1, 0));
        assert!(!state.raise_next_id(90));
        assert_eq!(state.next_id, 100);
        assert!(state.raise_next_id(120));
        assert_eq!(state.next_id, 120);

        state.set_next_id(110);
        assert_eq!(state.next_id, 110);
    }

    #[test]
    fn test_advance_saturates() {
        let mut state = CursorState::new(u64::MAX - 1, at(2024, 3, 1, 0));
        state.advance_by(5);
        assert_eq!(state.next_id, u64::MAX);
    }
}

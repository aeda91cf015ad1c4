//! 批量延迟表：按批量大小查固定延迟（属于配置，不是硬编码策略）

use std::collections::BTreeMap;
use std::time::Duration;

use crate::core::JobError;

/// 批量大小 -> 延迟
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayTable {
    tiers: BTreeMap<u32, Duration>,
}

impl DelayTable {
    pub fn new(tiers: impl IntoIterator<Item = (u32, Duration)>) -> Self {
        Self {
            tiers: tiers.into_iter().collect(),
        }
    }

    /// 从配置表构建（键为字符串形式的批量大小，值为秒）
    pub fn from_secs_map<'a>(
        map: impl IntoIterator<Item = (&'a String, &'a u64)>,
    ) -> Result<Self, JobError> {
        let mut tiers = BTreeMap::new();
        for (key, secs) in map {
            let count: u32 = key
                .trim()
                .parse()
                .map_err(|_| JobError::Config(format!("invalid batch size in delay table: {}", key)))?;
            if count == 0 {
                return Err(JobError::Config("batch size 0 in delay table".to_string()));
            }
            tiers.insert(count, Duration::from_secs(*secs));
        }
        if tiers.is_empty() {
            return Err(JobError::Config("delay table is empty".to_string()));
        }
        Ok(Self { tiers })
    }

    pub fn delay_for(&self, count: u32) -> Option<Duration> {
        self.tiers.get(&count).copied()
    }

    pub fn supports(&self, count: u32) -> bool {
        self.tiers.contains_key(&count)
    }

    /// 支持的批量大小（升序）
    pub fn counts(&self) -> Vec<u32> {
        self.tiers.keys().copied().collect()
    }
}

impl Default for DelayTable {
    fn default() -> Self {
        Self::new([(1, Duration::from_secs(15)), (3, Duration::from_secs(60))])
    }
}

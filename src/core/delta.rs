//! 累積計數器的時間窗差值（雨量計）
//!
//! 雨量計回報的是自開機以來的累積值；上傳端需要「過去一小時」與「今日」雨量，
//! 因此保留窗口內的樣本，回傳第一筆與最後一筆的差值。

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

pub const HOUR_WINDOW: Duration = Duration::from_secs(60 * 60);
pub const DAY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct DeltaTracker {
    period: Duration,
    values: VecDeque<(Instant, f64)>,
}

impl DeltaTracker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            values: VecDeque::new(),
        }
    }

    /// 加入新樣本並回傳窗口內的增量；計數器重置時回傳 0
    pub fn add_value(&mut self, value: f64, now: Instant) -> f64 {
        self.values.push_back((now, value));

        if let Some(cutoff) = now.checked_sub(self.period) {
            while let Some((timestamp, _)) = self.values.front() {
                if *timestamp >= cutoff {
                    break;
                }
                self.values.pop_front();
            }
        }

        match (self.values.front(), self.values.back()) {
            (Some((_, first)), Some((_, last))) if self.values.len() >= 2 => (last - first).max(0.0),
            _ => 0.0,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.values.len()
    }
}

/// 依來源欄位分開追蹤
#[derive(Debug, Default)]
pub struct DeltaTrackers {
    trackers: HashMap<String, DeltaTracker>,
}

impl DeltaTrackers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_value(&mut self, field: &str, period: Duration, value: f64, now: Instant) -> f64 {
        self.trackers
            .entry(field.to_string())
            .or_insert_with(|| DeltaTracker::new(period))
            .add_value(value, now)
    }

    pub fn get(&self, field: &str) -> Option<&DeltaTracker> {
        self.trackers.get(field)
    }
}

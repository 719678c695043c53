use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub lines_received: u64,
    pub parse_failures: u64,
    pub conversion_failures: u64,
    pub empty_records: u64,
    pub uploads_succeeded: u64,
    pub uploads_failed: u64,
    pub uploads_throttled: u64,
    pub records_dropped: u64,
    pub decoder_restarts: u64,
    pub elapsed_time: Duration,
}

/// 執行期統計，跨 task 共用（以 `Arc` 包裝）
#[derive(Debug)]
pub struct RelayMonitor {
    start_time: Instant,
    lines_received: AtomicU64,
    parse_failures: AtomicU64,
    conversion_failures: AtomicU64,
    empty_records: AtomicU64,
    uploads_succeeded: AtomicU64,
    uploads_failed: AtomicU64,
    uploads_throttled: AtomicU64,
    records_dropped: AtomicU64,
    decoder_restarts: AtomicU64,
}

impl RelayMonitor {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            lines_received: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            conversion_failures: AtomicU64::new(0),
            empty_records: AtomicU64::new(0),
            uploads_succeeded: AtomicU64::new(0),
            uploads_failed: AtomicU64::new(0),
            uploads_throttled: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            decoder_restarts: AtomicU64::new(0),
        }
    }

    pub fn record_line(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conversion_failures(&self, count: u64) {
        self.conversion_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_empty(&self) {
        self.empty_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload_success(&self) {
        self.uploads_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload_failure(&self) {
        self.uploads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_throttled(&self) {
        self.uploads_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restart(&self) {
        self.decoder_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> RelayStats {
        RelayStats {
            lines_received: self.lines_received.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            conversion_failures: self.conversion_failures.load(Ordering::Relaxed),
            empty_records: self.empty_records.load(Ordering::Relaxed),
            uploads_succeeded: self.uploads_succeeded.load(Ordering::Relaxed),
            uploads_failed: self.uploads_failed.load(Ordering::Relaxed),
            uploads_throttled: self.uploads_throttled.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            decoder_restarts: self.decoder_restarts.load(Ordering::Relaxed),
            elapsed_time: self.start_time.elapsed(),
        }
    }

    pub fn log_stats(&self, phase: &str) {
        let stats = self.get_stats();
        tracing::info!(
            "📊 {} - lines: {}, parse errors: {}, uploads ok: {}, failed: {}, throttled: {}, restarts: {}",
            phase,
            stats.lines_received,
            stats.parse_failures,
            stats.uploads_succeeded,
            stats.uploads_failed,
            stats.uploads_throttled,
            stats.decoder_restarts
        );
    }

    pub fn log_final_stats(&self) {
        let stats = self.get_stats();
        tracing::info!(
            "📊 Final Stats - Total Time: {:?}, lines: {}, uploads ok: {}, failed: {}, dropped: {}, conversion errors: {}, empty records: {}",
            stats.elapsed_time,
            stats.lines_received,
            stats.uploads_succeeded,
            stats.uploads_failed,
            stats.records_dropped,
            stats.conversion_failures,
            stats.empty_records
        );
    }
}

impl Default for RelayMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let monitor = RelayMonitor::new();
        monitor.record_line();
        monitor.record_line();
        monitor.record_parse_failure();
        monitor.record_conversion_failures(2);
        monitor.record_upload_success();
        monitor.record_restart();

        let stats = monitor.get_stats();
        assert_eq!(stats.lines_received, 2);
        assert_eq!(stats.parse_failures, 1);
        assert_eq!(stats.conversion_failures, 2);
        assert_eq!(stats.uploads_succeeded, 1);
        assert_eq!(stats.uploads_failed, 0);
        assert_eq!(stats.decoder_restarts, 1);
    }
}

//! `ServerStats` — the counters and recent-log ring surfaced by the
//! `status --verbose` and `logs` control-socket actions.

use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::RwLock;
use stt_core::ipc::wire::LogEntry;

const LOG_CAPACITY: usize = 100;

struct Inner {
    started_at: Instant,
    transcription_count: u64,
    error_count: u64,
    last_transcription: Option<String>,
    last_error: Option<String>,
    last_error_time: Option<u64>,
    logs: VecDeque<LogEntry>,
}

/// Thread-safe counters updated from the orchestration loop and read by
/// the control server. Cheap to clone via `Arc` at the call site.
pub struct ServerStats {
    inner: RwLock<Inner>,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                started_at: Instant::now(),
                transcription_count: 0,
                error_count: 0,
                last_transcription: None,
                last_error: None,
                last_error_time: None,
                logs: VecDeque::with_capacity(LOG_CAPACITY),
            }),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.read().started_at.elapsed().as_secs()
    }

    pub fn record_transcription(&self, text: &str) {
        let mut inner = self.inner.write();
        inner.transcription_count += 1;
        inner.last_transcription = Some(text.to_string());
    }

    /// Record a recoverable error. Only errors for which
    /// `SttError::is_countable` is true should reach this call.
    pub fn record_error(&self, message: &str, unix_time: u64) {
        let mut inner = self.inner.write();
        inner.error_count += 1;
        inner.last_error = Some(message.to_string());
        inner.last_error_time = Some(unix_time);
    }

    pub fn push_log(&self, entry: LogEntry) {
        let mut inner = self.inner.write();
        if inner.logs.len() >= LOG_CAPACITY {
            inner.logs.pop_front();
        }
        inner.logs.push_back(entry);
    }

    pub fn recent_logs(&self) -> Vec<LogEntry> {
        self.inner.read().logs.iter().cloned().collect()
    }

    pub fn transcription_count(&self) -> u64 {
        self.inner.read().transcription_count
    }

    pub fn error_count(&self) -> u64 {
        self.inner.read().error_count
    }

    pub fn last_transcription(&self) -> Option<String> {
        self.inner.read().last_transcription.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    pub fn last_error_time(&self) -> Option<u64> {
        self.inner.read().last_error_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_transcriptions_and_errors() {
        let stats = ServerStats::new();
        stats.record_transcription("hello");
        stats.record_error("boom", 42);
        assert_eq!(stats.transcription_count(), 1);
        assert_eq!(stats.error_count(), 1);
        assert_eq!(stats.last_transcription().as_deref(), Some("hello"));
        assert_eq!(stats.last_error().as_deref(), Some("boom"));
        assert_eq!(stats.last_error_time(), Some(42));
    }

    #[test]
    fn log_ring_drops_oldest_past_capacity() {
        let stats = ServerStats::new();
        for i in 0..(LOG_CAPACITY + 10) {
            stats.push_log(LogEntry {
                timestamp: i as u64,
                level: "info".to_string(),
                message: format!("entry {i}"),
            });
        }
        let logs = stats.recent_logs();
        assert_eq!(logs.len(), LOG_CAPACITY);
        assert_eq!(logs.first().unwrap().message, "entry 10");
    }
}

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const MAX_LATENCY_SAMPLES: usize = 1000;

/// Latency of successful batches, with a window of the most recent samples
/// for percentiles.
#[derive(Debug, Clone, Default)]
pub struct BatchMetrics {
    batch_count: u64,
    total_latency_nanos: u128,
    min_latency: Option<Duration>,
    max_latency: Duration,
    recent: VecDeque<Duration>,
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_batch(&mut self, latency: Duration) {
        self.batch_count += 1;
        self.total_latency_nanos += latency.as_nanos();
        self.min_latency = Some(self.min_latency.map_or(latency, |min| min.min(latency)));
        self.max_latency = self.max_latency.max(latency);

        if self.recent.len() == MAX_LATENCY_SAMPLES {
            self.recent.pop_front();
        }
        self.recent.push_back(latency);
    }

    pub fn batch_count(&self) -> u64 {
        self.batch_count
    }

    /// `Duration::ZERO` until a batch is recorded.
    pub fn min_latency(&self) -> Duration {
        self.min_latency.unwrap_or(Duration::ZERO)
    }

    pub fn max_latency(&self) -> Duration {
        self.max_latency
    }

    pub fn sample_count(&self) -> usize {
        self.recent.len()
    }

    pub fn average_latency(&self) -> Duration {
        if self.batch_count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_latency_nanos / u128::from(self.batch_count);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Nearest-rank percentile over the sample window.
    pub fn percentile(&self, p: f64) -> Duration {
        let mut sorted: Vec<Duration> = self.recent.iter().copied().collect();
        if sorted.is_empty() {
            return Duration::ZERO;
        }
        sorted.sort_unstable();

        let rank = ((sorted.len() - 1) as f64 * p.clamp(0.0, 100.0) / 100.0).round() as usize;
        sorted[rank.min(sorted.len() - 1)]
    }

    pub fn p50(&self) -> Duration {
        self.percentile(50.0)
    }

    pub fn p95(&self) -> Duration {
        self.percentile(95.0)
    }

    pub fn p99(&self) -> Duration {
        self.percentile(99.0)
    }
}

#[derive(Debug, Default)]
struct Counters {
    batches: BatchMetrics,
    records_written: u64,
    failed_batches: u64,
}

/// In-process counters of one exporter. Clones share the same counters.
#[derive(Debug, Clone)]
pub struct ExportMetrics {
    counters: Arc<Mutex<Counters>>,
    start_time: Instant,
}

impl ExportMetrics {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Mutex::new(Counters::default())),
            start_time: Instant::now(),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Counters) -> T) -> Option<T> {
        self.counters.lock().ok().map(|c| f(&c))
    }

    pub fn record_success(&self, records: usize, latency: Duration) {
        if let Ok(mut counters) = self.counters.lock() {
            counters.batches.record_batch(latency);
            counters.records_written += records as u64;
        }
    }

    pub fn record_failure(&self) {
        if let Ok(mut counters) = self.counters.lock() {
            counters.failed_batches += 1;
        }
    }

    pub fn get_batch_metrics(&self) -> BatchMetrics {
        self.read(|c| c.batches.clone()).unwrap_or_default()
    }

    pub fn successful_batches(&self) -> u64 {
        self.read(|c| c.batches.batch_count()).unwrap_or(0)
    }

    pub fn failed_batches(&self) -> u64 {
        self.read(|c| c.failed_batches).unwrap_or(0)
    }

    pub fn records_written(&self) -> u64 {
        self.read(|c| c.records_written).unwrap_or(0)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for ExportMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_metrics_new() {
        let metrics = BatchMetrics::new();
        assert_eq!(metrics.batch_count(), 0);
        assert_eq!(metrics.min_latency(), Duration::ZERO);
        assert_eq!(metrics.max_latency(), Duration::ZERO);
        assert_eq!(metrics.sample_count(), 0);
        assert_eq!(metrics.average_latency(), Duration::ZERO);
        assert_eq!(metrics.p50(), Duration::ZERO);
    }

    #[test]
    fn test_batch_metrics_min_max_average() {
        let mut metrics = BatchMetrics::new();
        metrics.record_batch(Duration::from_millis(50));
        metrics.record_batch(Duration::from_millis(150));

        assert_eq!(metrics.batch_count(), 2);
        assert_eq!(metrics.min_latency(), Duration::from_millis(50));
        assert_eq!(metrics.max_latency(), Duration::from_millis(150));
        assert_eq!(metrics.average_latency(), Duration::from_millis(100));
    }

    #[test]
    fn test_average_uses_full_batch_count() {
        let mut metrics = BatchMetrics::new();
        metrics.record_batch(Duration::from_secs(3));
        metrics.batch_count = u64::from(u32::MAX) + 1;
        metrics.total_latency_nanos = u128::from(metrics.batch_count) * 2;

        assert_eq!(metrics.average_latency(), Duration::from_nanos(2));
    }

    #[test]
    fn test_batch_metrics_percentiles() {
        let mut metrics = BatchMetrics::new();
        for i in 1..=100 {
            metrics.record_batch(Duration::from_millis(i));
        }
        assert_eq!(metrics.p50(), Duration::from_millis(51));
        assert!(metrics.p95() > metrics.p50());
        assert!(metrics.p99() >= metrics.p95());
        assert_eq!(metrics.percentile(100.0), Duration::from_millis(100));
    }

    #[test]
    fn test_sample_window_keeps_most_recent() {
        let mut metrics = BatchMetrics::new();
        for i in 0..1500 {
            metrics.record_batch(Duration::from_micros(i));
        }
        assert_eq!(metrics.sample_count(), MAX_LATENCY_SAMPLES);
        assert_eq!(metrics.batch_count(), 1500);
        assert_eq!(metrics.percentile(0.0), Duration::from_micros(500));
        assert_eq!(metrics.min_latency(), Duration::ZERO);
    }

    #[test]
    fn test_export_metrics_counters() {
        let metrics = ExportMetrics::new();
        metrics.record_success(10, Duration::from_millis(5));
        metrics.record_success(3, Duration::from_millis(7));
        metrics.record_failure();

        assert_eq!(metrics.successful_batches(), 2);
        assert_eq!(metrics.records_written(), 13);
        assert_eq!(metrics.failed_batches(), 1);
        assert_eq!(
            metrics.get_batch_metrics().max_latency(),
            Duration::from_millis(7)
        );
    }

    #[test]
    fn test_export_metrics_clones_share_counters() {
        let metrics = ExportMetrics::default();
        let clone = metrics.clone();
        clone.record_failure();
        assert_eq!(metrics.failed_batches(), 1);
    }
}

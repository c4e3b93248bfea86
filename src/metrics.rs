//! Performance metrics and statistics tracking for the ingestion pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

use crate::types::Score;

/// Metrics collector shared by the ingestion pipeline and the
/// verification consumer.
pub struct PipelineMetrics {
    /// Transactions accepted and persisted
    pub transactions_ingested: AtomicU64,
    /// Accepted transactions classified as fraud
    pub fraud_flagged: AtomicU64,
    /// Ingestions that persisted but could not be scored
    pub scoring_failures: AtomicU64,
    /// Best-effort archive writes that failed
    pub archive_failures: AtomicU64,
    /// Best-effort event publishes that failed
    pub publish_failures: AtomicU64,
    /// Predictions persisted under an active model
    pub predictions_persisted: AtomicU64,
    /// Queue events confirmed against the database
    pub events_verified: AtomicU64,
    /// Queue events referencing unknown transactions
    pub events_missing: AtomicU64,
    /// Queue events returned for redelivery
    pub events_requeued: AtomicU64,
    /// Ingest latencies (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Fraud probability distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            transactions_ingested: AtomicU64::new(0),
            fraud_flagged: AtomicU64::new(0),
            scoring_failures: AtomicU64::new(0),
            archive_failures: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            predictions_persisted: AtomicU64::new(0),
            events_verified: AtomicU64::new(0),
            events_missing: AtomicU64::new(0),
            events_requeued: AtomicU64::new(0),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record one completed ingestion
    pub fn record_ingest(&self, processing_time: Duration, score: &Score) {
        self.transactions_ingested.fetch_add(1, Ordering::Relaxed);
        if score.predicted_class {
            self.fraud_flagged.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        let bucket = (score.probability * 10.0).min(9.0) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    pub fn record_scoring_failure(&self) {
        self.scoring_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_archive_failure(&self) {
        self.archive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prediction_persisted(&self) {
        self.predictions_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_verified(&self) {
        self.events_verified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_missing(&self) {
        self.events_missing.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_requeued(&self) {
        self.events_requeued.fetch_add(1, Ordering::Relaxed);
    }

    /// Get ingest latency statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let times = self.processing_times.read().unwrap();
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Get current throughput (transactions per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.transactions_ingested.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get fraud probability distribution
    pub fn get_score_distribution(&self) -> [u64; 10] {
        *self.score_buckets.read().unwrap()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let ingested = self.transactions_ingested.load(Ordering::Relaxed);
        let flagged = self.fraud_flagged.load(Ordering::Relaxed);
        let flag_rate = if ingested > 0 {
            (flagged as f64 / ingested as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();
        let score_dist = self.get_score_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║           FRAUD INGESTION PIPELINE - METRICS SUMMARY         ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Transactions Ingested:  {:>8}  │  Throughput: {:>6.1} tx/s ║",
            ingested, throughput
        );
        info!(
            "║ Flagged as Fraud:       {:>8}  │  Flag Rate:  {:>6.1}%     ║",
            flagged, flag_rate
        );
        info!(
            "║ Predictions Persisted:  {:>8}  │  Scoring Failures: {:>4}  ║",
            self.predictions_persisted.load(Ordering::Relaxed),
            self.scoring_failures.load(Ordering::Relaxed)
        );
        info!(
            "║ Archive Failures:       {:>8}  │  Publish Failures: {:>4}  ║",
            self.archive_failures.load(Ordering::Relaxed),
            self.publish_failures.load(Ordering::Relaxed)
        );
        info!(
            "║ Events Verified: {:>6}  Missing: {:>6}  Requeued: {:>6}   ║",
            self.events_verified.load(Ordering::Relaxed),
            self.events_missing.load(Ordering::Relaxed),
            self.events_requeued.load(Ordering::Relaxed)
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Ingest Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5}   ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Fraud Probability Distribution:                              ║");
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 {
                (count as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            let bar_len = (pct / 2.0) as usize;
            let bar: String = "█".repeat(bar_len.min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Ingest latency statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: std::sync::Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: std::sync::Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = PipelineMetrics::new();

        metrics.record_ingest(Duration::from_micros(100), &Score::new(0.91, 0.5));
        metrics.record_ingest(Duration::from_micros(200), &Score::new(0.05, 0.5));
        metrics.record_archive_failure();
        metrics.record_event_verified();

        assert_eq!(metrics.transactions_ingested.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.fraud_flagged.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.archive_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.events_verified.load(Ordering::Relaxed), 1);

        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean_us, 150);
        assert_eq!(stats.max_us, 200);
    }

    #[test]
    fn test_score_buckets() {
        let metrics = PipelineMetrics::new();
        metrics.record_ingest(Duration::from_micros(10), &Score::new(0.05, 0.5));
        metrics.record_ingest(Duration::from_micros(10), &Score::new(0.95, 0.5));
        metrics.record_ingest(Duration::from_micros(10), &Score::new(1.0, 0.5));

        let dist = metrics.get_score_distribution();
        assert_eq!(dist[0], 1);
        assert_eq!(dist[9], 2);
    }
}

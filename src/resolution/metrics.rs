//! Batch metrics collection and periodic summary logging.
//!
//! Every finished batch folds its counts into [`BatchMetrics`]; a summary is
//! logged under the `resolution` target every N batches or after a fixed
//! amount of wall time, whichever comes first.

use super::processor::ResolutionOutcome;
use crate::config::ResolutionConfig;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// What one batch did.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: u64,
    pub name: String,
    pub items: usize,
    pub successes: usize,
    pub failures: usize,
    /// Entries another batch or a reparse took first
    pub skipped: usize,
    pub yields: usize,
    pub duration: Duration,
    /// Runnable scheduler tasks when the batch finished
    pub queue_depth: usize,
}

/// Outcome counters across single-item and batched processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionCounters {
    pub resolved: u64,
    pub target_not_found: u64,
    pub source_not_found: u64,
    pub edge_rejected: u64,
}

impl ResolutionCounters {
    pub fn record(&mut self, outcome: &ResolutionOutcome) {
        match outcome {
            ResolutionOutcome::Resolved => self.resolved += 1,
            ResolutionOutcome::TargetNotFound => self.target_not_found += 1,
            ResolutionOutcome::SourceNotFound => self.source_not_found += 1,
            ResolutionOutcome::EdgeRejected(_) => self.edge_rejected += 1,
        }
    }
}

/// Point-in-time copy of the metrics, cheap to hand out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub batches_processed: u64,
    pub items_processed: u64,
    pub successes: u64,
    pub failures: u64,
    pub yields: u64,
    pub total_duration: Duration,
    pub average_queue_depth: f64,
    pub max_queue_depth: usize,
    pub counters: ResolutionCounters,
}

impl MetricsSnapshot {
    /// Items per second of batch time.
    pub fn throughput(&self) -> f64 {
        let secs = self.total_duration.as_secs_f64();
        if secs > 0.0 {
            self.items_processed as f64 / secs
        } else {
            0.0
        }
    }
}

#[derive(Debug)]
pub struct BatchMetrics {
    batches_processed: u64,
    items_processed: u64,
    successes: u64,
    failures: u64,
    yields: u64,
    total_duration: Duration,
    queue_depth_history: VecDeque<usize>,
    history_capacity: usize,
    counters: ResolutionCounters,

    summary_every: u64,
    summary_interval: Duration,
    batches_since_summary: u64,
    last_summary_at: Option<Instant>,
    summaries_logged: u64,
}

impl BatchMetrics {
    pub fn new(config: &ResolutionConfig) -> Self {
        Self {
            batches_processed: 0,
            items_processed: 0,
            successes: 0,
            failures: 0,
            yields: 0,
            total_duration: Duration::ZERO,
            queue_depth_history: VecDeque::with_capacity(config.queue_depth_history),
            history_capacity: config.queue_depth_history.max(1),
            counters: ResolutionCounters::default(),
            summary_every: config.summary_every_batches.max(1),
            summary_interval: config.summary_interval(),
            batches_since_summary: 0,
            last_summary_at: None,
            summaries_logged: 0,
        }
    }

    /// Fold a finished batch in. Logs a summary when one is due.
    pub fn record_batch(&mut self, report: &BatchReport, now: Instant) {
        self.batches_processed += 1;
        self.items_processed += report.items as u64;
        self.successes += report.successes as u64;
        self.failures += report.failures as u64;
        self.yields += report.yields as u64;
        self.total_duration += report.duration;

        if self.queue_depth_history.len() == self.history_capacity {
            self.queue_depth_history.pop_front();
        }
        self.queue_depth_history.push_back(report.queue_depth);

        tracing::debug!(
            target: "resolution",
            "batch #{} '{}': {} items, {} ok, {} failed, {} yields in {:?}",
            report.batch_id,
            report.name,
            report.items,
            report.successes,
            report.failures,
            report.yields,
            report.duration
        );

        self.batches_since_summary += 1;
        let last = *self.last_summary_at.get_or_insert(now);
        let interval_due = now.saturating_duration_since(last) >= self.summary_interval;
        if self.batches_since_summary >= self.summary_every || interval_due {
            self.log_summary();
            self.batches_since_summary = 0;
            self.last_summary_at = Some(now);
        }
    }

    pub fn record_outcome(&mut self, outcome: &ResolutionOutcome) {
        self.counters.record(outcome);
    }

    pub fn counters(&self) -> ResolutionCounters {
        self.counters
    }

    /// Number of summaries logged so far.
    pub fn summaries_logged(&self) -> u64 {
        self.summaries_logged
    }

    pub fn queue_depth_history(&self) -> impl Iterator<Item = usize> + '_ {
        self.queue_depth_history.iter().copied()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self.queue_depth_history.len();
        let average_queue_depth = if samples > 0 {
            self.queue_depth_history.iter().sum::<usize>() as f64 / samples as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            batches_processed: self.batches_processed,
            items_processed: self.items_processed,
            successes: self.successes,
            failures: self.failures,
            yields: self.yields,
            total_duration: self.total_duration,
            average_queue_depth,
            max_queue_depth: self.queue_depth_history.iter().copied().max().unwrap_or(0),
            counters: self.counters,
        }
    }

    fn log_summary(&mut self) {
        self.summaries_logged += 1;
        let snapshot = self.snapshot();
        tracing::info!(
            target: "resolution",
            "Batches: {} | Items: {} ({} ok, {} failed) | Yields: {} | Time: {:.2}s ({:.0}/s) | Queue depth: avg {:.1}, max {}",
            snapshot.batches_processed,
            snapshot.items_processed,
            snapshot.successes,
            snapshot.failures,
            snapshot.yields,
            snapshot.total_duration.as_secs_f64(),
            snapshot.throughput(),
            snapshot.average_queue_depth,
            snapshot.max_queue_depth
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(items: usize, queue_depth: usize) -> BatchReport {
        BatchReport {
            batch_id: 1,
            name: "Foo".to_string(),
            items,
            successes: items,
            failures: 0,
            skipped: 0,
            yields: 1,
            duration: Duration::from_millis(2),
            queue_depth,
        }
    }

    #[test]
    fn test_queue_depth_history_is_capped() {
        let config = ResolutionConfig {
            queue_depth_history: 3,
            ..ResolutionConfig::default()
        };
        let mut metrics = BatchMetrics::new(&config);
        let now = Instant::now();

        for depth in 1..=5 {
            metrics.record_batch(&report(10, depth), now);
        }

        assert_eq!(metrics.queue_depth_history().collect::<Vec<_>>(), vec![3, 4, 5]);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_processed, 5);
        assert_eq!(snapshot.items_processed, 50);
        assert_eq!(snapshot.max_queue_depth, 5);
        assert_eq!(snapshot.average_queue_depth, 4.0);
    }

    #[test]
    fn test_summary_every_n_batches() {
        let config = ResolutionConfig {
            summary_every_batches: 2,
            summary_interval_ms: 60_000,
            ..ResolutionConfig::default()
        };
        let mut metrics = BatchMetrics::new(&config);
        let now = Instant::now();

        for _ in 0..5 {
            metrics.record_batch(&report(1, 0), now);
        }
        assert_eq!(metrics.summaries_logged(), 2);
    }

    #[test]
    fn test_summary_after_interval() {
        let config = ResolutionConfig {
            summary_every_batches: 1_000,
            summary_interval_ms: 5_000,
            ..ResolutionConfig::default()
        };
        let mut metrics = BatchMetrics::new(&config);
        let start = Instant::now();

        metrics.record_batch(&report(1, 0), start);
        assert_eq!(metrics.summaries_logged(), 0);
        metrics.record_batch(&report(1, 0), start + Duration::from_secs(6));
        assert_eq!(metrics.summaries_logged(), 1);
    }
}

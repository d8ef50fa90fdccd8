//! Console progress reporting.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// `\r`-rewriting progress bar with a percentage and an ETA.
pub struct ProgressBar {
    prefix: String,
    total: usize,
    started: Instant,
}

const BAR_LEN: usize = 40;

impl ProgressBar {
    pub fn new(prefix: &str, total: usize) -> Self {
        Self { prefix: prefix.to_string(), total, started: Instant::now() }
    }

    pub fn update(&self, current: usize) {
        if self.total == 0 {
            return;
        }
        let line = self.render(current, self.started.elapsed());
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "\r{line}");
        let _ = stdout.flush();
        if current >= self.total {
            let _ = writeln!(stdout);
        }
    }

    fn render(&self, current: usize, elapsed: Duration) -> String {
        let current = current.min(self.total);
        let percent = current as f64 / self.total as f64 * 100.0;
        let filled = BAR_LEN * current / self.total;
        let bar: String = "=".repeat(filled) + &"-".repeat(BAR_LEN - filled);
        let eta = if current > 0 {
            elapsed.as_secs_f64() / current as f64 * (self.total - current) as f64
        } else {
            0.0
        };
        format!(
            "{} |{bar}| {percent:5.1}% ({current}/{}) ETA: {eta:.1}s",
            self.prefix, self.total
        )
    }
}

/// Shared throughput counters with a periodic reporter, replacing the
/// stats thread of the SQL purge script.
pub struct Throughput {
    records: AtomicU64,
    batches: AtomicU64,
    started: Instant,
}

impl Throughput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            started: Instant::now(),
        })
    }

    pub fn add(&self, records: u64) {
        self.records.fetch_add(records, Ordering::Relaxed);
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    /// (records, records/s, batches/s) since creation.
    pub fn rates(&self) -> (u64, f64, f64) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let records = self.records.load(Ordering::Relaxed);
        let batches = self.batches.load(Ordering::Relaxed);
        if elapsed <= 0.0 {
            return (records, 0.0, 0.0);
        }
        (records, records as f64 / elapsed, batches as f64 / elapsed)
    }

    /// Log throughput every `interval` until the returned task is aborted.
    pub fn spawn_reporter(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let stats = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let (records, per_sec, batches_per_sec) = stats.rates();
                if records > 0 {
                    info!(
                        deleted = records,
                        rate = format!("{per_sec:.1}/s"),
                        batches = format!("{batches_per_sec:.1}/s"),
                        "progress"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_shows_percent_and_counts() {
        let bar = ProgressBar::new("Deleting", 200);
        let line = bar.render(50, Duration::from_secs(10));
        assert!(line.starts_with("Deleting |"));
        assert!(line.contains(" 25.0% (50/200)"));
        // 10s for 50 leaves 30s for the remaining 150
        assert!(line.contains("ETA: 30.0s"));
    }

    #[test]
    fn render_clamps_overflow() {
        let bar = ProgressBar::new("x", 10);
        let line = bar.render(15, Duration::from_secs(1));
        assert!(line.contains("100.0% (10/10)"));
    }

    #[test]
    fn throughput_accumulates() {
        let stats = Throughput::new();
        stats.add(1000);
        stats.add(500);
        let (records, per_sec, _) = stats.rates();
        assert_eq!(records, 1500);
        assert!(per_sec > 0.0);
    }
}

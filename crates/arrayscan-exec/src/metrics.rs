//! Scan instrumentation: per-operation timings and the end-of-scan report.
//!
//! When stats are disabled recording is a no-op and nothing is allocated.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

type TimingLog = BTreeMap<&'static str, Vec<Duration>>;

/// Collects per-operation durations for one scan. Owned by the cursor.
#[derive(Debug, Default)]
pub struct Timings {
    log: Option<TimingLog>,
}

impl Timings {
    pub fn new(enabled: bool) -> Self {
        Self {
            log: enabled.then(TimingLog::new),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.log.is_some()
    }

    pub fn record(&mut self, name: &'static str, elapsed: Duration) {
        if let Some(log) = &mut self.log {
            log.entry(name).or_default().push(elapsed);
        }
    }

    /// Run `f` and record how long it took under `name`.
    pub fn time<T>(&mut self, name: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record(name, start.elapsed());
        out
    }

    /// Summarize everything recorded so far. `None` when disabled.
    pub fn report(&self, total_read: Duration) -> Option<TimingReport> {
        let rows = self
            .log
            .as_ref()?
            .iter()
            .filter_map(|(name, samples)| TimingRow::summarize(name, samples))
            .collect();
        Some(TimingReport { rows, total_read })
    }
}

/// Aggregate timings of one operation. Median, min and max are nanoseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingRow {
    pub name: String,
    pub total_secs: f64,
    pub avg_secs: f64,
    pub median_nanos: u128,
    pub min_nanos: u128,
    pub max_nanos: u128,
    pub count: usize,
}

impl TimingRow {
    fn summarize(name: &str, samples: &[Duration]) -> Option<Self> {
        let mut nanos: Vec<u128> = samples.iter().map(Duration::as_nanos).collect();
        nanos.sort_unstable();
        let count = nanos.len();
        let total: u128 = nanos.iter().sum();
        Some(Self {
            name: name.to_string(),
            total_secs: total as f64 / 1e9,
            avg_secs: total as f64 / count as f64 / 1e9,
            median_nanos: *nanos.get(count / 2)?,
            min_nanos: *nanos.first()?,
            max_nanos: *nanos.last()?,
            count,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingReport {
    pub rows: Vec<TimingRow>,
    pub total_read: Duration,
}

pub const REPORT_HEADER: &str = "functionName, total (sec), avg (sec), median, min, max, count";

impl TimingReport {
    /// CSV body, one line per operation plus a closing `totalReadTime` line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for r in &self.rows {
            let _ = writeln!(
                out,
                "{},{:.6},{:.6},{},{},{},{}",
                r.name, r.total_secs, r.avg_secs, r.median_nanos, r.min_nanos, r.max_nanos, r.count
            );
        }
        let total = self.total_read.as_secs_f64();
        let _ = writeln!(
            out,
            "totalReadTime,{total:.6},{total:.6},{total:.6},{total:.6},{total:.6},1"
        );
        out
    }

    /// Log the table and write it, followed by `engine_stats`, to
    /// `<dir>/arrayscan_stats_<scan_id>`. Failures are logged only.
    pub fn dump(&self, dir: &Path, scan_id: &str, engine_stats: Option<&str>) -> Option<PathBuf> {
        let body = self.render();
        tracing::info!(scan_id, "{REPORT_HEADER}\n{body}");

        let path = dir.join(format!("arrayscan_stats_{scan_id}"));
        let mut contents = format!("{REPORT_HEADER}\n{body}");
        if let Some(stats) = engine_stats {
            contents.push('\n');
            contents.push_str(stats);
        }
        match std::fs::write(&path, contents) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "dumped scan stats");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to dump scan stats");
                None
            }
        }
    }
}

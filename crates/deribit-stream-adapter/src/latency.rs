/*
[INPUT]:  Duration samples (microseconds) tagged by category
[OUTPUT]: Summary statistics (min/max/mean/median/p95/p99) per category
[POS]:    Instrumentation layer - shared by REST and WebSocket clients
[UPDATE]: When adding latency categories or changing percentile rules
*/

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use parking_lot::Mutex;

/// Where a latency sample was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LatencyCategory {
    /// REST request round trip
    Rest,
    /// Time spent decoding and dispatching one inbound WebSocket frame
    Streaming,
    /// WebSocket request sent -> matching reply received
    StreamingRoundTrip,
}

impl LatencyCategory {
    pub const ALL: [LatencyCategory; 3] = [
        LatencyCategory::Rest,
        LatencyCategory::Streaming,
        LatencyCategory::StreamingRoundTrip,
    ];

    pub fn label(self) -> &'static str {
        match self {
            LatencyCategory::Rest => "REST API",
            LatencyCategory::Streaming => "WebSocket processing",
            LatencyCategory::StreamingRoundTrip => "WebSocket round trip",
        }
    }
}

/// Summary over all samples of one category, in microseconds
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyStats {
    pub count: usize,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub median: u64,
    pub p95: u64,
    pub p99: u64,
}

impl LatencyStats {
    /// Build statistics from unsorted samples. Returns `None` when empty.
    pub fn from_samples(samples: &[u64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u128 = sorted.iter().map(|&v| u128::from(v)).sum();

        Some(Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            mean: sum as f64 / count as f64,
            median: sorted[count / 2],
            p95: nearest_rank_floor(&sorted, 0.95),
            p99: nearest_rank_floor(&sorted, 0.99),
        })
    }
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Samples: {}", self.count)?;
        writeln!(f, "  Min: {}", self.min)?;
        writeln!(f, "  Max: {}", self.max)?;
        writeln!(f, "  Mean: {:.2}", self.mean)?;
        writeln!(f, "  Median: {}", self.median)?;
        writeln!(f, "  95th Percentile: {}", self.p95)?;
        write!(f, "  99th Percentile: {}", self.p99)
    }
}

/// Value at sorted index `floor(n * q)`, no interpolation.
fn nearest_rank_floor(sorted: &[u64], q: f64) -> u64 {
    let index = (sorted.len() as f64 * q) as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Append-only latency sample store.
///
/// Samples are never evicted; the set for a category only grows for the
/// lifetime of the recorder.
#[derive(Debug, Default)]
pub struct LatencyRecorder {
    samples: Mutex<HashMap<LatencyCategory, Vec<u64>>>,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, category: LatencyCategory, micros: u64) {
        self.samples.lock().entry(category).or_default().push(micros);
    }

    /// Record the time elapsed since `started`.
    pub fn record_since(&self, category: LatencyCategory, started: Instant) {
        let micros = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.record(category, micros);
    }

    pub fn count(&self, category: LatencyCategory) -> usize {
        self.samples.lock().get(&category).map_or(0, Vec::len)
    }

    pub fn snapshot(&self, category: LatencyCategory) -> Option<LatencyStats> {
        // Copy under the lock, sort outside it.
        let copy = self.samples.lock().get(&category).cloned()?;
        LatencyStats::from_samples(&copy)
    }

    /// Human readable report of every category that has samples.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for category in LatencyCategory::ALL {
            if let Some(stats) = self.snapshot(category) {
                out.push_str(&format!("{} Latency (microseconds):\n{}\n", category.label(), stats));
            }
        }
        out
    }
}

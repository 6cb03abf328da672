//! Native memory footprint tracking for a single scan.
//!
//! Keep this cheap: the cursor records after every allocation or growth.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct FootprintTracker {
    current: AtomicU64,
    peak: AtomicU64,
}

impl FootprintTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the footprint after a change; updates the peak if higher.
    pub fn record(&self, bytes: u64) {
        self.current.store(bytes, Ordering::Relaxed);
        let mut cur = self.peak.load(Ordering::Relaxed);
        while bytes > cur {
            match self
                .peak
                .compare_exchange(cur, bytes, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(
            bytes,
            peak = self.peak.load(Ordering::Relaxed),
            "native buffer footprint"
        );
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }
}

//! Initial buffer sizing from the storage engine's result-size estimate.

use serde::{Deserialize, Serialize};

/// Estimated result size of one field, in elements per buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultEstimate {
    pub offsets: Option<u64>,
    pub values: u64,
    pub validity: Option<u64>,
}

impl ResultEstimate {
    pub fn fixed(values: u64) -> Self {
        Self {
            offsets: None,
            values,
            validity: None,
        }
    }

    pub fn var(offsets: u64, values: u64) -> Self {
        Self {
            offsets: Some(offsets),
            values,
            validity: None,
        }
    }

    pub fn with_validity(mut self, validity: u64) -> Self {
        self.validity = Some(validity);
        self
    }

    /// Upper bound on the number of cells this field will produce.
    pub fn cells(&self) -> u64 {
        self.offsets.unwrap_or(self.values)
    }
}

/// Element capacity for `estimate` elements of `element_width` bytes.
///
/// When the byte size overflows or exceeds `max_bytes`, falls back to as many
/// elements as fit into `max_bytes`. Never returns zero, so doubling always
/// makes progress.
pub fn clamped_elements(estimate: u64, element_width: usize, max_bytes: usize) -> usize {
    let width = element_width.max(1);
    let fits = estimate
        .checked_mul(width as u64)
        .map_or(false, |bytes| bytes <= max_bytes as u64);
    let elements = if fits {
        estimate as usize
    } else {
        max_bytes / width
    };
    elements.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn estimate_under_budget_passes_through() {
        assert_eq!(clamped_elements(100, 4, 1024), 100);
    }

    #[test]
    fn estimate_over_budget_falls_back() {
        assert_eq!(clamped_elements(1000, 4, 1024), 256);
        assert_eq!(clamped_elements(u64::MAX, 8, 1024), 128);
    }

    #[test]
    fn never_zero() {
        assert_eq!(clamped_elements(0, 4, 1024), 1);
        assert_eq!(clamped_elements(10, 8, 4), 1);
    }

    proptest! {
        #[test]
        fn clamped_size_fits_budget(est in any::<u64>(), width in 1usize..16, budget in 16usize..1 << 20) {
            let n = clamped_elements(est, width, budget);
            prop_assert!(n >= 1);
            prop_assert!(n * width <= budget);
        }
    }
}

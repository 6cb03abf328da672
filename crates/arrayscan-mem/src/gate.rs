//! Memory feasibility gate for buffer growth.
//!
//! Doubling needs 2x the current footprint for the new native buffers, plus
//! room for the decoded copies the cursor takes after each submit. The gate
//! therefore requires available memory to exceed `headroom` times the
//! current footprint (4x by default) before any buffer is doubled.

use arrayscan_core::budget::MemoryProbe;
use sysinfo::System;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrowthGate {
    headroom: u64,
}

impl Default for GrowthGate {
    fn default() -> Self {
        Self { headroom: 4 }
    }
}

impl GrowthGate {
    pub fn new(headroom: u64) -> Self {
        Self { headroom }
    }

    pub fn headroom(&self) -> u64 {
        self.headroom
    }

    /// Ok when `current_bytes` of buffers may be doubled.
    pub fn check(&self, current_bytes: u64, probe: &dyn MemoryProbe) -> Result<()> {
        let available = probe.available_bytes();
        let required = current_bytes.saturating_mul(self.headroom);

        #[cfg(feature = "tracing")]
        tracing::info!(
            current_bytes,
            doubled_bytes = current_bytes.saturating_mul(2),
            available,
            "checking buffer reallocation"
        );

        if available > required {
            Ok(())
        } else {
            Err(Error::InsufficientMemory {
                current: current_bytes,
                required,
                available,
            })
        }
    }
}

/// Reads available memory from the operating system on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemory;

impl MemoryProbe for SystemMemory {
    fn available_bytes(&self) -> u64 {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.available_memory()
    }
}

/// A constant reading; for tests and for callers that budget memory themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedMemory(pub u64);

impl MemoryProbe for FixedMemory {
    fn available_bytes(&self) -> u64 {
        self.0
    }
}

//! Buffer Manager: initial allocation and gated doubling of field buffers.

use arrayscan_core::budget::MemoryProbe;
use arrayscan_core::field::Field;

use crate::buffer::{BufferLayout, BufferSet, FieldBuffers};
use crate::error::Result;
use crate::gate::{GrowthGate, SystemMemory};
use crate::sizing::{clamped_elements, ResultEstimate};
use crate::tracking::FootprintTracker;

pub struct BufferManager {
    max_bytes: usize,
    gate: GrowthGate,
    probe: Box<dyn MemoryProbe>,
    tracker: FootprintTracker,
}

impl BufferManager {
    /// `max_bytes` caps each buffer's initial size; growth may exceed it.
    pub fn new(max_bytes: usize, gate: GrowthGate) -> Self {
        Self {
            max_bytes,
            gate,
            probe: Box::new(SystemMemory),
            tracker: FootprintTracker::new(),
        }
    }

    pub fn with_probe(mut self, probe: Box<dyn MemoryProbe>) -> Self {
        self.set_probe(probe);
        self
    }

    pub fn set_probe(&mut self, probe: Box<dyn MemoryProbe>) {
        self.probe = probe;
    }

    /// Initial element capacity for `estimate` elements of `element_width` bytes.
    pub fn size_for(&self, element_width: usize, estimate: u64) -> usize {
        clamped_elements(estimate, element_width, self.max_bytes)
    }

    /// Capacities for `field` given the engine's estimate. Offsets exist iff
    /// the field is variable-length, validity iff it is nullable; validity is
    /// sized per cell.
    pub fn layout_for(&self, field: &Field, estimate: &ResultEstimate) -> BufferLayout {
        let cells = estimate.cells();
        BufferLayout {
            offsets: field
                .var_len
                .then(|| self.size_for(crate::buffer::OFFSET_WIDTH, cells)),
            values: self.size_for(field.datatype.native_size(), estimate.values),
            validity: field.nullable.then(|| {
                self.size_for(
                    crate::buffer::VALIDITY_WIDTH,
                    estimate.validity.unwrap_or(cells),
                )
            }),
        }
    }

    pub fn allocate(&self, field: &Field, estimate: &ResultEstimate) -> Result<FieldBuffers> {
        let layout = self.layout_for(field, estimate);
        let set = BufferSet::allocate(field.datatype, layout)?;
        Ok(FieldBuffers::new(field.name.clone(), field.datatype, set))
    }

    /// Double every buffer of every field, or fail without touching any.
    pub fn grow(&self, buffers: &mut [FieldBuffers]) -> Result<()> {
        let current = footprint(buffers);
        self.gate.check(current, self.probe.as_ref())?;

        let grown = buffers
            .iter()
            .map(|fb| fb.set.grown())
            .collect::<Result<Vec<_>>>()?;
        for (fb, set) in buffers.iter_mut().zip(grown) {
            // The old set drops here, as one unit.
            fb.set = set;
        }
        self.record(buffers);
        Ok(())
    }

    pub fn record(&self, buffers: &[FieldBuffers]) {
        self.tracker.record(footprint(buffers));
    }

    pub fn tracker(&self) -> &FootprintTracker {
        &self.tracker
    }
}

/// Sum of all buffer byte sizes.
pub fn footprint(buffers: &[FieldBuffers]) -> u64 {
    buffers.iter().map(|fb| fb.set.nbytes() as u64).sum()
}

/// Largest single buffer in bytes and the number of buffers.
pub fn buffer_stats(buffers: &[FieldBuffers]) -> (usize, usize) {
    buffers
        .iter()
        .flat_map(|fb| fb.set.buffers())
        .fold((0, 0), |(largest, count), b| {
            (largest.max(b.nbytes()), count + 1)
        })
}

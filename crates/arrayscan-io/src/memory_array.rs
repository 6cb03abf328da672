//! In-memory sparse array engine.
//!
//! Cells are kept sorted by coordinates (row-major). A submit only ever writes
//! whole tiles of `tile_extent` result cells; when the registered buffers
//! cannot hold even one tile the submit makes no progress and reports
//! `Incomplete`, which is what drives a cursor to grow its buffers.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use arrayscan_core::schema::{ArraySchema, AttributeInfo, Datatype, DimensionInfo};
use arrayscan_core::types::NativeValue;
use arrayscan_mem::buffer::{BufferLayout, BufferSet, FieldBuffers, OFFSET_WIDTH};

use crate::error::{Result, StorageError};
use crate::query::{ArrayQuery, QueryStatus, ResultElements};

#[derive(Debug, Clone, PartialEq)]
struct Cell {
    coords: Vec<NativeValue>,
    values: Vec<Option<NativeValue>>,
}

#[derive(Debug)]
struct ArrayData {
    schema: ArraySchema,
    cells: Vec<Cell>,
    tile_extent: usize,
    closed_queries: AtomicUsize,
}

/// Shared, immutable array contents. Cloning is cheap; every query opened on
/// it owns its own ranges, buffers registrations and progress.
#[derive(Debug, Clone)]
pub struct MemoryArray {
    data: Arc<ArrayData>,
}

impl MemoryArray {
    pub fn builder() -> MemoryArrayBuilder {
        MemoryArrayBuilder::default()
    }

    pub fn schema(&self) -> &ArraySchema {
        &self.data.schema
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.data.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.cells.is_empty()
    }

    pub fn open_query(&self) -> MemoryQuery {
        MemoryQuery {
            data: Arc::clone(&self.data),
            ranges: vec![Vec::new(); self.data.schema.dimensions.len()],
            layouts: Vec::new(),
            selected: None,
            next: 0,
            status: QueryStatus::Uninitialized,
            elements: Vec::new(),
            stats: None,
            closed: false,
        }
    }

    /// How many queries opened on this array have been closed.
    pub fn closed_queries(&self) -> usize {
        self.data.closed_queries.load(AtomicOrdering::Acquire)
    }
}

pub struct MemoryArrayBuilder {
    dimensions: Vec<DimensionInfo>,
    attributes: Vec<AttributeInfo>,
    cells: Vec<Cell>,
    tile_extent: usize,
}

impl Default for MemoryArrayBuilder {
    fn default() -> Self {
        Self {
            dimensions: Vec::new(),
            attributes: Vec::new(),
            cells: Vec::new(),
            tile_extent: 1,
        }
    }
}

impl MemoryArrayBuilder {
    pub fn dimension(mut self, dim: DimensionInfo) -> Self {
        self.dimensions.push(dim);
        self
    }

    pub fn attribute(mut self, attr: AttributeInfo) -> Self {
        self.attributes.push(attr);
        self
    }

    /// Result cells per tile; a submit writes whole tiles only.
    pub fn tile_extent(mut self, cells: usize) -> Self {
        self.tile_extent = cells;
        self
    }

    /// Add one cell: a coordinate per dimension, a value per attribute
    /// (`None` is null).
    pub fn cell(mut self, coords: Vec<NativeValue>, values: Vec<Option<NativeValue>>) -> Self {
        self.cells.push(Cell { coords, values });
        self
    }

    pub fn build(self) -> Result<MemoryArray> {
        if self.tile_extent == 0 {
            return Err(StorageError::Backend("tile extent must be positive".into()));
        }
        if self.dimensions.is_empty() {
            return Err(StorageError::Backend("array needs at least one dimension".into()));
        }
        for cell in &self.cells {
            self.validate(cell)?;
        }

        let mut cells = self.cells;
        cells.sort_by(|a, b| cmp_coords(&a.coords, &b.coords));

        Ok(MemoryArray {
            data: Arc::new(ArrayData {
                schema: ArraySchema::new(self.dimensions, self.attributes),
                cells,
                tile_extent: self.tile_extent,
                closed_queries: AtomicUsize::new(0),
            }),
        })
    }

    fn validate(&self, cell: &Cell) -> Result<()> {
        if cell.coords.len() != self.dimensions.len() {
            return Err(StorageError::InvalidCell(format!(
                "{} coordinates for {} dimensions",
                cell.coords.len(),
                self.dimensions.len()
            )));
        }
        if cell.values.len() != self.attributes.len() {
            return Err(StorageError::InvalidCell(format!(
                "{} values for {} attributes",
                cell.values.len(),
                self.attributes.len()
            )));
        }
        for (dim, coord) in self.dimensions.iter().zip(&cell.coords) {
            check_value(&dim.name, dim.datatype, dim.var_len, coord)?;
            if coord.native_cmp(coord).is_err() {
                return Err(StorageError::InvalidCell(format!(
                    "unordered coordinate on '{}'",
                    dim.name
                )));
            }
        }
        for (attr, value) in self.attributes.iter().zip(&cell.values) {
            match value {
                Some(v) => check_value(&attr.name, attr.datatype, attr.var_len, v)?,
                None if attr.nullable => {}
                None => {
                    return Err(StorageError::InvalidCell(format!(
                        "null in non-nullable attribute '{}'",
                        attr.name
                    )))
                }
            }
        }
        Ok(())
    }
}

fn check_value(name: &str, datatype: Datatype, var_len: bool, value: &NativeValue) -> Result<()> {
    if !value.matches(datatype) || (!var_len && value.encoded_len() != datatype.native_size()) {
        return Err(StorageError::DatatypeMismatch {
            name: name.to_string(),
            expected: datatype,
            got: value.to_string(),
        });
    }
    Ok(())
}

fn cmp_coords(a: &[NativeValue], b: &[NativeValue]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match x.native_cmp(y).unwrap_or(Ordering::Equal) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Dimension(usize),
    Attribute(usize),
}

#[derive(Debug, Clone, Copy)]
struct Shape {
    source: Source,
    datatype: Datatype,
    var_len: bool,
    nullable: bool,
}

impl Shape {
    fn value<'a>(&self, cell: &'a Cell) -> Option<&'a NativeValue> {
        match self.source {
            Source::Dimension(i) => cell.coords.get(i),
            Source::Attribute(i) => cell.values.get(i).and_then(Option::as_ref),
        }
    }

    /// Elements this cell occupies in the value buffer.
    fn value_elements(&self, cell: &Cell) -> usize {
        if self.var_len {
            self.value(cell).map_or(0, NativeValue::encoded_len)
        } else {
            1
        }
    }
}

#[derive(Debug, Default)]
struct SubmitStats {
    submits: u64,
    zero_progress: u64,
    cells: u64,
}

/// One read query against a `MemoryArray`.
pub struct MemoryQuery {
    data: Arc<ArrayData>,
    ranges: Vec<Vec<(NativeValue, NativeValue)>>,
    layouts: Vec<(String, BufferLayout)>,
    /// Indices of cells inside the ranges, fixed at the first submit.
    selected: Option<Vec<usize>>,
    next: usize,
    status: QueryStatus,
    elements: Vec<(String, ResultElements)>,
    stats: Option<SubmitStats>,
    closed: bool,
}

impl MemoryQuery {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    fn shape(&self, name: &str) -> Result<Shape> {
        let schema = &self.data.schema;
        if let Some(i) = schema.attributes.iter().position(|a| a.name == name) {
            let attr = &schema.attributes[i];
            return Ok(Shape {
                source: Source::Attribute(i),
                datatype: attr.datatype,
                var_len: attr.var_len,
                nullable: attr.nullable,
            });
        }
        if let Some((i, dim)) = schema.dimension(name) {
            return Ok(Shape {
                source: Source::Dimension(i),
                datatype: dim.datatype,
                var_len: dim.var_len,
                nullable: false,
            });
        }
        Err(StorageError::UnknownField(name.to_string()))
    }

    fn shape_checked(&self, name: &str, var_len: bool, nullable: bool) -> Result<Shape> {
        let shape = self.shape(name)?;
        if shape.var_len != var_len || shape.nullable != nullable {
            return Err(StorageError::Backend(format!(
                "estimate variant (var_len={var_len}, nullable={nullable}) does not match '{name}'"
            )));
        }
        Ok(shape)
    }

    fn in_ranges(&self, cell: &Cell) -> bool {
        self.ranges.iter().zip(&cell.coords).all(|(ranges, coord)| {
            ranges.is_empty()
                || ranges.iter().any(|(lo, hi)| {
                    lo.native_cmp(coord).map_or(false, |o| o != Ordering::Greater)
                        && hi.native_cmp(coord).map_or(false, |o| o != Ordering::Less)
                })
        })
    }

    fn matching(&self) -> impl Iterator<Item = &Cell> + '_ {
        self.data.cells.iter().filter(|c| self.in_ranges(c))
    }

    /// `(cells, value elements)` inside the current ranges.
    fn estimate_for(&self, shape: &Shape) -> (u64, u64) {
        self.matching().fold((0, 0), |(cells, values), c| {
            (cells + 1, values + shape.value_elements(c) as u64)
        })
    }

    fn push_range(&mut self, dim: usize, low: NativeValue, high: NativeValue) -> Result<()> {
        if self.selected.is_some() {
            return Err(StorageError::InvalidRange {
                dim,
                reason: "ranges cannot change after the first submit".into(),
            });
        }
        match low.native_cmp(&high) {
            Ok(Ordering::Greater) => Err(StorageError::InvalidRange {
                dim,
                reason: format!("low {low} above high {high}"),
            }),
            Ok(_) => {
                self.ranges[dim].push((low, high));
                Ok(())
            }
            Err(e) => Err(StorageError::InvalidRange {
                dim,
                reason: e.to_string(),
            }),
        }
    }

    fn dimension_info(&self, dim: usize) -> Result<&DimensionInfo> {
        self.data
            .schema
            .dimensions
            .get(dim)
            .ok_or(StorageError::DimensionOutOfRange(dim))
    }
}

fn check_capacity(name: &str, layout: &BufferLayout, set: &BufferSet) -> Result<()> {
    let pairs = [
        ("offsets", layout.offsets, set.offsets.as_ref().map(|b| b.capacity())),
        ("values", Some(layout.values), Some(set.values.capacity())),
        ("validity", layout.validity, set.validity.as_ref().map(|b| b.capacity())),
    ];
    for (buffer, registered, actual) in pairs {
        match (registered, actual) {
            (Some(required), Some(capacity)) if capacity < required => {
                return Err(StorageError::BufferTooSmall {
                    name: name.to_string(),
                    buffer,
                    capacity,
                    required,
                })
            }
            (Some(required), None) => {
                return Err(StorageError::BufferTooSmall {
                    name: name.to_string(),
                    buffer,
                    capacity: 0,
                    required,
                })
            }
            _ => {}
        }
    }
    Ok(())
}

/// Write `cells` into `set` and report what was written.
fn write_field(shape: &Shape, cells: &[&Cell], set: &mut BufferSet) -> ResultElements {
    let width = shape.datatype.native_size();
    let mut values = Vec::new();

    if let Some(offsets) = set.offsets.as_mut() {
        let out = offsets.as_bytes_mut();
        for (i, cell) in cells.iter().enumerate() {
            let at = i * OFFSET_WIDTH;
            out[at..at + OFFSET_WIDTH].copy_from_slice(&(values.len() as u64).to_le_bytes());
            if let Some(v) = shape.value(cell) {
                v.write_le(&mut values);
            }
        }
    } else {
        for cell in cells {
            match shape.value(cell) {
                Some(v) => v.write_le(&mut values),
                None => values.resize(values.len() + width, 0),
            }
        }
    }
    set.values.as_bytes_mut()[..values.len()].copy_from_slice(&values);

    if let Some(validity) = set.validity.as_mut() {
        let out = validity.as_bytes_mut();
        for (i, cell) in cells.iter().enumerate() {
            out[i] = shape.value(cell).is_some() as u8;
        }
    }

    ResultElements {
        offsets: if shape.var_len { cells.len() as u64 } else { 0 },
        values: if shape.var_len {
            values.len() as u64
        } else {
            cells.len() as u64
        },
    }
}

impl ArrayQuery for MemoryQuery {
    fn schema(&self) -> Result<ArraySchema> {
        self.ensure_open()?;
        Ok(self.data.schema.clone())
    }

    fn non_empty_domain(&self) -> Result<Option<Vec<(NativeValue, NativeValue)>>> {
        self.ensure_open()?;
        let Some(first) = self.data.cells.first() else {
            return Ok(None);
        };
        let mut bounds: Vec<(NativeValue, NativeValue)> = first
            .coords
            .iter()
            .map(|c| (c.clone(), c.clone()))
            .collect();
        for cell in &self.data.cells[1..] {
            for ((lo, hi), coord) in bounds.iter_mut().zip(&cell.coords) {
                if coord.native_cmp(lo).map_err(|e| StorageError::Backend(e.to_string()))?
                    == Ordering::Less
                {
                    *lo = coord.clone();
                }
                if coord.native_cmp(hi).map_err(|e| StorageError::Backend(e.to_string()))?
                    == Ordering::Greater
                {
                    *hi = coord.clone();
                }
            }
        }
        Ok(Some(bounds))
    }

    fn est_result_size(&self, name: &str) -> Result<u64> {
        self.ensure_open()?;
        let shape = self.shape_checked(name, false, false)?;
        Ok(self.estimate_for(&shape).1)
    }

    fn est_result_size_nullable(&self, name: &str) -> Result<(u64, u64)> {
        self.ensure_open()?;
        let shape = self.shape_checked(name, false, true)?;
        let (cells, values) = self.estimate_for(&shape);
        Ok((values, cells))
    }

    fn est_result_size_var(&self, name: &str) -> Result<(u64, u64)> {
        self.ensure_open()?;
        let shape = self.shape_checked(name, true, false)?;
        Ok(self.estimate_for(&shape))
    }

    fn est_result_size_var_nullable(&self, name: &str) -> Result<(u64, u64, u64)> {
        self.ensure_open()?;
        let shape = self.shape_checked(name, true, true)?;
        let (cells, values) = self.estimate_for(&shape);
        Ok((cells, values, cells))
    }

    fn add_range(&mut self, dim: usize, low: &NativeValue, high: &NativeValue) -> Result<()> {
        self.ensure_open()?;
        let info = self.dimension_info(dim)?;
        if info.var_len {
            return Err(StorageError::InvalidRange {
                dim,
                reason: format!("'{}' is variable-length; use a string range", info.name),
            });
        }
        for v in [low, high] {
            check_value(&info.name, info.datatype, false, v)?;
        }
        self.push_range(dim, low.clone(), high.clone())
    }

    fn add_range_var(&mut self, dim: usize, low: &[u8], high: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let info = self.dimension_info(dim)?;
        if !info.var_len {
            return Err(StorageError::InvalidRange {
                dim,
                reason: format!("'{}' is fixed-length; use a typed range", info.name),
            });
        }
        self.push_range(
            dim,
            NativeValue::Bytes(low.to_vec()),
            NativeValue::Bytes(high.to_vec()),
        )
    }

    fn set_buffer(&mut self, name: &str, layout: BufferLayout) -> Result<()> {
        self.ensure_open()?;
        let shape = self.shape(name)?;
        if layout.offsets.is_some() != shape.var_len || layout.validity.is_some() != shape.nullable
        {
            return Err(StorageError::Backend(format!(
                "buffer layout {layout:?} does not match the shape of '{name}'"
            )));
        }
        match self.layouts.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = layout,
            None => self.layouts.push((name.to_string(), layout)),
        }
        Ok(())
    }

    fn reset_buffers(&mut self) {
        self.layouts.clear();
    }

    fn submit(&mut self, buffers: &mut [FieldBuffers]) -> Result<QueryStatus> {
        self.ensure_open()?;
        if self.layouts.is_empty() {
            return Err(StorageError::Backend("submit without any buffer set".into()));
        }

        let mut targets = Vec::with_capacity(self.layouts.len());
        for (name, layout) in &self.layouts {
            let idx = buffers
                .iter()
                .position(|b| &b.name == name)
                .ok_or_else(|| StorageError::BufferNotSet(name.clone()))?;
            check_capacity(name, layout, &buffers[idx].set)?;
            targets.push((idx, *layout, self.shape(name)?));
        }

        if self.selected.is_none() {
            let selected = self
                .data
                .cells
                .iter()
                .enumerate()
                .filter(|(_, c)| self.in_ranges(c))
                .map(|(i, _)| i)
                .collect();
            self.selected = Some(selected);
        }
        let selected = self.selected.as_deref().unwrap_or(&[]);
        let remaining = &selected[self.next.min(selected.len())..];

        // Whole tiles only, as many as every registered buffer can hold.
        let mut take = 0;
        let mut used = vec![0usize; targets.len()];
        for tile in remaining.chunks(self.data.tile_extent) {
            let cells = take + tile.len();
            let mut grown = used.clone();
            let fits = targets.iter().enumerate().all(|(t, (_, layout, shape))| {
                grown[t] += tile
                    .iter()
                    .map(|&i| shape.value_elements(&self.data.cells[i]))
                    .sum::<usize>();
                grown[t] <= layout.values
                    && layout.offsets.map_or(true, |cap| cells <= cap)
                    && layout.validity.map_or(true, |cap| cells <= cap)
            });
            if !fits {
                break;
            }
            take = cells;
            used = grown;
        }

        let cells: Vec<&Cell> = remaining[..take]
            .iter()
            .map(|&i| &self.data.cells[i])
            .collect();
        let mut elements = Vec::with_capacity(targets.len());
        for (idx, _, shape) in &targets {
            let fb = &mut buffers[*idx];
            let written = write_field(shape, &cells, &mut fb.set);
            elements.push((fb.name.clone(), written));
        }

        self.next += take;
        self.status = if self.next >= selected.len() {
            QueryStatus::Completed
        } else {
            QueryStatus::Incomplete
        };
        self.elements = elements;

        if let Some(stats) = self.stats.as_mut() {
            stats.submits += 1;
            stats.cells += take as u64;
            if take == 0 && self.status == QueryStatus::Incomplete {
                stats.zero_progress += 1;
            }
        }
        tracing::debug!(cells = take, status = ?self.status, "memory array submit");
        Ok(self.status)
    }

    fn status(&self) -> QueryStatus {
        self.status
    }

    fn result_buffer_elements(&self) -> Result<Vec<(String, ResultElements)>> {
        self.ensure_open()?;
        Ok(self.elements.clone())
    }

    fn set_stats_enabled(&mut self, enabled: bool) {
        self.stats = enabled.then(SubmitStats::default);
    }

    fn dump_stats(&self) -> Option<String> {
        self.stats.as_ref().map(|s| {
            format!(
                "submits: {}\nzero_progress_submits: {}\ncells_returned: {}\n",
                s.submits, s.zero_progress, s.cells
            )
        })
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        self.layouts.clear();
        self.data.closed_queries.fetch_add(1, AtomicOrdering::AcqRel);
        Ok(())
    }
}

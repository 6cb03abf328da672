//! `RecordCursor`: a forward-only row iterator over one array query.
//!
//! Construction registers one range per dimension, sizes and registers the
//! read buffers, and enables engine stats if asked to. Each batch is produced
//! by a submit loop: a submit that returns no rows while the query is still
//! incomplete means the buffers cannot hold even one tile, so they are doubled
//! (if memory allows) and the query is resubmitted.
//!
//! Resources are released in reverse order of acquisition (decoded batch,
//! native buffers, query) exactly once, by `close` or on drop.

use std::path::PathBuf;
use std::time::Instant;

use arrayscan_core::budget::MemoryProbe;
use arrayscan_core::config::ScanConfig;
use arrayscan_core::error::Error;
use arrayscan_core::field::{resolve_fields, Field};
use arrayscan_core::id::ScanId;
use arrayscan_core::predicate::TupleDomain;
use arrayscan_core::schema::{ArraySchema, ColumnHandle, RelationalType};
use arrayscan_core::types::NativeValue;
use arrayscan_io::{ArrayQuery, QueryStatus, ResultElements, StorageError};
use arrayscan_mem::buffer::OFFSET_WIDTH;
use arrayscan_mem::{buffer_stats, footprint, BufferManager, FieldBuffers, GrowthGate, ResultEstimate};

use crate::decode::{Batch, DecodedColumn};
use crate::error::{Result, ScanError};
use crate::metrics::Timings;
use crate::ranges::bounds_for_dimension;

pub struct RecordCursor<Q: ArrayQuery> {
    query: Q,
    scan_id: ScanId,
    fields: Vec<Field>,
    manager: BufferManager,
    buffers: Vec<FieldBuffers>,
    batch: Batch,
    status: QueryStatus,
    /// Rows of the current batch handed out so far.
    position: usize,
    rows_visited: u64,
    upper_bound: u64,
    completed_bytes: u64,
    started: Instant,
    ended: Option<Instant>,
    timings: Timings,
    stats_dir: PathBuf,
    closed: bool,
}

impl<Q: ArrayQuery> RecordCursor<Q> {
    /// Open a cursor over `query` projecting `columns` under `domain`, under a
    /// generated scan id.
    ///
    /// On failure the query is closed before the error is returned.
    pub fn new(
        query: Q,
        columns: &[ColumnHandle],
        domain: &TupleDomain,
        config: &ScanConfig,
    ) -> Result<Self> {
        Self::new_with_scan_id(query, columns, domain, config, ScanId::generate())
    }

    /// Like [`RecordCursor::new`], with the id that tags every log line and
    /// names the stats dump file.
    pub fn new_with_scan_id(
        query: Q,
        columns: &[ColumnHandle],
        domain: &TupleDomain,
        config: &ScanConfig,
        scan_id: ScanId,
    ) -> Result<Self> {
        let mut cursor = Self {
            query,
            scan_id,
            fields: Vec::new(),
            manager: BufferManager::new(
                config.read_buffer_size,
                GrowthGate::new(config.growth_headroom),
            ),
            buffers: Vec::new(),
            batch: Batch::default(),
            status: QueryStatus::Uninitialized,
            position: 0,
            rows_visited: 0,
            upper_bound: 0,
            completed_bytes: 0,
            started: Instant::now(),
            ended: None,
            timings: Timings::new(config.enable_stats),
            stats_dir: config.stats_dir(),
            closed: false,
        };
        // Dropping `cursor` on error closes the query.
        config.validate()?;
        cursor.query.set_stats_enabled(config.enable_stats);
        let start = Instant::now();
        let initialized = cursor.initialize(columns, domain);
        cursor.timings.record("initialize", start.elapsed());
        initialized?;
        Ok(cursor)
    }

    /// Replace the available-memory source consulted before buffer growth.
    pub fn with_memory_probe(mut self, probe: Box<dyn MemoryProbe>) -> Self {
        self.manager.set_probe(probe);
        self
    }

    fn initialize(&mut self, columns: &[ColumnHandle], domain: &TupleDomain) -> Result<()> {
        let schema = self.query.schema()?;
        self.fields = resolve_fields(columns, &schema)?;

        let Some(non_empty) = self.query.non_empty_domain()? else {
            tracing::info!(scan_id = %self.scan_id, "array is empty; nothing to read");
            return Ok(());
        };

        let start = Instant::now();
        let ranges = self.set_ranges(&schema, domain, &non_empty);
        self.timings.record("set_ranges", start.elapsed());
        if !ranges? {
            return Ok(());
        }

        let start = Instant::now();
        let buffers = self.init_query_buffers();
        self.timings.record("init_query_buffers", start.elapsed());
        buffers
    }

    /// Resolve and register one range per dimension. Returns `false`, with
    /// nothing registered, when some dimension's predicate cannot match.
    fn set_ranges(
        &mut self,
        schema: &ArraySchema,
        domain: &TupleDomain,
        non_empty: &[(NativeValue, NativeValue)],
    ) -> Result<bool> {
        let mut resolved = Vec::with_capacity(schema.dimensions.len());
        for (position, dim) in schema.dimensions.iter().enumerate() {
            let bounds = non_empty
                .get(position)
                .ok_or(StorageError::DimensionOutOfRange(position))?;
            match bounds_for_dimension(dim, domain.get(&dim.name), bounds)? {
                Some(range) => resolved.push(range),
                None => {
                    tracing::info!(
                        scan_id = %self.scan_id,
                        dimension = %dim.name,
                        "predicate matches no stored value; nothing to read"
                    );
                    return Ok(false);
                }
            }
        }

        for (position, (dim, (low, high))) in schema.dimensions.iter().zip(resolved).enumerate() {
            tracing::info!(
                scan_id = %self.scan_id,
                dimension = %dim.name,
                %low,
                %high,
                "setting range"
            );
            if dim.var_len {
                match (&low, &high) {
                    (NativeValue::Bytes(lo), NativeValue::Bytes(hi)) => {
                        self.query.add_range_var(position, lo, hi)?
                    }
                    _ => {
                        return Err(Error::Contract(format!(
                            "variable-length dimension '{}' resolved to non-string bounds",
                            dim.name
                        ))
                        .into())
                    }
                }
            } else {
                self.query.add_range(position, &low, &high)?;
            }
        }
        Ok(true)
    }

    /// Size every field's buffers from the engine's estimates and register
    /// them with the query.
    fn init_query_buffers(&mut self) -> Result<()> {
        let estimates = self
            .fields
            .iter()
            .map(|f| self.query.estimate(&f.name, f.var_len, f.nullable))
            .collect::<arrayscan_io::Result<Vec<_>>>()?;
        self.upper_bound = estimates.first().map_or(0, ResultEstimate::cells);

        for (field, estimate) in self.fields.iter().zip(&estimates) {
            let buffers = self.manager.allocate(field, estimate)?;
            self.query.set_buffer(&field.name, buffers.set.layout())?;
            self.buffers.push(buffers);
        }
        self.manager.record(&self.buffers);
        Ok(())
    }

    /// Move to the next row. Returns `false` once the scan is exhausted, at
    /// which point the cursor has closed itself.
    pub fn advance_next_position(&mut self) -> Result<bool> {
        let start = Instant::now();
        let advanced = self.advance();
        self.timings.record("advance_next_position", start.elapsed());
        advanced
    }

    fn advance(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        if self.rows_visited >= self.upper_bound {
            self.close();
            return Ok(false);
        }

        if self.position >= self.batch.rows() {
            if self.status == QueryStatus::Completed {
                self.close();
                return Ok(false);
            }
            self.next_batch()?;
        }

        self.position += 1;
        self.rows_visited += 1;
        if self.batch.rows() == 0 {
            self.close();
            return Ok(false);
        }
        Ok(true)
    }

    fn next_batch(&mut self) -> Result<()> {
        loop {
            let status = self
                .timings
                .time("submit", || self.query.submit(&mut self.buffers))?;
            self.status = status;
            let elements = self.query.result_buffer_elements()?;
            let rows = self.driving_rows(&elements)?;

            if rows == 0 && status == QueryStatus::Incomplete {
                let start = Instant::now();
                let grown = self.grow_buffers();
                self.timings.record("grow_buffers", start.elapsed());
                grown?;
                continue;
            }
            if rows > 0 {
                self.account_bytes(&elements);
                self.position = 0;
                self.decode(&elements)?;
            } else {
                self.batch = Batch::default();
            }
            return Ok(());
        }
    }

    /// Rows returned by the last submit, counted on the first field.
    fn driving_rows(&self, elements: &[(String, ResultElements)]) -> Result<u64> {
        let Some(field) = self.fields.first() else {
            return Ok(0);
        };
        let (_, el) = elements
            .iter()
            .find(|(name, _)| *name == field.name)
            .ok_or_else(|| StorageError::UnknownField(field.name.clone()))?;
        Ok(if field.var_len { el.offsets } else { el.values })
    }

    fn grow_buffers(&mut self) -> Result<()> {
        self.manager.grow(&mut self.buffers)?;
        self.query.reset_buffers();
        for fb in &self.buffers {
            self.query.set_buffer(&fb.name, fb.set.layout())?;
        }
        tracing::debug!(
            scan_id = %self.scan_id,
            bytes = footprint(&self.buffers),
            "buffers doubled"
        );
        Ok(())
    }

    fn account_bytes(&mut self, elements: &[(String, ResultElements)]) {
        for (name, el) in elements {
            let Some(fb) = self.buffers.iter().find(|b| &b.name == name) else {
                continue;
            };
            if fb.set.offsets.is_some() {
                self.completed_bytes += el.offsets * OFFSET_WIDTH as u64;
            }
            self.completed_bytes += el.values * fb.set.values.element_width() as u64;
        }
    }

    fn decode(&mut self, elements: &[(String, ResultElements)]) -> Result<()> {
        let columns = self.timings.time("decode", || {
            self.fields
                .iter()
                .zip(&self.buffers)
                .map(|(field, fb)| {
                    let el = elements
                        .iter()
                        .find(|(name, _)| *name == field.name)
                        .map(|(_, el)| *el)
                        .unwrap_or_default();
                    DecodedColumn::from_buffers(field, &fb.set, el)
                })
                .collect::<Result<Vec<_>>>()
        })?;
        self.batch = Batch::new(columns);
        Ok(())
    }

    fn current(&self, field: usize) -> Result<(&DecodedColumn, usize)> {
        if self.closed || self.position == 0 {
            return Err(ScanError::NoCurrentRow);
        }
        Ok((self.batch.column(field)?, self.position - 1))
    }

    pub fn get_boolean(&self, field: usize) -> Result<bool> {
        let (col, pos) = self.current(field)?;
        col.get_boolean(pos)
    }

    /// Integers widened, REAL as its bit pattern, datetimes as days or
    /// milliseconds since the epoch.
    pub fn get_long(&self, field: usize) -> Result<i64> {
        let (col, pos) = self.current(field)?;
        col.get_long(pos)
    }

    pub fn get_double(&self, field: usize) -> Result<f64> {
        let (col, pos) = self.current(field)?;
        col.get_double(pos)
    }

    pub fn get_slice(&self, field: usize) -> Result<&[u8]> {
        let (col, pos) = self.current(field)?;
        col.slice(pos)
    }

    pub fn is_null(&self, field: usize) -> Result<bool> {
        let (col, pos) = self.current(field)?;
        Ok(col.is_null(pos))
    }

    pub fn get_type(&self, field: usize) -> Result<RelationalType> {
        self.fields
            .get(field)
            .map(|f| f.column_type)
            .ok_or(ScanError::FieldOutOfRange(field))
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn scan_id(&self) -> &ScanId {
        &self.scan_id
    }

    pub fn status(&self) -> QueryStatus {
        self.status
    }

    /// Bytes the engine has written into the buffers so far.
    pub fn completed_bytes(&self) -> u64 {
        self.completed_bytes
    }

    /// Time since construction, frozen at close.
    pub fn read_time_nanos(&self) -> u64 {
        let end = self.ended.unwrap_or_else(Instant::now);
        u64::try_from(end.duration_since(self.started).as_nanos()).unwrap_or(u64::MAX)
    }

    /// Bytes currently held in native buffers.
    pub fn system_memory_usage(&self) -> u64 {
        let (largest, count) = buffer_stats(&self.buffers);
        tracing::debug!(largest, count, "largest single buffer and total buffer count");
        footprint(&self.buffers)
    }

    pub fn peak_memory_usage(&self) -> u64 {
        self.manager.tracker().peak()
    }

    /// Release everything. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        let start = Instant::now();
        self.closed = true;
        self.ended = Some(Instant::now());

        self.batch = Batch::default();
        self.buffers.clear();
        self.manager.record(&self.buffers);
        let engine_stats = if self.timings.is_enabled() {
            self.query.dump_stats()
        } else {
            None
        };
        if let Err(e) = self.query.close() {
            tracing::warn!(scan_id = %self.scan_id, error = %e, "failed to close query");
        }
        self.timings.record("close", start.elapsed());

        if let Some(report) = self.timings.report(self.started.elapsed()) {
            report.dump(&self.stats_dir, self.scan_id.as_str(), engine_stats.as_deref());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<Q: ArrayQuery> Drop for RecordCursor<Q> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrayscan_core::schema::{AttributeInfo, Datatype, DimensionInfo};
    use arrayscan_io::MemoryArray;
    use arrayscan_mem::FixedMemory;
    use std::sync::{Arc, Mutex};

    fn array(n: i64, tile: usize) -> MemoryArray {
        (0..n)
            .fold(
                MemoryArray::builder()
                    .dimension(DimensionInfo::new("row", Datatype::Int64))
                    .attribute(AttributeInfo::new("v", Datatype::Int32))
                    .tile_extent(tile),
                |b, i| {
                    b.cell(
                        vec![NativeValue::Int64(i)],
                        vec![Some(NativeValue::Int32(i as i32 * 2))],
                    )
                },
            )
            .build()
            .unwrap()
    }

    fn columns() -> Vec<ColumnHandle> {
        vec![ColumnHandle::attribute("v", RelationalType::Integer)]
    }

    #[test]
    fn reads_every_row_then_closes() {
        let arr = array(4, 1);
        let mut cursor = RecordCursor::new(
            arr.open_query(),
            &columns(),
            &TupleDomain::all(),
            &ScanConfig::default(),
        )
        .unwrap();
        let mut seen = Vec::new();
        while cursor.advance_next_position().unwrap() {
            seen.push(cursor.get_long(0).unwrap());
        }
        assert_eq!(seen, [0, 2, 4, 6]);
        assert!(cursor.is_closed());
        assert_eq!(cursor.completed_bytes(), 16);
        assert_eq!(arr.closed_queries(), 1);
        assert!(matches!(cursor.get_long(0), Err(ScanError::NoCurrentRow)));
    }

    #[test]
    fn accessors_need_a_current_row() {
        let arr = array(2, 1);
        let mut cursor = RecordCursor::new(
            arr.open_query(),
            &columns(),
            &TupleDomain::all(),
            &ScanConfig::default(),
        )
        .unwrap();
        assert!(matches!(cursor.get_long(0), Err(ScanError::NoCurrentRow)));
        assert!(cursor.advance_next_position().unwrap());
        assert!(matches!(cursor.get_long(3), Err(ScanError::FieldOutOfRange(3))));
        assert_eq!(cursor.get_type(0).unwrap(), RelationalType::Integer);
    }

    #[test]
    fn failed_initialization_closes_the_query() {
        let arr = array(2, 1);
        let bad = vec![ColumnHandle::attribute("missing", RelationalType::Integer)];
        let err = RecordCursor::new(arr.open_query(), &bad, &TupleDomain::all(), &ScanConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ScanError::Contract(Error::Schema(_))));
        assert_eq!(arr.closed_queries(), 1);
    }

    #[test]
    fn refused_growth_cannot_complete() {
        let arr = array(8, 4);
        let config = ScanConfig {
            read_buffer_size: 8,
            ..ScanConfig::default()
        };
        let mut cursor = RecordCursor::new(arr.open_query(), &columns(), &TupleDomain::all(), &config)
            .unwrap()
            .with_memory_probe(Box::new(FixedMemory(0)));
        assert!(matches!(
            cursor.advance_next_position(),
            Err(ScanError::CannotComplete(_))
        ));
        cursor.close();
        cursor.close();
        assert_eq!(arr.closed_queries(), 1);
    }

    #[test]
    fn empty_array_yields_nothing() {
        let arr = array(0, 1);
        let mut cursor = RecordCursor::new(
            arr.open_query(),
            &[],
            &TupleDomain::all(),
            &ScanConfig::default(),
        )
        .unwrap();
        assert_eq!(cursor.fields().len(), 1);
        assert!(!cursor.advance_next_position().unwrap());
        assert_eq!(cursor.system_memory_usage(), 0);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn caller_scan_id_tags_range_registration() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();

        let arr = array(3, 1);
        tracing::subscriber::with_default(subscriber, || {
            let cursor = RecordCursor::new_with_scan_id(
                arr.open_query(),
                &columns(),
                &TupleDomain::all(),
                &ScanConfig::default(),
                ScanId::new("q-7"),
            )
            .unwrap();
            assert_eq!(cursor.scan_id().as_str(), "q-7");
        });

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let ranges: Vec<&str> = text.lines().filter(|l| l.contains("setting range")).collect();
        assert_eq!(ranges.len(), 1);
        assert!(ranges[0].contains("scan_id=q-7"), "{}", ranges[0]);
    }

    #[test]
    fn unsatisfiable_predicate_reads_nothing() {
        use arrayscan_core::predicate::{ColumnDomain, Marker, ValueRange};
        use arrayscan_core::types::Value;

        let arr = array(10, 2);
        let domain = TupleDomain::all().with(
            "row",
            ColumnDomain::ranges(
                RelationalType::BigInt,
                vec![ValueRange::new(
                    Marker::above(Value::Long(4)),
                    Marker::below(Value::Long(5)),
                )],
            ),
        );
        let mut cursor =
            RecordCursor::new(arr.open_query(), &columns(), &domain, &ScanConfig::default())
                .unwrap();
        assert_eq!(cursor.system_memory_usage(), 0);
        assert!(!cursor.advance_next_position().unwrap());
        assert_eq!(arr.closed_queries(), 1);
    }
}

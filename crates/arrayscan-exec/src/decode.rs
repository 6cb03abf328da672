//! Row Decoder: the current batch, copied out of the native buffers.
//!
//! Decoding dispatches on the field's native datatype, never on the
//! relational type the engine asked for.

use chrono::{Datelike, Days, Months, NaiveDate};

use arrayscan_core::error::Error;
use arrayscan_core::field::Field;
use arrayscan_core::schema::{Datatype, TimeUnit};
use arrayscan_core::types::{encode_real, NativeValue};
use arrayscan_io::{ResultElements, StorageError};
use arrayscan_mem::buffer::{BufferSet, OFFSET_WIDTH};

use crate::error::{Result, ScanError};

/// One field's slice of the current batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedColumn {
    pub datatype: Datatype,
    pub is_dimension: bool,
    pub nullable: bool,
    rows: usize,
    values: Vec<u8>,
    offsets: Option<Vec<u64>>,
    validity: Option<Vec<u8>>,
}

impl DecodedColumn {
    /// Copy the populated prefix of `set` as reported by `elements`.
    pub fn from_buffers(field: &Field, set: &BufferSet, elements: ResultElements) -> Result<Self> {
        let width = field.datatype.native_size();
        let rows = usize::try_from(if field.var_len {
            elements.offsets
        } else {
            elements.values
        })
        .map_err(|_| overrun(&field.name, "values"))?;
        let value_bytes = if field.var_len {
            elements.values as usize
        } else {
            rows * width
        };

        let values = set
            .values
            .as_bytes()
            .get(..value_bytes)
            .ok_or_else(|| overrun(&field.name, "values"))?
            .to_vec();

        let offsets = match &set.offsets {
            Some(buf) if field.var_len => Some(
                buf.as_bytes()
                    .get(..rows * OFFSET_WIDTH)
                    .ok_or_else(|| overrun(&field.name, "offsets"))?
                    .chunks_exact(OFFSET_WIDTH)
                    .map(|c| {
                        let mut le = [0u8; OFFSET_WIDTH];
                        le.copy_from_slice(c);
                        u64::from_le_bytes(le)
                    })
                    .collect(),
            ),
            _ => None,
        };

        let validity = match &set.validity {
            Some(buf) if field.nullable => Some(
                buf.as_bytes()
                    .get(..rows)
                    .ok_or_else(|| overrun(&field.name, "validity"))?
                    .to_vec(),
            ),
            _ => None,
        };

        Ok(Self {
            datatype: field.datatype,
            is_dimension: field.is_dimension(),
            nullable: field.nullable,
            rows,
            values,
            offsets,
            validity,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Byte span of `pos`. Variable-length spans run from `offsets[pos]` (zero
    /// for the first row) to the next offset, or to the end of the values for
    /// the last row.
    pub fn slice(&self, pos: usize) -> Result<&[u8]> {
        if pos >= self.rows {
            return Err(ScanError::NoCurrentRow);
        }
        let (start, end) = match &self.offsets {
            Some(offsets) => {
                let start = if pos == 0 { 0 } else { offsets[pos] as usize };
                let end = match offsets.get(pos + 1) {
                    Some(next) => *next as usize,
                    None => self.values.len(),
                };
                (start, end)
            }
            None => {
                let width = self.datatype.native_size();
                (pos * width, (pos + 1) * width)
            }
        };
        self.values.get(start..end).ok_or_else(|| {
            ScanError::Storage(StorageError::Backend(format!(
                "offsets {start}..{end} outside {} value bytes",
                self.values.len()
            )))
        })
    }

    fn native(&self, pos: usize) -> Result<NativeValue> {
        Ok(NativeValue::decode(self.datatype, self.slice(pos)?)?)
    }

    pub fn get_long(&self, pos: usize) -> Result<i64> {
        use Datatype as D;
        match self.datatype {
            D::Bool
            | D::Int8
            | D::UInt8
            | D::Int16
            | D::UInt16
            | D::Int32
            | D::UInt32
            | D::Int64
            | D::UInt64 => Ok(self.native(pos)?.as_i64()?),
            D::Float32 => match self.native(pos)? {
                NativeValue::Float32(v) => Ok(encode_real(v)),
                _ => Err(unsupported(self.datatype, "get_long")),
            },
            D::DateTime(unit) => {
                let raw = self.native(pos)?.as_i64()?;
                Ok(datetime_to_relational(unit, raw)?)
            }
            other => Err(unsupported(other, "get_long")),
        }
    }

    pub fn get_double(&self, pos: usize) -> Result<f64> {
        if !self.datatype.is_float() {
            return Err(unsupported(self.datatype, "get_double"));
        }
        Ok(self.native(pos)?.as_f64()?)
    }

    /// Dimensions carry coordinates, never flags; they answer `false`.
    pub fn get_boolean(&self, pos: usize) -> Result<bool> {
        if self.is_dimension {
            return Ok(false);
        }
        if self.datatype.is_float() || self.datatype.is_textual() {
            return Err(unsupported(self.datatype, "get_boolean"));
        }
        Ok(self.native(pos)?.as_i64()? != 0)
    }

    pub fn is_null(&self, pos: usize) -> bool {
        if !self.nullable {
            return false;
        }
        match self.validity.as_ref().map(|v| v.get(pos)) {
            Some(Some(byte)) => *byte == 0,
            _ => {
                tracing::warn!(pos, "validity lookup failed; reporting value as not null");
                false
            }
        }
    }
}

fn overrun(name: &str, buffer: &str) -> ScanError {
    ScanError::Storage(StorageError::Backend(format!(
        "result elements of '{name}' exceed its {buffer} buffer"
    )))
}

fn unsupported(datatype: Datatype, op: &'static str) -> ScanError {
    tracing::error!(?datatype, op, "unsupported decode");
    ScanError::Contract(Error::UnsupportedDatatype(datatype, op))
}

/// How a stored datetime count relates to its relational value.
enum Scale {
    /// Stored counts per relational unit.
    Finer(i64),
    /// Relational units per stored count.
    Coarser(i64),
    /// Calendar months per stored count; relational values are days.
    Months(i64),
}

fn scale(unit: TimeUnit) -> Scale {
    match unit {
        TimeUnit::Attosecond => Scale::Finer(1_000_000_000_000_000),
        TimeUnit::Femtosecond => Scale::Finer(1_000_000_000_000),
        TimeUnit::Picosecond => Scale::Finer(1_000_000_000),
        TimeUnit::Nanosecond => Scale::Finer(1_000_000),
        TimeUnit::Microsecond => Scale::Finer(1_000),
        TimeUnit::Millisecond | TimeUnit::Day => Scale::Coarser(1),
        TimeUnit::Second => Scale::Coarser(1_000),
        TimeUnit::Minute => Scale::Coarser(60_000),
        TimeUnit::Hour => Scale::Coarser(3_600_000),
        TimeUnit::Week => Scale::Coarser(7),
        TimeUnit::Month => Scale::Months(1),
        TimeUnit::Year => Scale::Months(12),
    }
}

/// Convert a stored datetime count into the relational representation:
/// days since the epoch for day-based units, milliseconds otherwise.
/// Sub-millisecond counts round toward negative infinity.
pub fn datetime_to_relational(unit: TimeUnit, raw: i64) -> arrayscan_core::error::Result<i64> {
    let out_of_range =
        || Error::Contract(format!("{raw} {unit:?} is outside the representable range"));
    match scale(unit) {
        Scale::Finer(n) => Ok(raw.div_euclid(n)),
        Scale::Coarser(n) => raw.checked_mul(n).ok_or_else(out_of_range),
        Scale::Months(n) => raw
            .checked_mul(n)
            .and_then(days_after_months)
            .ok_or_else(out_of_range),
    }
}

/// Which way a relational datetime bound moves when it falls between two
/// stored counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// First count whose relational value is at or after the bound.
    Up,
    /// Last count whose relational value is at or before the bound.
    Down,
}

/// Inverse of [`datetime_to_relational`] for one end of a range.
pub fn datetime_from_relational(
    unit: TimeUnit,
    value: i64,
    rounding: Rounding,
) -> arrayscan_core::error::Result<i64> {
    let out_of_range =
        || Error::Contract(format!("{value} is outside the range of {unit:?} counts"));
    let raw = match scale(unit) {
        Scale::Finer(n) => {
            let first = i128::from(value) * i128::from(n);
            match rounding {
                Rounding::Up => first,
                Rounding::Down => first + i128::from(n) - 1,
            }
        }
        Scale::Coarser(n) => {
            let whole = value.div_euclid(n);
            match rounding {
                Rounding::Up if value.rem_euclid(n) != 0 => i128::from(whole) + 1,
                _ => i128::from(whole),
            }
        }
        Scale::Months(n) => {
            let (months, first_of_month) = months_since_epoch(value).ok_or_else(out_of_range)?;
            let whole = months.div_euclid(n);
            let exact = first_of_month && months.rem_euclid(n) == 0;
            match rounding {
                Rounding::Up if !exact => i128::from(whole) + 1,
                _ => i128::from(whole),
            }
        }
    };
    i64::try_from(raw).map_err(|_| out_of_range())
}

/// Whole calendar months from the epoch to the date `days` after it, and
/// whether that date is the first of its month.
fn months_since_epoch(days: i64) -> Option<(i64, bool)> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    let step = Days::new(days.unsigned_abs());
    let date = if days >= 0 {
        epoch.checked_add_days(step)?
    } else {
        epoch.checked_sub_days(step)?
    };
    let months = i64::from(date.year() - 1970) * 12 + i64::from(date.month0());
    Some((months, date.day() == 1))
}

/// Days between the epoch and the epoch plus `months` calendar months.
fn days_after_months(months: i64) -> Option<i64> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    let step = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    let date = if months >= 0 {
        epoch.checked_add_months(step)?
    } else {
        epoch.checked_sub_months(step)?
    };
    Some(date.signed_duration_since(epoch).num_days())
}

/// All decoded columns of the current batch, by field ordinal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    columns: Vec<DecodedColumn>,
}

impl Batch {
    pub fn new(columns: Vec<DecodedColumn>) -> Self {
        Self { columns }
    }

    /// Rows in the batch, as counted on the driving (first) field.
    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, DecodedColumn::rows)
    }

    pub fn column(&self, ordinal: usize) -> Result<&DecodedColumn> {
        self.columns
            .get(ordinal)
            .ok_or(ScanError::FieldOutOfRange(ordinal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrayscan_core::field::FieldKind;
    use arrayscan_core::schema::RelationalType;
    use arrayscan_mem::buffer::BufferLayout;
    use proptest::prelude::*;

    fn field(datatype: Datatype, var_len: bool, nullable: bool) -> Field {
        Field {
            ordinal: 0,
            name: "f".into(),
            datatype,
            var_len,
            nullable,
            column_type: datatype.default_relational_type(),
            kind: FieldKind::Attribute,
        }
    }

    fn fixed_column(datatype: Datatype, bytes: &[u8]) -> DecodedColumn {
        let f = field(datatype, false, false);
        let n = bytes.len() / datatype.native_size();
        let mut set = BufferSet::allocate(
            datatype,
            BufferLayout {
                offsets: None,
                values: n,
                validity: None,
            },
        )
        .unwrap();
        set.values.as_bytes_mut().copy_from_slice(bytes);
        DecodedColumn::from_buffers(&f, &set, ResultElements { offsets: 0, values: n as u64 })
            .unwrap()
    }

    #[test]
    fn var_len_spans_follow_offsets() {
        let f = field(Datatype::StringUtf8, true, false);
        let mut set = BufferSet::allocate(
            Datatype::StringUtf8,
            BufferLayout {
                offsets: Some(4),
                values: 16,
                validity: None,
            },
        )
        .unwrap();
        for (i, off) in [0u64, 3, 3, 7].iter().enumerate() {
            set.offsets.as_mut().unwrap().as_bytes_mut()[i * 8..i * 8 + 8]
                .copy_from_slice(&off.to_le_bytes());
        }
        set.values.as_bytes_mut()[..9].copy_from_slice(b"fooXYZbaz");
        let col =
            DecodedColumn::from_buffers(&f, &set, ResultElements { offsets: 4, values: 9 }).unwrap();

        assert_eq!(col.rows(), 4);
        assert_eq!(col.slice(0).unwrap(), b"foo");
        assert_eq!(col.slice(1).unwrap(), b"");
        assert_eq!(col.slice(2).unwrap(), b"XYZb");
        assert_eq!(col.slice(3).unwrap(), b"az");
        assert!(matches!(col.slice(4), Err(ScanError::NoCurrentRow)));
    }

    #[test]
    fn integers_widen_and_reals_keep_bits() {
        let col = fixed_column(Datatype::Int16, &(-5i16).to_le_bytes());
        assert_eq!(col.get_long(0).unwrap(), -5);

        let col = fixed_column(Datatype::Float32, &(-0.1f32).to_le_bytes());
        let packed = col.get_long(0).unwrap();
        assert_eq!(packed, encode_real(-0.1));
        assert!(col.get_double(0).unwrap() < 0.0);

        let col = fixed_column(Datatype::Float64, &2.5f64.to_le_bytes());
        assert_eq!(col.get_double(0).unwrap(), 2.5);
        assert!(col.get_long(0).is_err());
    }

    #[test]
    fn booleans_and_dimensions() {
        let mut col = fixed_column(Datatype::Bool, &[1, 0]);
        assert!(col.get_boolean(0).unwrap());
        assert!(!col.get_boolean(1).unwrap());
        col.is_dimension = true;
        assert!(!col.get_boolean(0).unwrap());
    }

    #[test]
    fn null_test_reads_validity() {
        let f = field(Datatype::Int32, false, true);
        let mut set = BufferSet::allocate(
            Datatype::Int32,
            BufferLayout {
                offsets: None,
                values: 2,
                validity: Some(2),
            },
        )
        .unwrap();
        set.validity.as_mut().unwrap().as_bytes_mut()[0] = 1;
        let col =
            DecodedColumn::from_buffers(&f, &set, ResultElements { offsets: 0, values: 2 }).unwrap();
        assert!(!col.is_null(0));
        assert!(col.is_null(1));
        // Lookup past the validity map degrades to "not null".
        assert!(!col.is_null(9));

        let plain = fixed_column(Datatype::Int32, &[0; 4]);
        assert!(!plain.is_null(0));
    }

    #[test]
    fn datetime_units() {
        assert_eq!(datetime_to_relational(TimeUnit::Second, 2).unwrap(), 2_000);
        assert_eq!(datetime_to_relational(TimeUnit::Nanosecond, 5_000_000).unwrap(), 5);
        assert_eq!(datetime_to_relational(TimeUnit::Hour, 1).unwrap(), 3_600_000);
        assert_eq!(datetime_to_relational(TimeUnit::Day, 19_000).unwrap(), 19_000);
        assert_eq!(datetime_to_relational(TimeUnit::Week, 2).unwrap(), 14);
        // Jan + Feb 1970.
        assert_eq!(datetime_to_relational(TimeUnit::Month, 2).unwrap(), 59);
        assert_eq!(datetime_to_relational(TimeUnit::Month, -1).unwrap(), -31);
        // 1970 and 1971 are 365 days, 1972 is a leap year.
        assert_eq!(datetime_to_relational(TimeUnit::Year, 3).unwrap(), 1_096);
        assert!(datetime_to_relational(TimeUnit::Second, i64::MAX).is_err());
        assert!(datetime_to_relational(TimeUnit::Year, i64::MAX / 2).is_err());
        // One nanosecond before the epoch is still in the millisecond before it.
        assert_eq!(datetime_to_relational(TimeUnit::Nanosecond, -1).unwrap(), -1);

        let col = fixed_column(Datatype::DateTime(TimeUnit::Minute), &3i64.to_le_bytes());
        assert_eq!(col.get_long(0).unwrap(), 180_000);
    }

    #[test]
    fn batch_rows_follow_first_column() {
        let batch = Batch::new(vec![
            fixed_column(Datatype::Int64, &[0; 24]),
            fixed_column(Datatype::Int8, &[0; 3]),
        ]);
        assert_eq!(batch.rows(), 3);
        assert!(batch.column(1).is_ok());
        assert!(matches!(batch.column(2), Err(ScanError::FieldOutOfRange(2))));
        assert_eq!(Batch::default().rows(), 0);
    }

    #[test]
    fn relational_bounds_map_back_to_counts() {
        use Rounding::{Down, Up};
        // Coarser units round inward.
        assert_eq!(datetime_from_relational(TimeUnit::Second, 5_000, Up).unwrap(), 5);
        assert_eq!(datetime_from_relational(TimeUnit::Second, 5_000, Down).unwrap(), 5);
        assert_eq!(datetime_from_relational(TimeUnit::Second, 5_500, Up).unwrap(), 6);
        assert_eq!(datetime_from_relational(TimeUnit::Second, 5_500, Down).unwrap(), 5);
        assert_eq!(datetime_from_relational(TimeUnit::Second, -1, Down).unwrap(), -1);
        assert_eq!(datetime_from_relational(TimeUnit::Week, 14, Up).unwrap(), 2);
        assert_eq!(datetime_from_relational(TimeUnit::Day, -3, Down).unwrap(), -3);
        // Finer units cover every count inside the millisecond.
        assert_eq!(datetime_from_relational(TimeUnit::Microsecond, 7, Up).unwrap(), 7_000);
        assert_eq!(datetime_from_relational(TimeUnit::Microsecond, 7, Down).unwrap(), 7_999);
        assert!(datetime_from_relational(TimeUnit::Attosecond, i64::MAX, Up).is_err());
        // Calendar units: Feb 1 1970 is day 31, Jan 1 1971 is day 365.
        assert_eq!(datetime_from_relational(TimeUnit::Month, 31, Up).unwrap(), 1);
        assert_eq!(datetime_from_relational(TimeUnit::Month, 32, Up).unwrap(), 2);
        assert_eq!(datetime_from_relational(TimeUnit::Month, 32, Down).unwrap(), 1);
        assert_eq!(datetime_from_relational(TimeUnit::Month, -1, Down).unwrap(), -1);
        assert_eq!(datetime_from_relational(TimeUnit::Year, 365, Up).unwrap(), 1);
        assert_eq!(datetime_from_relational(TimeUnit::Year, 31, Up).unwrap(), 1);
        assert_eq!(datetime_from_relational(TimeUnit::Year, 31, Down).unwrap(), 0);
    }

    proptest! {
        #[test]
        fn stored_counts_survive_the_relational_trip(raw in -100_000i64..100_000) {
            for unit in [
                TimeUnit::Nanosecond,
                TimeUnit::Millisecond,
                TimeUnit::Second,
                TimeUnit::Hour,
                TimeUnit::Week,
                TimeUnit::Month,
                TimeUnit::Year,
            ] {
                let rel = datetime_to_relational(unit, raw).unwrap();
                let lo = datetime_from_relational(unit, rel, Rounding::Up).unwrap();
                let hi = datetime_from_relational(unit, rel, Rounding::Down).unwrap();
                prop_assert!(lo <= raw && raw <= hi, "{:?}: {} not in [{}, {}]", unit, raw, lo, hi);
            }
        }
    }
}

//! Range Resolver: one inclusive native `[low, high]` per dimension.
//!
//! A column domain is a set of disjoint sub-ranges. The storage engine gets a
//! single bounding range: closed ends fold through min/max in the dimension's
//! native type, and any open end widens that side to the non-empty domain.
//! Datetime markers arrive in the relational unit (days or milliseconds) and
//! are mapped back onto the dimension's stored counts.

use std::cmp::Ordering;

use arrayscan_core::error::Error;
use arrayscan_core::predicate::{Bound, ColumnDomain, Domain, Marker, ValueRange};
use arrayscan_core::schema::{Datatype, DimensionInfo, RelationalType};
use arrayscan_core::types::NativeValue;

use crate::decode::{datetime_from_relational, Rounding};
use crate::error::Result;

/// Inclusive native bounds of one sub-range. `None` is an unbounded end.
///
/// The bounds can cross (`low > high`) when no stored value satisfies the
/// range, e.g. `x > 5 AND x < 6` on an integer dimension.
pub fn bounds_for_range(
    dim: &DimensionInfo,
    column_type: RelationalType,
    range: &ValueRange,
) -> Result<(Option<NativeValue>, Option<NativeValue>)> {
    if range.is_single_value() {
        return Ok((
            marker_value(dim, column_type, &range.low, Rounding::Up)?,
            marker_value(dim, column_type, &range.low, Rounding::Down)?,
        ));
    }

    let low = match (&range.low.value, range.low.bound) {
        (None, _) => None,
        (Some(_), Bound::Exactly) => marker_value(dim, column_type, &range.low, Rounding::Up)?,
        (Some(_), Bound::Above) => marker_value(dim, column_type, &range.low, Rounding::Down)?
            .map(|v| v.next_up())
            .transpose()?,
        (Some(_), Bound::Below) => {
            return Err(Error::Contract(format!(
                "low marker of '{}' is below its value",
                dim.name
            ))
            .into())
        }
    };

    let high = match (&range.high.value, range.high.bound) {
        (None, _) => None,
        (Some(_), Bound::Exactly) => marker_value(dim, column_type, &range.high, Rounding::Down)?,
        (Some(_), Bound::Below) => marker_value(dim, column_type, &range.high, Rounding::Up)?
            .map(|v| v.next_down())
            .transpose()?,
        (Some(_), Bound::Above) => {
            return Err(Error::Contract(format!(
                "high marker of '{}' is above its value",
                dim.name
            ))
            .into())
        }
    };

    Ok((low, high))
}

fn marker_value(
    dim: &DimensionInfo,
    column_type: RelationalType,
    marker: &Marker,
    rounding: Rounding,
) -> Result<Option<NativeValue>> {
    let Some(value) = &marker.value else {
        return Ok(None);
    };
    let native = NativeValue::coerce(dim.datatype, column_type, value)?;
    Ok(Some(match (dim.datatype, native) {
        (Datatype::DateTime(unit), NativeValue::Int64(v)) => {
            NativeValue::Int64(datetime_from_relational(unit, v, rounding)?)
        }
        (_, native) => native,
    }))
}

/// Bounding range for `dim` under `domain`, or `None` when no stored value
/// can satisfy it.
///
/// An absent or unconstrained domain yields `non_empty`, the populated bounds
/// reported by the storage engine. Sub-ranges whose bounds cross are skipped.
pub fn bounds_for_dimension(
    dim: &DimensionInfo,
    domain: Option<&ColumnDomain>,
    non_empty: &(NativeValue, NativeValue),
) -> Result<Option<(NativeValue, NativeValue)>> {
    let Some(column) = domain else {
        return Ok(Some(non_empty.clone()));
    };
    let ranges = match &column.domain {
        Domain::All => return Ok(Some(non_empty.clone())),
        Domain::None => {
            return Err(Error::Contract(format!(
                "predicate on '{}' matches nothing but reached the scan",
                dim.name
            ))
            .into())
        }
        Domain::Ranges(ranges) if ranges.is_empty() => {
            return Err(Error::Contract(format!(
                "predicate on '{}' has no ranges",
                dim.name
            ))
            .into())
        }
        Domain::Ranges(ranges) => ranges,
    };

    let mut low: Option<NativeValue> = None;
    let mut high: Option<NativeValue> = None;
    let mut open_low = false;
    let mut open_high = false;
    let mut satisfiable = false;

    for range in ranges {
        let (lo, hi) = bounds_for_range(dim, column.column_type, range)?;
        if let (Some(l), Some(h)) = (&lo, &hi) {
            if l.native_cmp(h)? == Ordering::Greater {
                continue;
            }
        }
        satisfiable = true;
        match lo {
            Some(v) => low = Some(fold(low, v, NativeValue::min)?),
            None => open_low = true,
        }
        match hi {
            Some(v) => high = Some(fold(high, v, NativeValue::max)?),
            None => open_high = true,
        }
    }
    if !satisfiable {
        return Ok(None);
    }

    let low = match low {
        Some(v) if !open_low => v,
        _ => non_empty.0.clone(),
    };
    let high = match high {
        Some(v) if !open_high => v,
        _ => non_empty.1.clone(),
    };
    Ok(Some((low, high)))
}

fn fold(
    acc: Option<NativeValue>,
    v: NativeValue,
    pick: fn(NativeValue, NativeValue) -> arrayscan_core::error::Result<NativeValue>,
) -> Result<NativeValue> {
    match acc {
        Some(a) => Ok(pick(a, v)?),
        None => Ok(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrayscan_core::predicate::ColumnDomain;
    use arrayscan_core::schema::TimeUnit;
    use arrayscan_core::types::{encode_real, Value};
    use proptest::prelude::*;

    use crate::error::ScanError;

    fn int_dim() -> DimensionInfo {
        DimensionInfo::new("d", Datatype::Int64)
    }

    fn domain_0_100() -> (NativeValue, NativeValue) {
        (NativeValue::Int64(0), NativeValue::Int64(100))
    }

    fn ranges(rs: Vec<ValueRange>) -> ColumnDomain {
        ColumnDomain::ranges(RelationalType::BigInt, rs)
    }

    #[test]
    fn unconstrained_uses_non_empty_domain() {
        let dim = int_dim();
        assert_eq!(
            bounds_for_dimension(&dim, None, &domain_0_100()).unwrap(),
            Some(domain_0_100())
        );
        let all = ColumnDomain::new(RelationalType::BigInt, Domain::All);
        assert_eq!(
            bounds_for_dimension(&dim, Some(&all), &domain_0_100()).unwrap(),
            Some(domain_0_100())
        );
    }

    #[test]
    fn equality_collapses() {
        let cd = ranges(vec![ValueRange::single(Value::Long(7))]);
        assert_eq!(
            bounds_for_dimension(&int_dim(), Some(&cd), &domain_0_100()).unwrap(),
            Some((NativeValue::Int64(7), NativeValue::Int64(7)))
        );
    }

    #[test]
    fn exclusive_bounds_step_inward() {
        let cd = ranges(vec![ValueRange::new(
            Marker::above(Value::Long(10)),
            Marker::below(Value::Long(20)),
        )]);
        assert_eq!(
            bounds_for_dimension(&int_dim(), Some(&cd), &domain_0_100()).unwrap(),
            Some((NativeValue::Int64(11), NativeValue::Int64(19)))
        );
    }

    #[test]
    fn open_end_widens_union_to_domain() {
        let cd = ranges(vec![
            ValueRange::less_than(Value::Long(5)),
            ValueRange::new(Marker::exactly(Value::Long(40)), Marker::exactly(Value::Long(50))),
        ]);
        assert_eq!(
            bounds_for_dimension(&int_dim(), Some(&cd), &domain_0_100()).unwrap(),
            Some((NativeValue::Int64(0), NativeValue::Int64(50)))
        );
    }

    #[test]
    fn wrong_side_markers_are_contract_errors() {
        let dim = int_dim();
        let bad_low = ValueRange::new(Marker::below(Value::Long(1)), Marker::unbounded());
        let bad_high = ValueRange::new(Marker::unbounded(), Marker::above(Value::Long(1)));
        for r in [bad_low, bad_high] {
            assert!(matches!(
                bounds_for_range(&dim, RelationalType::BigInt, &r),
                Err(ScanError::Contract(Error::Contract(_)))
            ));
        }
        let none = ColumnDomain::new(RelationalType::BigInt, Domain::None);
        assert!(bounds_for_dimension(&dim, Some(&none), &domain_0_100()).is_err());
    }

    #[test]
    fn real_markers_decode_by_bit_pattern() {
        let dim = DimensionInfo::new("x", Datatype::Float32);
        let cd = ColumnDomain::ranges(
            RelationalType::Real,
            vec![ValueRange::single(Value::Long(encode_real(1.5)))],
        );
        let dom = (NativeValue::Float32(0.0), NativeValue::Float32(10.0));
        assert_eq!(
            bounds_for_dimension(&dim, Some(&cd), &dom).unwrap(),
            Some((NativeValue::Float32(1.5), NativeValue::Float32(1.5)))
        );
    }

    #[test]
    fn string_ranges_use_lexical_neighbours() {
        let dim = DimensionInfo::new("s", Datatype::StringAscii).var_len();
        let cd = ColumnDomain::ranges(
            RelationalType::Varchar,
            vec![ValueRange::new(
                Marker::above(Value::Slice(b"b".to_vec())),
                Marker::below(Value::Slice(b"d".to_vec())),
            )],
        );
        let dom = (
            NativeValue::Bytes(b"a".to_vec()),
            NativeValue::Bytes(b"z".to_vec()),
        );
        let (lo, hi) = bounds_for_dimension(&dim, Some(&cd), &dom).unwrap().unwrap();
        assert_eq!(lo, NativeValue::Bytes(b"b\0".to_vec()));
        assert_eq!(hi, NativeValue::Bytes(b"c\xff".to_vec()));
    }

    #[test]
    fn crossed_sub_ranges_are_skipped() {
        let gap = ValueRange::new(Marker::above(Value::Long(5)), Marker::below(Value::Long(6)));
        let cd = ranges(vec![gap.clone()]);
        assert_eq!(bounds_for_dimension(&int_dim(), Some(&cd), &domain_0_100()).unwrap(), None);

        let cd = ranges(vec![
            gap,
            ValueRange::new(Marker::exactly(Value::Long(30)), Marker::exactly(Value::Long(40))),
        ]);
        assert_eq!(
            bounds_for_dimension(&int_dim(), Some(&cd), &domain_0_100()).unwrap(),
            Some((NativeValue::Int64(30), NativeValue::Int64(40)))
        );
    }

    #[test]
    fn timestamp_markers_map_onto_stored_seconds() {
        let dim = DimensionInfo::new("ts", Datatype::DateTime(TimeUnit::Second));
        let dom = (NativeValue::Int64(0), NativeValue::Int64(100));
        let on_ts = |rs| ColumnDomain::ranges(RelationalType::Timestamp, rs);

        let eq = on_ts(vec![ValueRange::single(Value::Long(5_000))]);
        assert_eq!(
            bounds_for_dimension(&dim, Some(&eq), &dom).unwrap(),
            Some((NativeValue::Int64(5), NativeValue::Int64(5)))
        );

        // 5.5s falls between two stored seconds.
        let between = on_ts(vec![ValueRange::single(Value::Long(5_500))]);
        assert_eq!(bounds_for_dimension(&dim, Some(&between), &dom).unwrap(), None);

        let open = on_ts(vec![ValueRange::new(
            Marker::above(Value::Long(5_500)),
            Marker::below(Value::Long(9_000)),
        )]);
        assert_eq!(
            bounds_for_dimension(&dim, Some(&open), &dom).unwrap(),
            Some((NativeValue::Int64(6), NativeValue::Int64(8)))
        );
    }

    #[test]
    fn date_markers_map_onto_stored_months() {
        let dim = DimensionInfo::new("m", Datatype::DateTime(TimeUnit::Month));
        let dom = (NativeValue::Int64(0), NativeValue::Int64(24));
        // Days 31..=59 are February 1970 through the first of March.
        let cd = ColumnDomain::ranges(
            RelationalType::Date,
            vec![ValueRange::new(
                Marker::exactly(Value::Long(31)),
                Marker::exactly(Value::Long(59)),
            )],
        );
        assert_eq!(
            bounds_for_dimension(&dim, Some(&cd), &dom).unwrap(),
            Some((NativeValue::Int64(1), NativeValue::Int64(2)))
        );
    }

    proptest! {
        #[test]
        fn union_is_min_low_max_high(mut points in prop::collection::vec(-1000i64..1000, 2..12)) {
            points.sort_unstable();
            points.dedup();
            prop_assume!(points.len() >= 2);
            let rs: Vec<ValueRange> = points
                .chunks_exact(2)
                .map(|p| ValueRange::new(
                    Marker::exactly(Value::Long(p[0])),
                    Marker::exactly(Value::Long(p[1])),
                ))
                .collect();
            let last = rs.len() * 2 - 1;
            let dom = (NativeValue::Int64(i64::MIN), NativeValue::Int64(i64::MAX));
            let (lo, hi) = bounds_for_dimension(&int_dim(), Some(&ranges(rs)), &dom)
                .unwrap()
                .unwrap();
            prop_assert_eq!(lo, NativeValue::Int64(points[0]));
            prop_assert_eq!(hi, NativeValue::Int64(points[last]));
        }
    }
}

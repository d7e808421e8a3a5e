//! Groups a stream of `(timestamp, field, value)` records into rows, one per
//! distinct timestamp, and turns them into aligned columns.
//!
//! Rows are kept in a `BTreeMap` keyed by time, so records may arrive in any
//! order; `finalize` emits them ascending. Within one row a repeated field
//! overwrites the earlier value. Cells a row never received are filled only
//! at `finalize`.

use crate::datatypes::DatatypeMapper;
use crate::error::{GliderError, Result};
use crate::record::{Record, Value};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    ops::Range,
};

#[derive(Debug, Clone, Copy)]
struct TimeKey(f64);

impl PartialEq for TimeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimeKey {}

impl PartialOrd for TimeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug)]
pub struct RecordAccumulator {
    rows: BTreeMap<TimeKey, HashMap<String, Value>>,
    fill: f64,
}

impl RecordAccumulator {
    pub fn new(fill: f64) -> RecordAccumulator {
        RecordAccumulator { rows: BTreeMap::new(), fill }
    }

    pub fn insert(&mut self, record: Record) -> Result<()> {
        if !record.timestamp.is_finite() {
            return Err(GliderError::data(format!(
                "record `{}` has non-finite timestamp {}",
                record.field, record.timestamp
            )));
        }
        // fold -0.0 onto 0.0 so both land in the same row
        let key = TimeKey(record.timestamp + 0.0);
        self.rows.entry(key).or_default().insert(record.field, record.value);
        Ok(())
    }

    /// Maps the record's field through `mapper` and stores it under the
    /// output name. Returns `false` when the field is unmapped and was dropped.
    pub fn insert_mapped(&mut self, mut record: Record, mapper: &DatatypeMapper) -> Result<bool> {
        match mapper.lookup(&record.field) {
            Some(datatype) => {
                record.field = datatype.name.clone();
                self.insert(record)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn finalize(self) -> Result<TimeSeries> {
        let n = self.rows.len();
        let fill = self.fill;
        let mut time = Vec::with_capacity(n);
        let mut columns: BTreeMap<String, Column> = BTreeMap::new();

        for (row, (key, values)) in self.rows.into_iter().enumerate() {
            time.push(key.0);
            for (field, value) in values {
                let is_text = matches!(value, Value::Text(_));
                let column = columns.entry(field.clone()).or_insert_with(|| {
                    if is_text {
                        Column::Text(vec![String::new(); n])
                    } else {
                        Column::Numeric(vec![fill; n])
                    }
                });
                match (column, value) {
                    (Column::Numeric(col), Value::Number(v)) => col[row] = v,
                    (Column::Text(col), Value::Text(s)) => col[row] = s,
                    (_, value) => {
                        return Err(GliderError::data(format!(
                            "field `{field}` mixes numeric and text values (saw `{value}` at {})",
                            key.0
                        )))
                    }
                }
            }
        }

        Ok(TimeSeries { time, columns, fill, interpolated: BTreeMap::new() })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slice(&self, range: Range<usize>) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(v[range].to_vec()),
            Column::Text(v) => Column::Text(v[range].to_vec()),
        }
    }
}

/// Finalized, column-aligned data: every column is as long as `time`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub time:         Vec<f64>,
    pub columns:      BTreeMap<String, Column>,
    pub fill:         f64,
    /// Rows of a column whose value was filled in rather than observed.
    pub interpolated: BTreeMap<String, Vec<bool>>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn numeric(&self, name: &str) -> Option<&[f64]> {
        match self.columns.get(name)? {
            Column::Numeric(v) => Some(v),
            Column::Text(_) => None,
        }
    }

    pub fn numeric_mut(&mut self, name: &str) -> Option<&mut Vec<f64>> {
        match self.columns.get_mut(name)? {
            Column::Numeric(v) => Some(v),
            Column::Text(_) => None,
        }
    }

    pub fn is_fill(&self, v: f64) -> bool {
        v.is_nan() || v == self.fill
    }

    pub fn is_interpolated(&self, name: &str, row: usize) -> bool {
        self.interpolated.get(name).and_then(|m| m.get(row)).copied().unwrap_or(false)
    }

    /// Last non-fill value of a numeric column.
    pub fn last_valid(&self, name: &str) -> Option<f64> {
        self.numeric(name)?.iter().rev().copied().find(|&v| !self.is_fill(v))
    }

    /// Rows `range` as a new series.
    pub fn slice(&self, range: Range<usize>) -> TimeSeries {
        TimeSeries {
            time:         self.time[range.clone()].to_vec(),
            columns:      self
                .columns
                .iter()
                .map(|(k, c)| (k.clone(), c.slice(range.clone())))
                .collect(),
            fill:         self.fill,
            interpolated: self
                .interpolated
                .iter()
                .map(|(k, mask)| (k.clone(), mask[range.clone()].to_vec()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Attributes, NcType};
    use crate::datatypes::Datatype;

    const FILL: f64 = -999.0;

    fn accumulate(records: Vec<Record>) -> TimeSeries {
        let mut acc = RecordAccumulator::new(FILL);
        for r in records {
            acc.insert(r).unwrap();
        }
        acc.finalize().unwrap()
    }

    #[test]
    fn columns_align_with_distinct_timestamps() {
        let ts = accumulate(vec![
            Record::new(10.0, "depth", 1.0),
            Record::new(10.0, "temperature", 20.5),
            Record::new(11.0, "depth", 2.0),
            Record::new(12.0, "lat", 27.5),
            Record::new(12.0, "depth", 3.0),
        ]);
        assert_eq!(ts.time, vec![10.0, 11.0, 12.0]);
        for col in ts.columns.values() {
            assert_eq!(col.len(), ts.len());
        }
        assert_eq!(ts.numeric("temperature").unwrap(), &[20.5, FILL, FILL]);
        assert_eq!(ts.numeric("lat").unwrap(), &[FILL, FILL, 27.5]);
    }

    #[test]
    fn last_write_wins_within_a_timestamp() {
        let ts = accumulate(vec![
            Record::new(5.0, "depth", 1.0),
            Record::new(5.0, "depth", 7.0),
        ]);
        assert_eq!(ts.len(), 1);
        assert_eq!(ts.numeric("depth").unwrap(), &[7.0]);
    }

    #[test]
    fn out_of_order_records_are_reordered() {
        let ts = accumulate(vec![
            Record::new(30.0, "depth", 3.0),
            Record::new(10.0, "depth", 1.0),
            Record::new(20.0, "depth", 2.0),
        ]);
        assert_eq!(ts.time, vec![10.0, 20.0, 30.0]);
        assert_eq!(ts.numeric("depth").unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn non_finite_timestamp_is_rejected() {
        let mut acc = RecordAccumulator::new(FILL);
        let err = acc.insert(Record::new(f64::NAN, "depth", 1.0)).unwrap_err();
        assert!(matches!(err, GliderError::DataConsistency(_)));
        assert!(acc.insert(Record::new(f64::INFINITY, "depth", 1.0)).is_err());
        assert!(acc.is_empty());
    }

    #[test]
    fn mixed_types_in_one_field_fail_at_finalize() {
        let mut acc = RecordAccumulator::new(FILL);
        acc.insert(Record::new(1.0, "name", 1.0)).unwrap();
        acc.insert(Record::new(2.0, "name", "bass")).unwrap();
        let err = acc.finalize().unwrap_err();
        assert!(matches!(err, GliderError::DataConsistency(_)));
    }

    #[test]
    fn text_columns_fill_with_empty_strings() {
        let ts = accumulate(vec![
            Record::new(1.0, "mission", "micro.mi"),
            Record::new(2.0, "depth", 4.0),
        ]);
        assert_eq!(
            ts.columns["mission"],
            Column::Text(vec!["micro.mi".to_string(), String::new()])
        );
    }

    #[test]
    fn unmapped_fields_are_dropped() {
        let depth = Datatype {
            name:        "depth".into(),
            nc_type:     NcType::Double,
            dimension:   "time".into(),
            attrs:       Attributes::new(),
            status_flag: None,
        };
        let mapper = DatatypeMapper::from_entries([("m_depth-m".to_string(), depth)]);
        let mut acc = RecordAccumulator::new(FILL);
        assert!(acc.insert_mapped(Record::new(1.0, "m_depth-m", 4.0), &mapper).unwrap());
        assert!(!acc.insert_mapped(Record::new(1.0, "m_roll-rad", 0.1), &mapper).unwrap());
        let ts = acc.finalize().unwrap();
        assert_eq!(ts.columns.keys().collect::<Vec<_>>(), vec!["depth"]);
    }

    #[test]
    fn slice_and_last_valid() {
        let ts = accumulate(vec![
            Record::new(1.0, "u", 0.2),
            Record::new(2.0, "depth", 1.0),
            Record::new(3.0, "depth", 2.0),
        ]);
        assert_eq!(ts.last_valid("u"), Some(0.2));
        assert_eq!(ts.last_valid("depth"), Some(2.0));
        let mut ts = ts;
        ts.interpolated.insert("u".into(), vec![false, true, true]);
        let tail = ts.slice(1..3);
        assert_eq!(tail.time, vec![2.0, 3.0]);
        assert!(tail.is_interpolated("u", 0));
        assert!(!tail.is_interpolated("depth", 0));
        assert_eq!(tail.last_valid("u"), None);
    }
}

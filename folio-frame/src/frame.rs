use crate::error::FrameError;
use chrono::{DateTime, NaiveDate, Utc};
use folio_calendar::{Frequency, MarketCalendar, eastern_date};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::collections::HashMap;

/// Column-oriented, date-indexed table of 64-bit floats.
///
/// Invariants, enforced at every construction and mutation site:
/// * the timestamp index is strictly increasing;
/// * column names are unique;
/// * every column is exactly as long as the index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    dates: Vec<DateTime<Utc>>,
    names: Vec<SmolStr>,
    cols: Vec<Vec<f64>>,
}

impl Frame {
    /// An empty frame with the provided column names.
    pub fn new<I, S>(names: I) -> Result<Self, FrameError>
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        let names = names.into_iter().map(Into::into).collect::<Vec<_>>();
        check_unique(&names)?;
        let cols = names.iter().map(|_| Vec::new()).collect();
        Ok(Self {
            dates: Vec::new(),
            names,
            cols,
        })
    }

    /// Construct a frame from parallel columns, validating every invariant.
    pub fn from_columns<I, S>(
        dates: Vec<DateTime<Utc>>,
        names: I,
        cols: Vec<Vec<f64>>,
    ) -> Result<Self, FrameError>
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        let names = names.into_iter().map(Into::into).collect::<Vec<_>>();
        check_unique(&names)?;

        if names.len() != cols.len() {
            return Err(FrameError::ColumnArity {
                expected: names.len(),
                found: cols.len(),
            });
        }
        for col in &cols {
            if col.len() != dates.len() {
                return Err(FrameError::LengthMismatch {
                    expected: dates.len(),
                    found: col.len(),
                });
            }
        }
        for pair in dates.windows(2) {
            if pair[0] >= pair[1] {
                return Err(FrameError::NonMonotonicDate {
                    date: pair[1],
                    last: pair[0],
                });
            }
        }

        Ok(Self { dates, names, cols })
    }

    /// Construct a single-column frame.
    pub fn single<S: Into<SmolStr>>(
        dates: Vec<DateTime<Utc>>,
        name: S,
        values: Vec<f64>,
    ) -> Result<Self, FrameError> {
        Self::from_columns(dates, [name.into()], vec![values])
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// True iff the frame has no rows.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Number of columns.
    pub fn col_count(&self) -> usize {
        self.names.len()
    }

    /// Timestamp index.
    pub fn dates(&self) -> &[DateTime<Utc>] {
        &self.dates
    }

    /// Column names, in column order.
    pub fn names(&self) -> &[SmolStr] {
        &self.names
    }

    /// Values of a named column.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.column_index(name).map(|idx| self.cols[idx].as_slice())
    }

    /// Position of a named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Value at `(row, column name)`.
    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        self.column(name).and_then(|col| col.get(row)).copied()
    }

    /// All values of a row, in column order.
    pub fn row(&self, row: usize) -> Option<Vec<f64>> {
        (row < self.len()).then(|| self.cols.iter().map(|col| col[row]).collect())
    }

    /// First index timestamp.
    pub fn first_date(&self) -> Option<DateTime<Utc>> {
        self.dates.first().copied()
    }

    /// Last index timestamp.
    pub fn last_date(&self) -> Option<DateTime<Utc>> {
        self.dates.last().copied()
    }

    /// New frame with every row containing `value` in any column removed.
    /// A NaN `value` matches NaN cells.
    pub fn drop_rows(&self, value: f64) -> Self {
        let keep = (0..self.len())
            .filter(|&row| {
                !self
                    .cols
                    .iter()
                    .any(|col| col[row] == value || (value.is_nan() && col[row].is_nan()))
            })
            .collect::<Vec<_>>();
        self.take_rows(&keep)
    }

    /// New frame with every row containing a NaN removed.
    pub fn drop_na(&self) -> Self {
        self.drop_rows(f64::NAN)
    }

    /// New frame containing rows whose Eastern calendar date lies in
    /// `[begin, end]`, both inclusive. An inverted or non-intersecting range
    /// yields an empty frame.
    pub fn trim(&self, begin: NaiveDate, end: NaiveDate) -> Self {
        let lo = self.dates.partition_point(|d| eastern_date(*d) < begin);
        let hi = self.dates.partition_point(|d| eastern_date(*d) <= end);
        if lo >= hi {
            return self.take_rows(&[]);
        }
        self.take_rows(&(lo..hi).collect::<Vec<_>>())
    }

    /// New frame containing only rows classified as trade days of the
    /// provided [`Frequency`] phase at the regular-hours close.
    pub fn frequency(&self, frequency: Frequency) -> Self {
        let calendar = MarketCalendar::nyse();
        let keep = (0..self.len())
            .filter(|&row| {
                let date = eastern_date(self.dates[row]);
                match frequency.phase() {
                    None => calendar.is_trading_day(date),
                    Some(phase) => calendar.is_phase_day(date, phase),
                }
            })
            .collect::<Vec<_>>();
        self.take_rows(&keep)
    }

    /// One-row frame holding the final row, or an empty frame.
    pub fn last(&self) -> Self {
        match self.len() {
            0 => self.take_rows(&[]),
            n => self.take_rows(&[n - 1]),
        }
    }

    /// Partition columns into `(selected, remainder)`; both share the index.
    ///
    /// Selected columns appear in the requested order. Unknown names are an
    /// error.
    pub fn split(&self, selected: &[&str]) -> Result<(Self, Self), FrameError> {
        let mut picked = Vec::with_capacity(selected.len());
        for name in selected {
            let idx = self
                .column_index(name)
                .ok_or_else(|| FrameError::ColumnNotFound(SmolStr::new(name)))?;
            picked.push(idx);
        }

        let take = Self {
            dates: self.dates.clone(),
            names: picked.iter().map(|&idx| self.names[idx].clone()).collect(),
            cols: picked.iter().map(|&idx| self.cols[idx].clone()).collect(),
        };
        let rest_idx = (0..self.col_count())
            .filter(|idx| !picked.contains(idx))
            .collect::<Vec<_>>();
        let rest = Self {
            dates: self.dates.clone(),
            names: rest_idx.iter().map(|&idx| self.names[idx].clone()).collect(),
            cols: rest_idx.iter().map(|&idx| self.cols[idx].clone()).collect(),
        };
        Ok((take, rest))
    }

    /// Break the frame into one single-column frame per column, sharing the index.
    pub fn breakout(&self) -> IndexMap<SmolStr, Frame> {
        self.names
            .iter()
            .zip(&self.cols)
            .map(|(name, col)| {
                (
                    name.clone(),
                    Frame {
                        dates: self.dates.clone(),
                        names: vec![name.clone()],
                        cols: vec![col.clone()],
                    },
                )
            })
            .collect()
    }

    /// Extend this frame with the rows of `other` dated strictly after this
    /// frame's last row. The column set becomes the union of both frames;
    /// cells a side never observed are NaN.
    pub fn append(&mut self, other: &Frame) {
        for name in other.names() {
            if self.column_index(name).is_none() {
                self.names.push(name.clone());
                self.cols.push(vec![f64::NAN; self.len()]);
            }
        }

        let mapping = self
            .names
            .iter()
            .map(|name| other.column_index(name))
            .collect::<Vec<_>>();

        let cutoff = self.last_date();
        for (row, date) in other.dates.iter().enumerate() {
            if let Some(cutoff) = cutoff
                && *date <= cutoff
            {
                continue;
            }
            self.dates.push(*date);
            for (col, source) in self.cols.iter_mut().zip(&mapping) {
                col.push(source.map(|idx| other.cols[idx][row]).unwrap_or(f64::NAN));
            }
        }
    }

    /// Append one row of values in column order. The date must extend the
    /// index; the arity must match the column count.
    pub fn insert_row(&mut self, date: DateTime<Utc>, values: &[f64]) -> Result<(), FrameError> {
        if values.len() != self.col_count() {
            return Err(FrameError::ColumnArity {
                expected: self.col_count(),
                found: values.len(),
            });
        }
        if let Some(last) = self.last_date()
            && date <= last
        {
            return Err(FrameError::NonMonotonicDate { date, last });
        }

        self.dates.push(date);
        for (col, value) in self.cols.iter_mut().zip(values) {
            col.push(*value);
        }
        Ok(())
    }

    /// Append one row of values keyed by column name. Every column must be
    /// present and every key must name a column.
    pub fn insert_map(
        &mut self,
        date: DateTime<Utc>,
        values: &HashMap<SmolStr, f64>,
    ) -> Result<(), FrameError> {
        for key in values.keys() {
            if self.column_index(key).is_none() {
                return Err(FrameError::ColumnNotFound(key.clone()));
            }
        }
        let row = self
            .names
            .iter()
            .map(|name| {
                values
                    .get(name)
                    .copied()
                    .ok_or_else(|| FrameError::ColumnArity {
                        expected: self.col_count(),
                        found: values.len(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.insert_row(date, &row)
    }

    /// Trim a set of frames to their common `[max(start), min(end)]` range and
    /// merge them into one multi-column frame.
    ///
    /// An empty intersection is [`FrameError::IntervalInvalid`]; column names
    /// must be unique across inputs. Aligned inputs must agree on every
    /// timestamp - a disagreement after trimming means the inputs were not
    /// sampled on the same schedule and is a programming error.
    pub fn align<I>(frames: I) -> Result<Frame, FrameError>
    where
        I: IntoIterator<Item = Frame>,
    {
        let frames = frames.into_iter().collect::<Vec<_>>();
        if frames.is_empty() {
            return Ok(Frame::default());
        }

        let begin = frames
            .iter()
            .map(|f| f.first_date().ok_or(FrameError::IntervalInvalid))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .max()
            .expect("non-empty");
        let end = frames
            .iter()
            .filter_map(Frame::last_date)
            .min()
            .expect("non-empty");
        if begin > end {
            return Err(FrameError::IntervalInvalid);
        }

        let trimmed = frames
            .iter()
            .map(|f| f.trim(eastern_date(begin), eastern_date(end)))
            .collect::<Vec<_>>();

        let dates = trimmed[0].dates.clone();
        let mut names = Vec::new();
        let mut cols = Vec::new();
        for frame in &trimmed {
            assert_eq!(
                frame.dates, dates,
                "aligned frames must share an identical index"
            );
            for (name, col) in frame.names.iter().zip(&frame.cols) {
                if names.contains(name) {
                    return Err(FrameError::DuplicateColumn(name.clone()));
                }
                names.push(name.clone());
                cols.push(col.clone());
            }
        }

        Ok(Frame { dates, names, cols })
    }

    /// New frame with every column renamed through `rename`. The renamed set
    /// must stay unique.
    pub fn rename_columns(
        &self,
        rename: impl Fn(&SmolStr) -> SmolStr,
    ) -> Result<Self, FrameError> {
        let names = self.names.iter().map(rename).collect::<Vec<_>>();
        check_unique(&names)?;
        Ok(Self {
            dates: self.dates.clone(),
            names,
            cols: self.cols.clone(),
        })
    }

    /// Column storage, in column order.
    pub(crate) fn columns(&self) -> &[Vec<f64>] {
        &self.cols
    }

    /// New frame holding the provided row positions, in order.
    pub(crate) fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            dates: rows.iter().map(|&row| self.dates[row]).collect(),
            names: self.names.clone(),
            cols: self
                .cols
                .iter()
                .map(|col| rows.iter().map(|&row| col[row]).collect())
                .collect(),
        }
    }

    /// Construct without re-validating; internal use where invariants hold by
    /// construction.
    pub(crate) fn from_parts(
        dates: Vec<DateTime<Utc>>,
        names: Vec<SmolStr>,
        cols: Vec<Vec<f64>>,
    ) -> Self {
        debug_assert_eq!(names.len(), cols.len());
        debug_assert!(cols.iter().all(|col| col.len() == dates.len()));
        Self { dates, names, cols }
    }
}

fn check_unique(names: &[SmolStr]) -> Result<(), FrameError> {
    for (idx, name) in names.iter().enumerate() {
        if names[..idx].contains(name) {
            return Err(FrameError::DuplicateColumn(name.clone()));
        }
    }
    Ok(())
}

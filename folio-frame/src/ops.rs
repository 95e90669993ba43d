use crate::{error::FrameError, frame::Frame};
use smol_str::SmolStr;

impl Frame {
    /// Add a scalar to every cell.
    pub fn add_scalar(&self, value: f64) -> Self {
        self.map_cells(|cell| cell + value)
    }

    /// Add a row-indexed vector to every column: `values[row]` is added to
    /// each cell of that row. The vector arity must match the index length.
    pub fn add_vec(&self, values: &[f64]) -> Result<Self, FrameError> {
        if values.len() != self.len() {
            return Err(FrameError::LengthMismatch {
                expected: self.len(),
                found: values.len(),
            });
        }
        let cols = self
            .columns()
            .iter()
            .map(|col| {
                col.iter()
                    .zip(values)
                    .map(|(cell, value)| cell + value)
                    .collect()
            })
            .collect();
        Ok(Self::from_parts(
            self.dates().to_vec(),
            self.names().to_vec(),
            cols,
        ))
    }

    /// Multiply every cell by a scalar.
    pub fn mul_scalar(&self, value: f64) -> Self {
        self.map_cells(|cell| cell * value)
    }

    /// Column-name-matched element-wise product. Columns of `self` without a
    /// counterpart in `other` pass through untouched. Both frames must share
    /// the index length.
    pub fn mul(&self, other: &Frame) -> Result<Self, FrameError> {
        self.zip_columns(other, |a, b| a * b)
    }

    /// Column-name-matched element-wise quotient; same rules as [`Self::mul`].
    pub fn div(&self, other: &Frame) -> Result<Self, FrameError> {
        self.zip_columns(other, |a, b| a / b)
    }

    /// Per-column mean across frames, over the columns shared by all of them.
    /// Column order follows the first frame; the index is the first frame's.
    pub fn mean(frames: &[Frame]) -> Result<Frame, FrameError> {
        let Some(first) = frames.first() else {
            return Ok(Frame::default());
        };
        for frame in frames {
            if frame.len() != first.len() {
                return Err(FrameError::LengthMismatch {
                    expected: first.len(),
                    found: frame.len(),
                });
            }
        }

        let shared = first
            .names()
            .iter()
            .filter(|name| frames.iter().all(|f| f.column(name).is_some()))
            .cloned()
            .collect::<Vec<_>>();

        let cols = shared
            .iter()
            .map(|name| {
                (0..first.len())
                    .map(|row| {
                        let sum: f64 = frames
                            .iter()
                            .map(|f| f.column(name).expect("shared column")[row])
                            .sum();
                        sum / frames.len() as f64
                    })
                    .collect()
            })
            .collect();

        Ok(Frame::from_parts(first.dates().to_vec(), shared, cols))
    }

    /// Shift values down by `periods` rows, filling the top with NaN. The row
    /// count is preserved; `lag(0)` is the identity.
    pub fn lag(&self, periods: usize) -> Self {
        let cols = self
            .columns()
            .iter()
            .map(|col| {
                let mut shifted = vec![f64::NAN; periods.min(col.len())];
                shifted.extend_from_slice(&col[..col.len().saturating_sub(periods)]);
                shifted
            })
            .collect();
        Self::from_parts(self.dates().to_vec(), self.names().to_vec(), cols)
    }

    /// Per-column rolling sum over `width` rows, scaled by `scale`. Rows
    /// before the window fills are NaN; an invalid width yields an all-NaN
    /// frame of the same shape.
    pub fn rolling_sum_scaled(&self, width: usize, scale: f64) -> Self {
        self.rolling(width, |window| window.iter().sum::<f64>() * scale)
    }

    /// Per-column simple moving average over `width` rows. Rows before the
    /// window fills are NaN; an invalid width (0 or greater than the row
    /// count) yields an all-NaN frame of the same shape.
    pub fn sma(&self, width: usize) -> Self {
        self.rolling(width, |window| {
            window.iter().sum::<f64>() / window.len() as f64
        })
    }

    /// Single-column frame (`idxmax`) holding, per row, the position of the
    /// column with the maximum value. Any NaN input on a row poisons that
    /// row's output to NaN. Ties resolve to the first column.
    pub fn idx_max(&self) -> Self {
        self.row_reduce("idxmax", |row| {
            let mut best = 0usize;
            for (idx, value) in row.iter().enumerate() {
                if *value > row[best] {
                    best = idx;
                }
            }
            best as f64
        })
    }

    /// Per-row maximum across columns (`max`). Any NaN input on a row poisons
    /// that row's output to NaN.
    pub fn max(&self) -> Self {
        self.row_reduce("max", |row| {
            row.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        })
    }

    fn map_cells(&self, op: impl Fn(f64) -> f64) -> Self {
        let cols = self
            .columns()
            .iter()
            .map(|col| col.iter().map(|cell| op(*cell)).collect())
            .collect();
        Self::from_parts(self.dates().to_vec(), self.names().to_vec(), cols)
    }

    fn zip_columns(
        &self,
        other: &Frame,
        op: impl Fn(f64, f64) -> f64,
    ) -> Result<Self, FrameError> {
        if other.len() != self.len() {
            return Err(FrameError::LengthMismatch {
                expected: self.len(),
                found: other.len(),
            });
        }
        let cols = self
            .names()
            .iter()
            .zip(self.columns())
            .map(|(name, col)| match other.column(name) {
                Some(rhs) => col.iter().zip(rhs).map(|(a, b)| op(*a, *b)).collect(),
                None => col.clone(),
            })
            .collect();
        Ok(Self::from_parts(
            self.dates().to_vec(),
            self.names().to_vec(),
            cols,
        ))
    }

    fn rolling(&self, width: usize, op: impl Fn(&[f64]) -> f64) -> Self {
        let invalid = width == 0 || width > self.len();
        let cols = self
            .columns()
            .iter()
            .map(|col| {
                (0..col.len())
                    .map(|row| {
                        if invalid || row + 1 < width {
                            f64::NAN
                        } else {
                            op(&col[row + 1 - width..=row])
                        }
                    })
                    .collect()
            })
            .collect();
        Self::from_parts(self.dates().to_vec(), self.names().to_vec(), cols)
    }

    fn row_reduce(&self, name: &str, op: impl Fn(&[f64]) -> f64) -> Self {
        let values = (0..self.len())
            .map(|row| {
                let cells = self.row(row).expect("row in bounds");
                if cells.iter().any(|cell| cell.is_nan()) {
                    f64::NAN
                } else {
                    op(&cells)
                }
            })
            .collect();
        Self::from_parts(
            self.dates().to_vec(),
            vec![SmolStr::new(name)],
            vec![values],
        )
    }
}

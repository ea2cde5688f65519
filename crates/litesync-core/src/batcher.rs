//! Pending row buffer for bulk inserts into the replica.

use crate::types::LiteValue;

/// Rows buffered per table before a flush is forced.
pub const MAX_BUFFERED_ROWS: usize = 10_000;

/// Estimated bytes buffered per table before a flush is forced.
pub const BUFFERED_SIZE_THRESHOLD: usize = 8 * 1024 * 1024;

/// Rows per multi-row INSERT statement.
pub const INSERT_BATCH_SIZE: usize = 50;

/// Flush thresholds for a [`RowBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    pub max_rows: usize,
    pub max_bytes: usize,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            max_rows: MAX_BUFFERED_ROWS,
            max_bytes: BUFFERED_SIZE_THRESHOLD,
        }
    }
}

/// A flat, preallocated array of converted values for one table.
///
/// Values are written row-major; slots are reset to `Null` after each flush
/// and reused, so a copy allocates the buffer once.
#[derive(Debug)]
pub struct RowBuffer {
    columns: usize,
    values: Vec<LiteValue>,
    rows: usize,
    col: usize,
    bytes: usize,
    limits: BufferLimits,
}

impl RowBuffer {
    pub fn new(columns: usize, limits: BufferLimits) -> Self {
        let max_rows = limits.max_rows.max(1);
        let mut values = Vec::new();
        values.resize(max_rows * columns, LiteValue::Null);
        Self {
            columns,
            values,
            rows: 0,
            col: 0,
            bytes: 0,
            limits,
        }
    }

    /// Append the next value of the current row.
    ///
    /// Returns true when this value completed a row and the buffer has
    /// crossed a flush threshold.
    pub fn push(&mut self, value: LiteValue) -> bool {
        self.bytes += value.estimated_size();
        let index = self.rows * self.columns + self.col;
        if index < self.values.len() {
            self.values[index] = value;
        } else {
            self.values.push(value);
        }

        self.col += 1;
        if self.col < self.columns {
            return false;
        }
        self.col = 0;
        self.rows += 1;
        self.should_flush()
    }

    pub fn should_flush(&self) -> bool {
        self.rows >= self.limits.max_rows || self.bytes >= self.limits.max_bytes
    }

    /// Number of complete rows buffered.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Values written for the row in progress.
    pub fn partial_row_len(&self) -> usize {
        self.col
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn estimated_bytes(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Values of all complete rows, row-major.
    pub fn complete_rows(&self) -> &[LiteValue] {
        &self.values[..self.rows * self.columns]
    }

    /// Drop the complete rows, keeping any row in progress.
    pub fn clear(&mut self) {
        let consumed = self.rows * self.columns;
        for i in 0..self.col {
            self.values.swap(i, consumed + i);
        }
        for value in &mut self.values[self.col..consumed + self.col] {
            *value = LiteValue::Null;
        }
        self.rows = 0;
        self.bytes = self.values[..self.col]
            .iter()
            .map(LiteValue::estimated_size)
            .sum();
    }
}

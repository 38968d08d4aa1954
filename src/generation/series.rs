use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SeriesError {
    #[error("timestamps are not strictly increasing at row {0}")]
    UnorderedIndex(usize),
    #[error("column '{label}' has {actual} values, expected {expected}")]
    LengthMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
}

/// A named column of power values (MW), one per row of the owning table
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub label: String,
    pub values: Vec<f64>,
}

/// Time-indexed table with one column per label.
///
/// The index is strictly increasing and every column holds exactly one value per
/// timestamp. Column order is insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeTable {
    index: Vec<DateTime<Utc>>,
    columns: Vec<Column>,
}

/// Raw production-type columns as returned by the market data API
pub type GenerationSeries = TimeTable;

/// One column per canonical category
pub type AggregatedSeries = TimeTable;

/// Per-row fractions of the row total
pub type ShareSeries = TimeTable;

impl TimeTable {
    pub fn new(index: Vec<DateTime<Utc>>) -> Result<Self, SeriesError> {
        if let Some(row) = index.windows(2).position(|w| w[0] >= w[1]) {
            return Err(SeriesError::UnorderedIndex(row + 1));
        }

        Ok(Self {
            index,
            columns: Vec::new(),
        })
    }

    pub fn push_column(
        &mut self,
        label: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), SeriesError> {
        let label = label.into();
        if values.len() != self.index.len() {
            return Err(SeriesError::LengthMismatch {
                label,
                expected: self.index.len(),
                actual: values.len(),
            });
        }
        if self.column(&label).is_some() {
            return Err(SeriesError::DuplicateColumn(label));
        }

        self.columns.push(Column { label, values });
        Ok(())
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, label: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.label == label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.label.as_str())
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.index.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.index.last().copied()
    }

    /// Sum across all columns for every row
    pub fn row_totals(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.index.len()];
        for column in &self.columns {
            for (total, value) in totals.iter_mut().zip(&column.values) {
                *total += value;
            }
        }
        totals
    }

    /// Empty table over the same index as `other`
    pub(crate) fn with_index_of(other: &TimeTable) -> Self {
        Self {
            index: other.index.clone(),
            columns: Vec::new(),
        }
    }

    pub(crate) fn columns_mut(&mut self) -> &mut Vec<Column> {
        &mut self.columns
    }
}

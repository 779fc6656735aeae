use chrono::{DateTime, FixedOffset, NaiveDateTime};
use polars::prelude::*;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("Timestamps are not strictly increasing at position {0}")]
    UnorderedIndex(usize),

    #[error("Column '{column}' has {found} values, the index has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
}

/// A station's observations: one strictly increasing time index and any number of
/// columns aligned to it.
///
/// Numeric columns use `NaN` for missing readings. Text-valued sensors (METAR
/// strings, cardinal directions) live in a separate map of optional strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeTable {
    index: Vec<DateTime<FixedOffset>>,
    columns: BTreeMap<String, Vec<f64>>,
    text_columns: BTreeMap<String, Vec<Option<String>>>,
}

impl TimeTable {
    /// Creates an empty table over `index`. Fails unless the index is strictly increasing.
    pub fn new(index: Vec<DateTime<FixedOffset>>) -> Result<Self, TableError> {
        if let Some(position) = index.windows(2).position(|w| w[0] >= w[1]) {
            return Err(TableError::UnorderedIndex(position + 1));
        }
        Ok(Self {
            index,
            columns: BTreeMap::new(),
            text_columns: BTreeMap::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[DateTime<FixedOffset>] {
        &self.index
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn text_column(&self, name: &str) -> Option<&[Option<String>]> {
        self.text_columns.get(name).map(Vec::as_slice)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name) || self.text_columns.contains_key(name)
    }

    /// Numeric column names in sorted order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn text_columns(&self) -> impl Iterator<Item = (&str, &[Option<String>])> {
        self.text_columns
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Inserts or replaces a numeric column, returning the replaced values.
    pub fn insert_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Option<Vec<f64>>, TableError> {
        let name = name.into();
        self.check_len(&name, values.len())?;
        Ok(self.columns.insert(name, values))
    }

    pub fn insert_text_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<String>>,
    ) -> Result<Option<Vec<Option<String>>>, TableError> {
        let name = name.into();
        self.check_len(&name, values.len())?;
        Ok(self.text_columns.insert(name, values))
    }

    /// Number of non-missing readings in a column.
    pub fn count_valid(&self, name: &str) -> usize {
        self.column(name)
            .map(|values| values.iter().filter(|v| !v.is_nan()).count())
            .unwrap_or(0)
    }

    fn check_len(&self, column: &str, found: usize) -> Result<(), TableError> {
        if found != self.index.len() {
            return Err(TableError::LengthMismatch {
                column: column.to_string(),
                expected: self.index.len(),
                found,
            });
        }
        Ok(())
    }

    /// Exports the table as a polars `DataFrame`.
    ///
    /// `date_time` holds the wall-clock time of each row in the table's offset;
    /// the offset itself goes in `utc_offset_seconds`. Missing readings become nulls.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let wall_clock: Vec<NaiveDateTime> = self.index.iter().map(|t| t.naive_local()).collect();
        let offsets: Vec<i32> = self
            .index
            .iter()
            .map(|t| t.offset().local_minus_utc())
            .collect();

        let mut frame_columns: Vec<Column> = Vec::with_capacity(self.columns.len() + 2);
        frame_columns.push(Series::new("date_time".into(), wall_clock).into());
        frame_columns.push(Series::new("utc_offset_seconds".into(), offsets).into());
        for (name, values) in &self.columns {
            let nullable: Vec<Option<f64>> = values
                .iter()
                .map(|v| (!v.is_nan()).then_some(*v))
                .collect();
            frame_columns.push(Series::new(name.as_str().into(), nullable).into());
        }
        for (name, values) in &self.text_columns {
            frame_columns.push(Series::new(name.as_str().into(), values.clone()).into());
        }
        DataFrame::new(frame_columns)
    }
}

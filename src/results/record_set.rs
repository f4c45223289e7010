use std::collections::HashMap;
use std::sync::Arc;

use super::row::{Row, index_columns};
use crate::types::SqlValue;

/// One result table produced by one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    rows: Vec<Row>,
    column_names: Arc<Vec<String>>,
    column_index: Arc<HashMap<String, usize>>,
}

impl RecordSet {
    /// Create an empty record set with the given columns.
    #[must_use]
    pub fn new(column_names: Vec<String>) -> Self {
        Self::with_capacity(column_names, 0)
    }

    /// Create an empty record set with preallocated room for `capacity` rows.
    #[must_use]
    pub fn with_capacity(column_names: Vec<String>, capacity: usize) -> Self {
        let column_index = Arc::new(index_columns(&column_names));
        Self {
            rows: Vec::with_capacity(capacity),
            column_names: Arc::new(column_names),
            column_index,
        }
    }

    /// Build a record set from column names and row values in one go.
    ///
    /// ```rust
    /// use sql_chain::prelude::*;
    ///
    /// let set = RecordSet::from_rows(
    ///     &["id", "name"],
    ///     vec![vec![SqlValue::Int(1), SqlValue::Text("alice".into())]],
    /// );
    /// assert_eq!(set.len(), 1);
    /// assert_eq!(set[0].get("name").and_then(SqlValue::as_text), Some("alice"));
    /// ```
    #[must_use]
    pub fn from_rows(column_names: &[&str], rows: Vec<Vec<SqlValue>>) -> Self {
        let names = column_names.iter().map(|c| (*c).to_string()).collect();
        let mut set = Self::with_capacity(names, rows.len());
        for row in rows {
            set.push_values(row);
        }
        set
    }

    /// Append a row; values are taken in column order.
    pub fn push_values(&mut self, values: Vec<SqlValue>) {
        self.rows.push(Row {
            column_names: self.column_names.clone(),
            values,
            column_index: self.column_index.clone(),
        });
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows in this record set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl std::ops::Index<usize> for RecordSet {
    type Output = Row;

    fn index(&self, index: usize) -> &Self::Output {
        &self.rows[index]
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

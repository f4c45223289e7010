//! Helpers for building scripted responses.

use crate::results::RecordSet;
use crate::statement::RETURN_VALUE_COLUMN;
use crate::types::SqlValue;

/// A record set with the given columns and rows.
#[must_use]
pub fn rows_set(column_names: &[&str], rows: Vec<Vec<SqlValue>>) -> RecordSet {
    RecordSet::from_rows(column_names, rows)
}

/// The one-row status set a procedure call ends with: its return code plus any
/// output parameter values.
#[must_use]
pub fn status_set(return_value: i32, outputs: &[(&str, SqlValue)]) -> RecordSet {
    let mut columns = vec![RETURN_VALUE_COLUMN];
    let mut values = vec![SqlValue::Int(i64::from(return_value))];
    for (name, value) in outputs {
        columns.push(*name);
        values.push(value.clone());
    }
    RecordSet::from_rows(&columns, vec![values])
}

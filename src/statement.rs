//! Statement executor: runs exactly one step on one connection and normalizes
//! what came back.
//!
//! Parameters reach the driver positionally as `@P1..@Pn`; the generated T-SQL
//! re-declares them under their own names with the caller's type tags:
//!
//! - query: `DECLARE @name type = @Pn;` lines in front of the SQL text (the
//!   text is sent as a plain batch when there are no parameters)
//! - prepared: `EXEC sp_executesql N'<sql>', N'@name type, ...', @name = @Pn, ...`
//! - procedure: `EXEC @rv = proc @name = @Pn, ...` followed by a one-row status
//!   select carrying the return code and any output parameters

use std::collections::HashMap;
use std::fmt::Write;

use crate::error::SqlChainError;
use crate::params::{BoundParam, bind_params};
use crate::pool::Connection;
use crate::results::{RecordSet, StepResult};
use crate::step::{StepDefinition, StepMode};
use crate::types::SqlValue;

/// Column of the status row that carries a procedure's return code.
pub(crate) const RETURN_VALUE_COLUMN: &str = "__return_value";
const RETURN_VALUE_VAR: &str = "@__return_value";
const OUTPUT_VAR_PREFIX: &str = "@__out_";

/// SQL text and positional parameters ready for [`Connection::execute`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<BoundParam>,
}

/// Translate a step into the batch that is sent to the server.
///
/// # Errors
/// Returns `ConfigError` / `ParameterError` from step validation and binding.
pub fn compile(step: &StepDefinition) -> Result<CompiledStatement, SqlChainError> {
    step.validate()?;
    let params = bind_params(step.params())?;
    let sql = match step.mode() {
        StepMode::Query(sql) => compile_query(sql, &params),
        StepMode::Prepared(sql) => compile_prepared(sql, &params),
        StepMode::Procedure(name) => compile_procedure(name, &params),
    };
    Ok(CompiledStatement { sql, params })
}

fn compile_query(sql: &str, params: &[BoundParam]) -> String {
    if params.is_empty() {
        return sql.to_string();
    }
    let mut batch = String::with_capacity(sql.len() + params.len() * 40);
    for (i, p) in params.iter().enumerate() {
        let _ = writeln!(batch, "DECLARE @{} {} = @P{};", p.name, p.sql_type, i + 1);
    }
    batch.push_str(sql);
    batch
}

fn compile_prepared(sql: &str, params: &[BoundParam]) -> String {
    let mut batch = format!("EXEC sp_executesql N'{}'", escape_literal(sql));
    if !params.is_empty() {
        let declarations = params
            .iter()
            .map(|p| format!("@{} {}", p.name, p.sql_type))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(batch, ", N'{}'", escape_literal(&declarations));
        for (i, p) in params.iter().enumerate() {
            let _ = write!(batch, ", @{} = @P{}", p.name, i + 1);
        }
    }
    batch.push(';');
    batch
}

fn compile_procedure(name: &str, params: &[BoundParam]) -> String {
    let mut batch = format!("DECLARE {RETURN_VALUE_VAR} int;\n");
    for (i, p) in params.iter().enumerate().filter(|(_, p)| p.is_output()) {
        let _ = writeln!(
            batch,
            "DECLARE {OUTPUT_VAR_PREFIX}{} {} = @P{};",
            p.name,
            p.sql_type,
            i + 1
        );
    }

    let _ = write!(batch, "EXEC {RETURN_VALUE_VAR} = {}", name.trim());
    let args = params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            if p.is_output() {
                format!("@{} = {OUTPUT_VAR_PREFIX}{} OUTPUT", p.name, p.name)
            } else {
                format!("@{} = @P{}", p.name, i + 1)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    if !args.is_empty() {
        batch.push(' ');
        batch.push_str(&args);
    }
    batch.push_str(";\n");

    let _ = write!(batch, "SELECT {RETURN_VALUE_VAR} AS [{RETURN_VALUE_COLUMN}]");
    for p in params.iter().filter(|p| p.is_output()) {
        let _ = write!(batch, ", {OUTPUT_VAR_PREFIX}{} AS [{}]", p.name, p.name);
    }
    batch.push(';');
    batch
}

fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

/// Run one step and normalize its result.
///
/// Validation and binding errors come back as they are, before anything is
/// sent. Anything that fails once the statement is on the wire is wrapped in
/// `SqlChainError::QueryError` with the step name and statement.
///
/// # Errors
/// See above.
pub async fn execute_step(
    conn: &mut dyn Connection,
    name: &str,
    step: &StepDefinition,
) -> Result<StepResult, SqlChainError> {
    let compiled = compile(step)?;
    tracing::trace!(step = name, sql = %compiled.sql, "sending statement");
    let sets = conn
        .execute(&compiled.sql, &compiled.params)
        .await
        .map_err(|e| SqlChainError::query(name, step.statement(), e))?;
    normalize(step, sets).map_err(|e| SqlChainError::query(name, step.statement(), e))
}

/// Shape raw record sets according to the step's mode and `multiple` flag.
///
/// # Errors
/// Returns `SqlChainError::DriverError` if a procedure call did not produce its
/// status row.
pub fn normalize(
    step: &StepDefinition,
    mut sets: Vec<RecordSet>,
) -> Result<StepResult, SqlChainError> {
    let status = if matches!(step.mode(), StepMode::Procedure(_)) {
        let trailer = sets.pop().ok_or_else(|| {
            SqlChainError::DriverError("procedure call returned no status row".into())
        })?;
        Some(read_status(step, &trailer)?)
    } else {
        None
    };

    let mut result = if step.is_multiple() {
        StepResult::multiple(sets)
    } else {
        StepResult::single(sets.into_iter().next().unwrap_or_default())
    };
    if let Some((return_value, outputs)) = status {
        result = result
            .with_return_value(return_value)
            .with_output_params(outputs);
    }
    Ok(result)
}

fn read_status(
    step: &StepDefinition,
    trailer: &RecordSet,
) -> Result<(i32, HashMap<String, SqlValue>), SqlChainError> {
    let row = trailer.first().ok_or_else(|| {
        SqlChainError::DriverError("procedure status row is empty".into())
    })?;
    let return_value = row
        .get(RETURN_VALUE_COLUMN)
        .and_then(SqlValue::as_int)
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| {
            SqlChainError::DriverError("procedure status row has no integer return value".into())
        })?;

    let outputs = step
        .params()
        .iter()
        .filter(|p| p.direction == crate::params::ParamDirection::Output)
        .map(|p| {
            let name = p.name.trim_start_matches('@').to_string();
            let value = row.get(&name).cloned().unwrap_or(SqlValue::Null);
            (name, value)
        })
        .collect();
    Ok((return_value, outputs))
}

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::SqlChainError;
use crate::params::{ParamDirection, StepParam, is_identifier};
use crate::types::{ParamType, SqlValue};

/// How a step reaches the database. Exactly one per step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepMode {
    /// Ad hoc SQL text, sent as a batch.
    Query(String),
    /// Parameterized statement with declared parameter types (`sp_executesql`).
    Prepared(String),
    /// Stored procedure call; captures the return code.
    Procedure(String),
}

impl StepMode {
    /// SQL text or procedure name.
    #[must_use]
    pub fn statement(&self) -> &str {
        match self {
            StepMode::Query(sql) | StepMode::Prepared(sql) | StepMode::Procedure(sql) => sql,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            StepMode::Query(_) => "query",
            StepMode::Prepared(_) => "prepared",
            StepMode::Procedure(_) => "procedure",
        }
    }
}

/// One unit of work in a chain.
///
/// ```rust
/// use sql_chain::prelude::*;
///
/// let step = StepDefinition::prepared("select * from NodeTestTable where i1 = @i1")
///     .param("i1", 7, ParamType::Int);
/// assert_eq!(step.params().len(), 1);
/// assert!(!step.is_multiple());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StepDefinition {
    mode: StepMode,
    params: Vec<StepParam>,
    multiple: bool,
}

impl StepDefinition {
    #[must_use]
    pub fn new(mode: StepMode) -> Self {
        Self {
            mode,
            params: Vec::new(),
            multiple: false,
        }
    }

    #[must_use]
    pub fn query(sql: impl Into<String>) -> Self {
        Self::new(StepMode::Query(sql.into()))
    }

    #[must_use]
    pub fn prepared(sql: impl Into<String>) -> Self {
        Self::new(StepMode::Prepared(sql.into()))
    }

    #[must_use]
    pub fn procedure(name: impl Into<String>) -> Self {
        Self::new(StepMode::Procedure(name.into()))
    }

    /// Add an input parameter.
    #[must_use]
    pub fn param(
        mut self,
        name: impl Into<String>,
        value: impl Into<SqlValue>,
        sql_type: ParamType,
    ) -> Self {
        self.params.push(StepParam::new(name, value, sql_type));
        self
    }

    /// Add a procedure output parameter, initially NULL.
    #[must_use]
    pub fn output(mut self, name: impl Into<String>, sql_type: ParamType) -> Self {
        self.params
            .push(StepParam::output(name, SqlValue::Null, sql_type));
        self
    }

    #[must_use]
    pub fn with_param(mut self, param: StepParam) -> Self {
        self.params.push(param);
        self
    }

    /// Keep every record set instead of only the first.
    #[must_use]
    pub fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    #[must_use]
    pub fn mode(&self) -> &StepMode {
        &self.mode
    }

    #[must_use]
    pub fn params(&self) -> &[StepParam] {
        &self.params
    }

    #[must_use]
    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    /// SQL text or procedure name.
    #[must_use]
    pub fn statement(&self) -> &str {
        self.mode.statement()
    }

    /// Checks that do not need the database.
    ///
    /// # Errors
    /// `ConfigError` for empty SQL or a malformed procedure name, `ParameterError`
    /// for output parameters outside a procedure call.
    pub fn validate(&self) -> Result<(), SqlChainError> {
        let statement = self.mode.statement();
        if statement.trim().is_empty() {
            return Err(SqlChainError::ConfigError(format!(
                "{} step has empty SQL text",
                self.mode.kind()
            )));
        }
        if let StepMode::Procedure(name) = &self.mode {
            if !is_procedure_name(name) {
                return Err(SqlChainError::ConfigError(format!(
                    "`{name}` is not a valid procedure name"
                )));
            }
        } else if let Some(p) = self
            .params
            .iter()
            .find(|p| p.direction == ParamDirection::Output)
        {
            return Err(SqlChainError::ParameterError(format!(
                "output parameter `{}` is only supported on procedure steps",
                p.name
            )));
        }
        Ok(())
    }
}

/// `schema.proc`, `[db].[dbo].[proc]` and similar multi-part names.
fn is_procedure_name(name: &str) -> bool {
    let parts: Vec<&str> = name.trim().split('.').collect();
    parts.len() <= 4
        && parts.iter().all(|part| {
            if let Some(inner) = part.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
                !inner.is_empty() && !inner.contains(']')
            } else {
                is_identifier(part)
            }
        })
}

/// Data form of a step, as it appears in JSON:
/// `{ "preparedSql": "...", "params": { "i1": { "val": 1, "type": "int" } }, "multiple": false }`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStepDefinition {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub prepared_sql: Option<String>,
    #[serde(default)]
    pub procedure: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, RawParam>,
    #[serde(default)]
    pub multiple: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawParam {
    #[serde(default)]
    pub val: JsonValue,
    #[serde(rename = "type", default)]
    pub type_tag: Option<String>,
    #[serde(default)]
    pub out: bool,
}

impl TryFrom<RawStepDefinition> for StepDefinition {
    type Error = SqlChainError;

    fn try_from(raw: RawStepDefinition) -> Result<Self, Self::Error> {
        let mode = match (raw.query, raw.prepared_sql, raw.procedure) {
            (Some(sql), None, None) => StepMode::Query(sql),
            (None, Some(sql), None) => StepMode::Prepared(sql),
            (None, None, Some(name)) => StepMode::Procedure(name),
            (None, None, None) => {
                return Err(SqlChainError::ConfigError(
                    "step needs one of `query`, `preparedSql` or `procedure`".into(),
                ));
            }
            _ => {
                return Err(SqlChainError::ConfigError(
                    "step sets more than one of `query`, `preparedSql` and `procedure`".into(),
                ));
            }
        };

        let mut step = StepDefinition::new(mode).multiple(raw.multiple);
        for (name, param) in raw.params {
            step = step.with_param(StepParam::from_json(
                name,
                &param.val,
                param.type_tag.as_deref(),
                param.out,
            )?);
        }
        Ok(step)
    }
}

/// Anything a chain accepts as a step.
pub trait IntoStep {
    /// # Errors
    /// Returns an error if the value does not describe exactly one valid step.
    fn into_step(self) -> Result<StepDefinition, SqlChainError>;
}

impl IntoStep for StepDefinition {
    fn into_step(self) -> Result<StepDefinition, SqlChainError> {
        Ok(self)
    }
}

impl IntoStep for RawStepDefinition {
    fn into_step(self) -> Result<StepDefinition, SqlChainError> {
        StepDefinition::try_from(self)
    }
}

impl IntoStep for JsonValue {
    fn into_step(self) -> Result<StepDefinition, SqlChainError> {
        let raw: RawStepDefinition = serde_json::from_value(self)
            .map_err(|e| SqlChainError::ConfigError(format!("invalid step definition: {e}")))?;
        raw.into_step()
    }
}

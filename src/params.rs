//! Parameter binding: turns caller-supplied named, type-tagged values into
//! wire-ready parameters.
//!
//! Every parameter carries an explicit `ParamType`; nothing is inferred from the
//! value. A value that does not fit its tag is rejected rather than coerced so
//! the driver never silently truncates or reinterprets it.

use serde_json::Value as JsonValue;

use crate::error::SqlChainError;
use crate::types::{ParamType, SqlValue, parse_timestamp};

/// Whether the database reads the parameter or writes it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamDirection {
    #[default]
    Input,
    /// Procedure output parameter; its final value is reported on the step result.
    Output,
}

/// One named parameter as declared on a step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepParam {
    pub name: String,
    pub value: SqlValue,
    pub sql_type: ParamType,
    pub direction: ParamDirection,
}

impl StepParam {
    pub fn new(name: impl Into<String>, value: impl Into<SqlValue>, sql_type: ParamType) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            sql_type,
            direction: ParamDirection::Input,
        }
    }

    /// Output parameter; `value` is its initial value (usually `SqlValue::Null`).
    pub fn output(
        name: impl Into<String>,
        value: impl Into<SqlValue>,
        sql_type: ParamType,
    ) -> Self {
        Self {
            direction: ParamDirection::Output,
            ..Self::new(name, value, sql_type)
        }
    }

    /// Build a parameter from its data form: a JSON value and a textual type tag.
    ///
    /// # Errors
    /// Returns `SqlChainError::ParameterError` if the tag is missing or unknown.
    /// Compatibility between value and tag is checked later by [`bind_params`].
    pub fn from_json(
        name: impl Into<String>,
        value: &JsonValue,
        type_tag: Option<&str>,
        output: bool,
    ) -> Result<Self, SqlChainError> {
        let name = name.into();
        let tag = type_tag.ok_or_else(|| {
            SqlChainError::ParameterError(format!("parameter `{name}` has no type tag"))
        })?;
        let sql_type: ParamType = tag.parse()?;
        let value = json_to_value(value, sql_type);
        Ok(Self {
            name,
            value,
            sql_type,
            direction: if output {
                ParamDirection::Output
            } else {
                ParamDirection::Input
            },
        })
    }
}

/// A validated parameter ready to hand to a connection.
///
/// `value` has been normalized to the representation its `sql_type` is bound
/// with (e.g. `Bit` always carries `SqlValue::Bool`).
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    pub name: String,
    pub sql_type: ParamType,
    pub value: SqlValue,
    pub direction: ParamDirection,
}

impl BoundParam {
    #[must_use]
    pub fn is_output(&self) -> bool {
        self.direction == ParamDirection::Output
    }
}

/// Validate and normalize a step's parameters.
///
/// # Errors
/// Returns `SqlChainError::ParameterError` if a name is not a valid identifier or
/// repeats, or a value is incompatible with its declared type.
pub fn bind_params(params: &[StepParam]) -> Result<Vec<BoundParam>, SqlChainError> {
    let mut bound: Vec<BoundParam> = Vec::with_capacity(params.len());
    for param in params {
        let name = param.name.trim_start_matches('@');
        if !is_identifier(name) {
            return Err(SqlChainError::ParameterError(format!(
                "`{}` is not a valid parameter name",
                param.name
            )));
        }
        if bound.iter().any(|b| b.name.eq_ignore_ascii_case(name)) {
            return Err(SqlChainError::ParameterError(format!(
                "parameter `{name}` is declared more than once"
            )));
        }
        let value = check_value(name, param.sql_type, &param.value)?;
        bound.push(BoundParam {
            name: name.to_string(),
            sql_type: param.sql_type,
            value,
            direction: param.direction,
        });
    }
    Ok(bound)
}

/// T-SQL regular identifier: letter or `_` first, then letters, digits, `_`, `@`, `#`, `$`.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '#' | '$'))
}

fn check_value(name: &str, ty: ParamType, value: &SqlValue) -> Result<SqlValue, SqlChainError> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    let mismatch = || {
        SqlChainError::ParameterError(format!(
            "parameter `{name}`: value {value:?} is not compatible with type {ty}"
        ))
    };

    match ty {
        ParamType::Bit => value.as_bool().map(SqlValue::Bool).ok_or_else(mismatch),
        ParamType::TinyInt | ParamType::SmallInt | ParamType::Int | ParamType::BigInt => {
            let v = value.as_int().ok_or_else(mismatch)?;
            let fits = match ty {
                ParamType::TinyInt => u8::try_from(v).is_ok(),
                ParamType::SmallInt => i16::try_from(v).is_ok(),
                ParamType::Int => i32::try_from(v).is_ok(),
                _ => true,
            };
            if fits {
                Ok(SqlValue::Int(v))
            } else {
                Err(SqlChainError::ParameterError(format!(
                    "parameter `{name}`: {v} is out of range for {ty}"
                )))
            }
        }
        ParamType::Real | ParamType::Float | ParamType::Decimal { .. } | ParamType::Money => {
            value.as_float().map(SqlValue::Float).ok_or_else(mismatch)
        }
        ParamType::Char(_)
        | ParamType::VarChar(_)
        | ParamType::NChar(_)
        | ParamType::NVarChar(_)
        | ParamType::Text
        | ParamType::NText => {
            let text = match value {
                SqlValue::Text(s) => s.clone(),
                SqlValue::JSON(json) => json.to_string(),
                _ => return Err(mismatch()),
            };
            check_len(name, ty, text.chars().count())?;
            Ok(SqlValue::Text(text))
        }
        ParamType::Date | ParamType::DateTime | ParamType::DateTime2 => value
            .as_timestamp()
            .map(SqlValue::Timestamp)
            .ok_or_else(mismatch),
        ParamType::UniqueIdentifier => match value {
            SqlValue::Text(s) if is_guid(s) => Ok(SqlValue::Text(s.clone())),
            _ => Err(mismatch()),
        },
        ParamType::VarBinary(_) => {
            let bytes = value.as_blob().ok_or_else(mismatch)?;
            check_len(name, ty, bytes.len())?;
            Ok(SqlValue::Blob(bytes.to_vec()))
        }
    }
}

fn check_len(name: &str, ty: ParamType, len: usize) -> Result<(), SqlChainError> {
    match ty.max_len() {
        Some(max) if len > max => Err(SqlChainError::ParameterError(format!(
            "parameter `{name}`: length {len} exceeds {ty}"
        ))),
        _ => Ok(()),
    }
}

fn is_guid(s: &str) -> bool {
    let s = s.trim_start_matches('{').trim_end_matches('}');
    s.len() == 36
        && s.char_indices().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

fn json_to_value(value: &JsonValue, ty: ParamType) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Int(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Float),
        },
        JsonValue::String(s) => match ty {
            ParamType::Date | ParamType::DateTime | ParamType::DateTime2 => {
                parse_timestamp(s).map_or_else(|| SqlValue::Text(s.clone()), SqlValue::Timestamp)
            }
            _ => SqlValue::Text(s.clone()),
        },
        JsonValue::Array(items) if matches!(ty, ParamType::VarBinary(_)) => {
            let bytes: Option<Vec<u8>> = items
                .iter()
                .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect();
            bytes.map_or_else(|| SqlValue::JSON(value.clone()), SqlValue::Blob)
        }
        JsonValue::Array(_) | JsonValue::Object(_) => SqlValue::JSON(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bind_one(param: StepParam) -> Result<BoundParam, SqlChainError> {
        bind_params(&[param]).map(|mut v| v.remove(0))
    }

    #[test]
    fn binds_integer_and_text() {
        let bound = bind_params(&[
            StepParam::new("i1", 42, ParamType::Int),
            StepParam::new("@v1", "testy", ParamType::NVarChar(None)),
        ])
        .unwrap();
        assert_eq!(bound[0].value, SqlValue::Int(42));
        assert_eq!(bound[1].name, "v1");
        assert_eq!(bound[1].value, SqlValue::Text("testy".into()));
    }

    #[test]
    fn rejects_text_bound_to_int() {
        let err = bind_one(StepParam::new("i1", "abc", ParamType::Int)).unwrap_err();
        assert!(matches!(err, SqlChainError::ParameterError(_)));
    }

    #[test]
    fn rejects_float_bound_to_int() {
        let err = bind_one(StepParam::new("i1", 1.5, ParamType::Int)).unwrap_err();
        assert!(matches!(err, SqlChainError::ParameterError(_)));
    }

    #[test]
    fn rejects_out_of_range_integers() {
        assert!(bind_one(StepParam::new("t", 256, ParamType::TinyInt)).is_err());
        assert!(bind_one(StepParam::new("t", -1, ParamType::TinyInt)).is_err());
        assert!(bind_one(StepParam::new("s", 40_000, ParamType::SmallInt)).is_err());
        assert!(bind_one(StepParam::new("i", i64::from(i32::MAX) + 1, ParamType::Int)).is_err());
        assert!(bind_one(StepParam::new("b", i64::MAX, ParamType::BigInt)).is_ok());
    }

    #[test]
    fn rejects_text_longer_than_declared() {
        let err =
            bind_one(StepParam::new("v", "abcdef", ParamType::NVarChar(Some(3)))).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
        assert!(bind_one(StepParam::new("v", "abc", ParamType::NVarChar(Some(3)))).is_ok());
    }

    #[test]
    fn null_fits_every_type() {
        for ty in [
            ParamType::Int,
            ParamType::Bit,
            ParamType::NVarChar(Some(1)),
            ParamType::DateTime2,
            ParamType::VarBinary(None),
        ] {
            assert_eq!(
                bind_one(StepParam::new("p", SqlValue::Null, ty)).unwrap().value,
                SqlValue::Null
            );
        }
    }

    #[test]
    fn bit_accepts_zero_and_one() {
        assert_eq!(
            bind_one(StepParam::new("b", 1, ParamType::Bit)).unwrap().value,
            SqlValue::Bool(true)
        );
        assert!(bind_one(StepParam::new("b", 2, ParamType::Bit)).is_err());
    }

    #[test]
    fn rejects_bad_names_and_duplicates() {
        assert!(bind_one(StepParam::new("1abc", 1, ParamType::Int)).is_err());
        assert!(bind_one(StepParam::new("a;drop", 1, ParamType::Int)).is_err());
        let err = bind_params(&[
            StepParam::new("i1", 1, ParamType::Int),
            StepParam::new("@I1", 2, ParamType::Int),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn guid_and_dates() {
        assert!(
            bind_one(StepParam::new(
                "g",
                "6F9619FF-8B86-D011-B42D-00C04FC964FF",
                ParamType::UniqueIdentifier
            ))
            .is_ok()
        );
        assert!(bind_one(StepParam::new("g", "not-a-guid", ParamType::UniqueIdentifier)).is_err());
        let bound =
            bind_one(StepParam::new("d", "2024-01-02 03:04:05", ParamType::DateTime)).unwrap();
        assert!(matches!(bound.value, SqlValue::Timestamp(_)));
    }

    #[test]
    fn from_json_requires_known_tag() {
        let err = StepParam::from_json("i1", &json!(1), None, false).unwrap_err();
        assert!(err.to_string().contains("no type tag"));
        let err = StepParam::from_json("i1", &json!(1), Some("integerish"), false).unwrap_err();
        assert!(err.to_string().contains("unrecognized type tag"));

        let param =
            StepParam::from_json("bytes", &json!([1, 2, 255]), Some("varbinary"), false).unwrap();
        assert_eq!(param.value, SqlValue::Blob(vec![1, 2, 255]));
        let param = StepParam::from_json("o", &json!(null), Some("int"), true).unwrap();
        assert_eq!(param.direction, ParamDirection::Output);
    }

    #[test]
    fn from_json_then_bind_rejects_incompatible_value() {
        let param = StepParam::from_json("i1", &json!("twelve"), Some("int"), false).unwrap();
        assert!(matches!(
            bind_params(&[param]).unwrap_err(),
            SqlChainError::ParameterError(_)
        ));
    }
}

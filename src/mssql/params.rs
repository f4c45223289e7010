use std::borrow::Cow;

use tiberius::{ColumnData, IntoSql, Query};

use crate::error::SqlChainError;
use crate::params::BoundParam;
use crate::types::{ParamType, SqlValue};

/// Owned wire value handed to `Query::bind`.
struct WireParam(ColumnData<'static>);

impl<'a> IntoSql<'a> for WireParam {
    fn into_sql(self) -> ColumnData<'a> {
        self.0
    }
}

/// Bind `params` to `@P1..@Pn` of `sql`, in order.
///
/// # Errors
/// `ParameterError` if a value cannot be sent as its declared type.
pub(crate) fn bind_query_params<'a>(
    sql: &'a str,
    params: &[BoundParam],
) -> Result<Query<'a>, SqlChainError> {
    let mut query = Query::new(sql);
    for param in params {
        query.bind(WireParam(wire_value(param)?));
    }
    Ok(query)
}

fn wire_value(param: &BoundParam) -> Result<ColumnData<'static>, SqlChainError> {
    let ty = param.sql_type;
    let data = match &param.value {
        SqlValue::Null => typed_null(ty),
        SqlValue::Bool(b) => ColumnData::Bit(Some(*b)),
        SqlValue::Int(i) => int_value(param, *i)?,
        #[allow(clippy::cast_possible_truncation)]
        SqlValue::Float(f) if ty == ParamType::Real => ColumnData::F32(Some(*f as f32)),
        SqlValue::Float(f) => ColumnData::F64(Some(*f)),
        SqlValue::Text(s) => ColumnData::String(Some(Cow::Owned(s.clone()))),
        SqlValue::JSON(json) => ColumnData::String(Some(Cow::Owned(json.to_string()))),
        SqlValue::Blob(bytes) => ColumnData::Binary(Some(Cow::Owned(bytes.clone()))),
        SqlValue::Timestamp(dt) => {
            let format = match ty {
                ParamType::Date => "%Y-%m-%d",
                ParamType::DateTime => "%Y-%m-%dT%H:%M:%S%.3f",
                _ => "%Y-%m-%dT%H:%M:%S%.6f",
            };
            ColumnData::String(Some(Cow::Owned(dt.format(format).to_string())))
        }
    };
    Ok(data)
}

fn int_value(param: &BoundParam, value: i64) -> Result<ColumnData<'static>, SqlChainError> {
    let out_of_range = || {
        SqlChainError::ParameterError(format!(
            "value {value} for @{} does not fit {}",
            param.name, param.sql_type
        ))
    };
    let data = match param.sql_type {
        ParamType::TinyInt => {
            ColumnData::U8(Some(u8::try_from(value).map_err(|_| out_of_range())?))
        }
        ParamType::SmallInt => {
            ColumnData::I16(Some(i16::try_from(value).map_err(|_| out_of_range())?))
        }
        ParamType::Int => ColumnData::I32(Some(i32::try_from(value).map_err(|_| out_of_range())?)),
        #[allow(clippy::cast_precision_loss)]
        ParamType::Real
        | ParamType::Float
        | ParamType::Decimal { .. }
        | ParamType::Money => ColumnData::F64(Some(value as f64)),
        _ => ColumnData::I64(Some(value)),
    };
    Ok(data)
}

/// NULL carrying the wire type that matches the declared parameter type.
fn typed_null(ty: ParamType) -> ColumnData<'static> {
    match ty {
        ParamType::Bit => ColumnData::Bit(None),
        ParamType::TinyInt => ColumnData::U8(None),
        ParamType::SmallInt => ColumnData::I16(None),
        ParamType::Int => ColumnData::I32(None),
        ParamType::BigInt => ColumnData::I64(None),
        ParamType::Real => ColumnData::F32(None),
        ParamType::Float | ParamType::Decimal { .. } | ParamType::Money => ColumnData::F64(None),
        ParamType::VarBinary(_) => ColumnData::Binary(None),
        _ => ColumnData::String(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamDirection, StepParam, bind_params};

    fn bound(ty: ParamType, value: SqlValue) -> BoundParam {
        BoundParam {
            name: "p".into(),
            sql_type: ty,
            value,
            direction: ParamDirection::Input,
        }
    }

    #[test]
    fn integers_use_the_declared_width() {
        assert!(matches!(
            wire_value(&bound(ParamType::Int, SqlValue::Int(7))),
            Ok(ColumnData::I32(Some(7)))
        ));
        assert!(matches!(
            wire_value(&bound(ParamType::TinyInt, SqlValue::Int(255))),
            Ok(ColumnData::U8(Some(255)))
        ));
        assert!(matches!(
            wire_value(&bound(ParamType::SmallInt, SqlValue::Int(40_000))),
            Err(SqlChainError::ParameterError(_))
        ));
    }

    #[test]
    fn bits_bound_from_integers_travel_as_bits() {
        let bound = bind_params(&[StepParam::new("b", 1, ParamType::Bit)]).unwrap();
        assert!(matches!(wire_value(&bound[0]), Ok(ColumnData::Bit(Some(true)))));
    }

    #[test]
    fn nulls_are_typed() {
        assert!(matches!(
            wire_value(&bound(ParamType::BigInt, SqlValue::Null)),
            Ok(ColumnData::I64(None))
        ));
        assert!(matches!(
            wire_value(&bound(ParamType::NVarChar(None), SqlValue::Null)),
            Ok(ColumnData::String(None))
        ));
    }

    #[test]
    fn datetime_timestamps_are_sent_with_millisecond_precision() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 5, 6)
            .and_then(|d| d.and_hms_micro_opt(7, 8, 9, 123_456))
            .unwrap();
        let Ok(ColumnData::String(Some(text))) =
            wire_value(&bound(ParamType::DateTime, SqlValue::Timestamp(ts)))
        else {
            panic!("expected a string");
        };
        assert_eq!(text, "2024-05-06T07:08:09.123");
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::error::SqlChainError;

/// Values that can appear in a record set or be bound as a parameter.
///
/// ```rust
/// use sql_chain::prelude::*;
///
/// let v = SqlValue::Int(7);
/// assert_eq!(v.as_int(), Some(7));
/// assert!(SqlValue::Null.is_null());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let SqlValue::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let SqlValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(value) => Some(*value),
            SqlValue::Int(1) => Some(true),
            SqlValue::Int(0) => Some(false),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            SqlValue::Float(value) => Some(*value),
            SqlValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            SqlValue::Timestamp(value) => Some(*value),
            SqlValue::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let SqlValue::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Blob(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Parse ISO-8601 style timestamps, with or without a `T` separator and fraction.
pub(crate) fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// SQL Server type tag carried by every parameter.
///
/// Lengths of `None` mean `max` for the variable-length types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    Decimal { precision: u8, scale: u8 },
    Money,
    Char(u16),
    VarChar(Option<u16>),
    NChar(u16),
    NVarChar(Option<u16>),
    Text,
    NText,
    Date,
    DateTime,
    DateTime2,
    UniqueIdentifier,
    VarBinary(Option<u16>),
}

impl ParamType {
    /// Declared maximum character/byte length, when the type has one.
    #[must_use]
    pub fn max_len(&self) -> Option<usize> {
        match self {
            ParamType::Char(n) | ParamType::NChar(n) => Some(usize::from(*n)),
            ParamType::VarChar(n) | ParamType::NVarChar(n) | ParamType::VarBinary(n) => {
                n.map(usize::from)
            }
            _ => None,
        }
    }
}

/// Renders the T-SQL declaration used in `DECLARE` and `sp_executesql` parameter lists.
impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn len(n: Option<u16>) -> String {
            n.map_or_else(|| "max".to_string(), |n| n.to_string())
        }
        match self {
            ParamType::Bit => f.write_str("bit"),
            ParamType::TinyInt => f.write_str("tinyint"),
            ParamType::SmallInt => f.write_str("smallint"),
            ParamType::Int => f.write_str("int"),
            ParamType::BigInt => f.write_str("bigint"),
            ParamType::Real => f.write_str("real"),
            ParamType::Float => f.write_str("float"),
            ParamType::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            ParamType::Money => f.write_str("money"),
            ParamType::Char(n) => write!(f, "char({n})"),
            ParamType::VarChar(n) => write!(f, "varchar({})", len(*n)),
            ParamType::NChar(n) => write!(f, "nchar({n})"),
            ParamType::NVarChar(n) => write!(f, "nvarchar({})", len(*n)),
            ParamType::Text => f.write_str("text"),
            ParamType::NText => f.write_str("ntext"),
            ParamType::Date => f.write_str("date"),
            ParamType::DateTime => f.write_str("datetime"),
            ParamType::DateTime2 => f.write_str("datetime2"),
            ParamType::UniqueIdentifier => f.write_str("uniqueidentifier"),
            ParamType::VarBinary(n) => write!(f, "varbinary({})", len(*n)),
        }
    }
}

impl FromStr for ParamType {
    type Err = SqlChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        let (base, args) = match tag.split_once('(') {
            Some((base, rest)) => {
                let args = rest.strip_suffix(')').ok_or_else(|| unknown_tag(s))?;
                (base.trim(), Some(args.trim()))
            }
            None => (tag.as_str(), None),
        };

        let length = |default: Option<u16>| -> Result<Option<u16>, SqlChainError> {
            match args {
                None => Ok(default),
                Some("max") => Ok(None),
                Some(n) => n.parse::<u16>().map(Some).map_err(|_| unknown_tag(s)),
            }
        };
        let fixed = |default: u16| -> Result<u16, SqlChainError> {
            length(Some(default))?.ok_or_else(|| unknown_tag(s))
        };
        let no_args = |ty: ParamType| -> Result<ParamType, SqlChainError> {
            if args.is_some() {
                Err(unknown_tag(s))
            } else {
                Ok(ty)
            }
        };

        match base {
            "bit" => no_args(ParamType::Bit),
            "tinyint" => no_args(ParamType::TinyInt),
            "smallint" => no_args(ParamType::SmallInt),
            "int" | "integer" => no_args(ParamType::Int),
            "bigint" => no_args(ParamType::BigInt),
            "real" => no_args(ParamType::Real),
            "float" => no_args(ParamType::Float),
            "money" => no_args(ParamType::Money),
            "text" => no_args(ParamType::Text),
            "ntext" => no_args(ParamType::NText),
            "date" => no_args(ParamType::Date),
            "datetime" => no_args(ParamType::DateTime),
            "datetime2" => no_args(ParamType::DateTime2),
            "uniqueidentifier" => no_args(ParamType::UniqueIdentifier),
            "char" => Ok(ParamType::Char(fixed(1)?)),
            "nchar" => Ok(ParamType::NChar(fixed(1)?)),
            "varchar" => Ok(ParamType::VarChar(length(None)?)),
            "nvarchar" => Ok(ParamType::NVarChar(length(None)?)),
            "varbinary" => Ok(ParamType::VarBinary(length(None)?)),
            "decimal" | "numeric" => {
                let (precision, scale) = match args {
                    None => (18, 0),
                    Some(args) => {
                        let mut parts = args.split(',').map(str::trim);
                        let precision = parts
                            .next()
                            .and_then(|p| p.parse::<u8>().ok())
                            .ok_or_else(|| unknown_tag(s))?;
                        let scale = match parts.next() {
                            Some(sc) => sc.parse::<u8>().map_err(|_| unknown_tag(s))?,
                            None => 0,
                        };
                        if parts.next().is_some() {
                            return Err(unknown_tag(s));
                        }
                        (precision, scale)
                    }
                };
                if precision == 0 || precision > 38 || scale > precision {
                    return Err(unknown_tag(s));
                }
                Ok(ParamType::Decimal { precision, scale })
            }
            _ => Err(unknown_tag(s)),
        }
    }
}

fn unknown_tag(s: &str) -> SqlChainError {
    SqlChainError::ParameterError(format!("unrecognized type tag `{s}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tags_case_insensitively() {
        assert_eq!("INT".parse::<ParamType>().unwrap(), ParamType::Int);
        assert_eq!(
            "NVarChar".parse::<ParamType>().unwrap(),
            ParamType::NVarChar(None)
        );
        assert_eq!(
            "nvarchar(255)".parse::<ParamType>().unwrap(),
            ParamType::NVarChar(Some(255))
        );
        assert_eq!(
            "varchar(MAX)".parse::<ParamType>().unwrap(),
            ParamType::VarChar(None)
        );
        assert_eq!(
            "decimal(18, 2)".parse::<ParamType>().unwrap(),
            ParamType::Decimal {
                precision: 18,
                scale: 2
            }
        );
    }

    #[test]
    fn rejects_unknown_or_malformed_tags() {
        for tag in ["varchar2", "int(4)", "decimal(40,2)", "nvarchar(abc", "char(max)"] {
            let err = tag.parse::<ParamType>().unwrap_err();
            assert!(
                matches!(err, SqlChainError::ParameterError(_)),
                "{tag} gave {err:?}"
            );
        }
    }

    #[test]
    fn renders_declarations() {
        assert_eq!(ParamType::NVarChar(None).to_string(), "nvarchar(max)");
        assert_eq!(ParamType::Char(10).to_string(), "char(10)");
        assert_eq!(
            ParamType::Decimal {
                precision: 10,
                scale: 4
            }
            .to_string(),
            "decimal(10,4)"
        );
    }

    #[test]
    fn timestamps_parse_from_text() {
        let v = SqlValue::Text("2024-03-01 12:30:00".into());
        assert!(v.as_timestamp().is_some());
        let v = SqlValue::Text("2024-03-01T12:30:00.125".into());
        assert!(v.as_timestamp().is_some());
        assert!(SqlValue::Text("yesterday".into()).as_timestamp().is_none());
    }
}

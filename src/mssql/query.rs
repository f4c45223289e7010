use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_util::TryStreamExt;
use futures_util::io::{AsyncRead, AsyncWrite};
use tiberius::{Client, ColumnData, FromSql, Query, QueryItem, QueryStream};

use super::params::bind_query_params;
use crate::error::SqlChainError;
use crate::params::BoundParam;
use crate::results::RecordSet;
use crate::types::SqlValue;

/// Send one batch and collect every record set it produces, in order.
///
/// A batch without parameters goes through `simple_query`; anything with
/// parameters is sent as an RPC with `@P1..@Pn` bound in order.
pub(crate) async fn run_batch<S>(
    client: &mut Client<S>,
    sql: &str,
    params: &[BoundParam],
) -> Result<Vec<RecordSet>, SqlChainError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let stream = if params.is_empty() {
        client.simple_query(sql).await?
    } else {
        bind_query_params(sql, params)?.query(client).await?
    };
    collect_record_sets(stream).await
}

/// Run a statement that returns nothing, such as `BEGIN TRANSACTION`.
pub(crate) async fn run_control<S>(client: &mut Client<S>, sql: &str) -> Result<(), SqlChainError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    Query::new(sql).execute(client).await?;
    Ok(())
}

async fn collect_record_sets(mut stream: QueryStream<'_>) -> Result<Vec<RecordSet>, SqlChainError> {
    let mut sets: Vec<RecordSet> = Vec::new();

    while let Some(item) = stream.try_next().await? {
        match item {
            QueryItem::Metadata(meta) => {
                let columns = meta.columns().iter().map(|c| c.name().to_string()).collect();
                sets.push(RecordSet::new(columns));
            }
            QueryItem::Row(row) => {
                if sets.is_empty() {
                    let columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                    sets.push(RecordSet::new(columns));
                }
                let values = row
                    .into_iter()
                    .map(|data| column_value(&data))
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(set) = sets.last_mut() {
                    set.push_values(values);
                }
            }
        }
    }

    Ok(sets)
}

/// Map one wire value to a `SqlValue`.
fn column_value(data: &ColumnData<'static>) -> Result<SqlValue, SqlChainError> {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| SqlValue::Int(i64::from(v))),
        ColumnData::I16(v) => v.map(|v| SqlValue::Int(i64::from(v))),
        ColumnData::I32(v) => v.map(|v| SqlValue::Int(i64::from(v))),
        ColumnData::I64(v) => v.map(SqlValue::Int),
        ColumnData::F32(v) => v.map(|v| SqlValue::Float(f64::from(v))),
        ColumnData::F64(v) => v.map(SqlValue::Float),
        ColumnData::Bit(v) => v.map(SqlValue::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| SqlValue::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| SqlValue::Text(g.to_string().to_uppercase())),
        ColumnData::Binary(v) => v.as_ref().map(|b| SqlValue::Blob(b.to_vec())),
        ColumnData::Numeric(v) => v.as_ref().map(|n| SqlValue::Float(numeric_to_f64(n))),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)?.map(SqlValue::Timestamp)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(data)?
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(SqlValue::Timestamp),
        ColumnData::Time(_) => NaiveTime::from_sql(data)?.map(|t| SqlValue::Text(t.to_string())),
        ColumnData::DateTimeOffset(_) => {
            DateTime::<Utc>::from_sql(data)?.map(|dt| SqlValue::Timestamp(dt.naive_utc()))
        }
        // xml and anything newer come back as NULL; cast to nvarchar(max) to read them
        #[allow(unreachable_patterns)]
        _ => None,
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

#[allow(clippy::cast_precision_loss)]
fn numeric_to_f64(n: &tiberius::numeric::Numeric) -> f64 {
    n.value() as f64 / 10f64.powi(i32::from(n.scale()))
}

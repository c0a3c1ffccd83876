//! Column encodings: enums as text, timestamps as Unix milliseconds.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::model::{EventKind, IntakeStatus, JobStatus, RunStatus};

macro_rules! text_column {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_column!(EventKind);
text_column!(IntakeStatus);
text_column!(JobStatus);
text_column!(RunStatus);

pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub fn opt_millis(time: Option<DateTime<Utc>>) -> Option<i64> {
    time.map(to_millis)
}

/// Reads a millisecond timestamp column.
pub fn time_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

/// Reads a nullable millisecond timestamp column.
pub fn opt_time_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let millis: Option<i64> = row.get(idx)?;
    millis
        .map(|ms| {
            DateTime::from_timestamp_millis(ms)
                .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
        })
        .transpose()
}

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo};
use sqlx::{Encode, Postgres, Type};
use uuid::Uuid;

use crate::schema::ColumnType;

/// A single typed parameter or column value.
///
/// NULLs carry their column type so Postgres can resolve the parameter
/// without an explicit cast.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null(ColumnType),
    Bool(bool),
    Int4(i32),
    Int8(i64),
    Float8(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn column_type(&self) -> ColumnType {
        match self {
            SqlValue::Null(ty) => *ty,
            SqlValue::Bool(_) => ColumnType::Bool,
            SqlValue::Int4(_) => ColumnType::Int4,
            SqlValue::Int8(_) => ColumnType::Int8,
            SqlValue::Float8(_) => ColumnType::Float8,
            SqlValue::Text(_) => ColumnType::Text,
            SqlValue::Uuid(_) => ColumnType::Uuid,
            SqlValue::Timestamp(_) => ColumnType::Timestamp,
            SqlValue::TimestampTz(_) => ColumnType::TimestampTz,
            SqlValue::Json(_) => ColumnType::Json,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Drops the offset component of timestamps, keeping the UTC wall clock.
    pub fn without_offset(self) -> Self {
        match self {
            SqlValue::TimestampTz(at) => SqlValue::Timestamp(at.naive_utc()),
            SqlValue::Null(ty) => SqlValue::Null(ty.without_offset()),
            other => other,
        }
    }
}

/// Conversion of Rust field types into [`SqlValue`]s.
pub trait IntoSqlValue {
    const COLUMN_TYPE: ColumnType;

    fn into_sql_value(self) -> SqlValue;
}

macro_rules! into_sql_value {
    ($ty:ty, $column:ident, $variant:ident) => {
        impl IntoSqlValue for $ty {
            const COLUMN_TYPE: ColumnType = ColumnType::$column;

            fn into_sql_value(self) -> SqlValue {
                SqlValue::$variant(self.into())
            }
        }
    };
}

into_sql_value!(bool, Bool, Bool);
into_sql_value!(i32, Int4, Int4);
into_sql_value!(i64, Int8, Int8);
into_sql_value!(f64, Float8, Float8);
into_sql_value!(String, Text, Text);
into_sql_value!(&str, Text, Text);
into_sql_value!(Uuid, Uuid, Uuid);
into_sql_value!(NaiveDateTime, Timestamp, Timestamp);
into_sql_value!(DateTime<Utc>, TimestampTz, TimestampTz);
into_sql_value!(serde_json::Value, Json, Json);

impl IntoSqlValue for &String {
    const COLUMN_TYPE: ColumnType = ColumnType::Text;

    fn into_sql_value(self) -> SqlValue {
        SqlValue::Text(self.clone())
    }
}

impl<T: IntoSqlValue> IntoSqlValue for Option<T> {
    const COLUMN_TYPE: ColumnType = T::COLUMN_TYPE;

    fn into_sql_value(self) -> SqlValue {
        match self {
            Some(value) => value.into_sql_value(),
            None => SqlValue::Null(T::COLUMN_TYPE),
        }
    }
}

impl Type<Postgres> for SqlValue {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }
}

impl<'q> Encode<'q, Postgres> for SqlValue {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        match self {
            SqlValue::Null(_) => Ok(IsNull::Yes),
            SqlValue::Bool(v) => <bool as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            SqlValue::Int4(v) => <i32 as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            SqlValue::Int8(v) => <i64 as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            SqlValue::Float8(v) => <f64 as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            SqlValue::Text(v) => <String as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            SqlValue::Uuid(v) => <Uuid as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            SqlValue::Timestamp(v) => {
                <NaiveDateTime as Encode<'q, Postgres>>::encode_by_ref(v, buf)
            }
            SqlValue::TimestampTz(v) => {
                <DateTime<Utc> as Encode<'q, Postgres>>::encode_by_ref(v, buf)
            }
            SqlValue::Json(v) => {
                <serde_json::Value as Encode<'q, Postgres>>::encode_by_ref(v, buf)
            }
        }
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(self.column_type().pg_type_info())
    }
}

//! Static column descriptors and table naming.
//!
//! Every entity declares its writable scalar columns once, as a constant.
//! [`TableSchema`] resolves that declaration against a [`TableNaming`]
//! strategy and checks it before any SQL is generated.

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::PgTypeInfo;
use sqlx::{Postgres, Type};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::entity::{Entity, EntityId, IdKind};
use crate::error::{Result, UnitOfWorkError};
use crate::value::SqlValue;

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Bool,
    Int4,
    Int8,
    Float8,
    Text,
    Uuid,
    /// Timestamp without offset.
    Timestamp,
    /// Offset-aware timestamp.
    TimestampTz,
    Json,
}

impl ColumnType {
    pub fn pg_type_info(self) -> PgTypeInfo {
        match self {
            ColumnType::Bool => <bool as Type<Postgres>>::type_info(),
            ColumnType::Int4 => <i32 as Type<Postgres>>::type_info(),
            ColumnType::Int8 => <i64 as Type<Postgres>>::type_info(),
            ColumnType::Float8 => <f64 as Type<Postgres>>::type_info(),
            ColumnType::Text => <String as Type<Postgres>>::type_info(),
            ColumnType::Uuid => <Uuid as Type<Postgres>>::type_info(),
            ColumnType::Timestamp => <NaiveDateTime as Type<Postgres>>::type_info(),
            ColumnType::TimestampTz => <DateTime<Utc> as Type<Postgres>>::type_info(),
            ColumnType::Json => <serde_json::Value as Type<Postgres>>::type_info(),
        }
    }

    /// The store's native timestamp form has no offset component.
    pub fn without_offset(self) -> Self {
        match self {
            ColumnType::TimestampTz => ColumnType::Timestamp,
            other => other,
        }
    }
}

/// How a column takes part in writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// The identifier column. Exactly one per entity.
    Id,
    /// Written on insert and update.
    Value,
    /// Written on insert only, never by an update.
    InsertOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            kind: ColumnKind::Value,
        }
    }

    pub const fn id(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            kind: ColumnKind::Id,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn insert_only(mut self) -> Self {
        self.kind = ColumnKind::InsertOnly;
        self
    }

    /// Column type as sent through the bulk-load path.
    pub fn bulk_type(&self) -> ColumnType {
        self.ty.without_offset()
    }
}

/// Maps an entity type name to its table name.
#[derive(Clone)]
pub struct TableNaming(Arc<dyn Fn(&str) -> String + Send + Sync>);

impl TableNaming {
    /// Table name equals the type name.
    pub fn type_name() -> Self {
        Self(Arc::new(|name: &str| name.to_string()))
    }

    pub fn custom<F>(naming: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(naming))
    }

    /// `OrderLine` becomes `order_line`.
    pub fn snake_case() -> Self {
        Self::custom(to_snake_case)
    }

    pub fn table_for(&self, type_name: &str) -> String {
        (self.0)(type_name)
    }
}

impl Default for TableNaming {
    fn default() -> Self {
        Self::type_name()
    }
}

impl fmt::Debug for TableNaming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TableNaming(..)")
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Quotes an identifier for Postgres, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// A resolved, validated view of an entity's table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub entity: &'static str,
    pub table: String,
    pub columns: &'static [Column],
    id_index: usize,
}

impl TableSchema {
    /// Resolves the table of `T`, with `table` overriding both the entity's
    /// pinned table and the naming strategy.
    pub fn resolve<T: Entity>(naming: &TableNaming, table: Option<&str>) -> Result<Self> {
        let table = match (table, T::TABLE) {
            (Some(explicit), _) => explicit.to_string(),
            (None, Some(pinned)) => pinned.to_string(),
            (None, None) => naming.table_for(T::TYPE_NAME),
        };

        let mut id_columns = T::COLUMNS
            .iter()
            .enumerate()
            .filter(|(_, column)| column.kind == ColumnKind::Id);
        let id_index = match (id_columns.next(), id_columns.next()) {
            (Some((index, _)), None) => index,
            (None, _) => return Err(mismatch::<T>("no identifier column declared".to_string())),
            (Some(_), Some(_)) => {
                return Err(mismatch::<T>("more than one identifier column declared".to_string()))
            }
        };

        Ok(Self {
            entity: T::TYPE_NAME,
            table,
            columns: T::COLUMNS,
            id_index,
        })
    }

    pub fn id_column(&self) -> &Column {
        &self.columns[self.id_index]
    }

    pub fn quoted_table(&self) -> String {
        quote_ident(&self.table)
    }

    /// Collects `entity`'s values, checking them against the descriptor.
    pub fn values_of<T: Entity>(&self, entity: &T) -> Result<Vec<SqlValue>> {
        let values = entity.values();
        if values.len() != self.columns.len() {
            return Err(mismatch::<T>(format!(
                "{} columns declared but {} values produced",
                self.columns.len(),
                values.len()
            )));
        }
        for (column, value) in self.columns.iter().zip(&values) {
            if value.column_type() != column.ty {
                return Err(mismatch::<T>(format!(
                    "column {} is declared {:?} but holds {:?}",
                    column.name,
                    column.ty,
                    value.column_type()
                )));
            }
            if value.is_null() && !column.nullable {
                return Err(mismatch::<T>(format!("column {} is not nullable", column.name)));
            }
        }
        Ok(values)
    }

    /// Columns written by an insert: all of them, minus a store-assigned id.
    pub fn insert_columns<T: Entity>(&self) -> impl Iterator<Item = (usize, &Column)> {
        let skip_id = <T::Id as EntityId>::KIND == IdKind::StoreAssigned;
        self.columns
            .iter()
            .enumerate()
            .filter(move |(_, column)| !(skip_id && column.kind == ColumnKind::Id))
    }

    /// Columns written by an update.
    pub fn update_columns(&self) -> impl Iterator<Item = (usize, &Column)> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.kind == ColumnKind::Value)
    }

    pub fn select_list(&self) -> String {
        self.columns
            .iter()
            .map(|column| quote_ident(column.name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn mismatch<T: Entity>(reason: String) -> UnitOfWorkError {
    UnitOfWorkError::SchemaMismatch {
        entity: T::TYPE_NAME,
        reason,
    }
}

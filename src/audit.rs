use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::schema::{Column, ColumnType};
use crate::value::{IntoSqlValue, SqlValue};

/// Provenance metadata carried by auditable records.
///
/// `created`/`created_by` are written once, on insert. `last_modified` and
/// `last_modified_by` stay empty until the first update and then track the
/// most recent one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AuditFields {
    pub created: DateTime<Utc>,
    pub created_by: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub last_modified_by: Option<String>,
}

impl AuditFields {
    /// Column descriptors, in the order [`AuditFields::values`] produces them.
    pub const COLUMNS: [Column; 4] = [
        Column::new("created", ColumnType::TimestampTz).insert_only(),
        Column::new("created_by", ColumnType::Text).insert_only(),
        Column::new("last_modified", ColumnType::TimestampTz).nullable(),
        Column::new("last_modified_by", ColumnType::Text).nullable(),
    ];

    pub fn values(&self) -> [SqlValue; 4] {
        [
            self.created.into_sql_value(),
            (&self.created_by).into_sql_value(),
            self.last_modified.into_sql_value(),
            self.last_modified_by.clone().into_sql_value(),
        ]
    }

    /// Stamps creation, overwriting whatever the caller supplied.
    pub fn stamp_created(&mut self, at: DateTime<Utc>, by: &str) {
        self.created = at;
        self.created_by = by.to_string();
    }

    pub fn stamp_modified(&mut self, at: DateTime<Utc>, by: &str) {
        self.last_modified = Some(at);
        self.last_modified_by = Some(by.to_string());
    }
}

/// Capability of entities that want their provenance stamped.
pub trait Auditable {
    fn audit_fields(&self) -> &AuditFields;

    fn audit_fields_mut(&mut self) -> &mut AuditFields;
}

use audited_unit_of_work::{
    AuditFields, Auditable, Column, ColumnType, Entity, IntoSqlValue, SqlValue,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Auditable entity with a generated identifier, stored in "Customer".
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    #[sqlx(flatten)]
    pub audit: AuditFields,
}

impl Customer {
    /// A customer with a nil id, left for the unit of work to fill in.
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::nil(),
            name: name.to_string(),
            email: Some(format!("{}@example.com", name.to_lowercase())),
            audit: AuditFields::default(),
        }
    }
}

impl Entity for Customer {
    type Id = Uuid;

    const TYPE_NAME: &'static str = "Customer";

    const COLUMNS: &'static [Column] = &[
        Column::id("id", ColumnType::Uuid),
        Column::new("name", ColumnType::Text),
        Column::new("email", ColumnType::Text).nullable(),
        AuditFields::COLUMNS[0],
        AuditFields::COLUMNS[1],
        AuditFields::COLUMNS[2],
        AuditFields::COLUMNS[3],
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    fn values(&self) -> Vec<SqlValue> {
        let mut values = vec![
            self.id.into_sql_value(),
            (&self.name).into_sql_value(),
            self.email.clone().into_sql_value(),
        ];
        values.extend(self.audit.values());
        values
    }

    fn as_auditable_mut(&mut self) -> Option<&mut dyn Auditable> {
        Some(self)
    }
}

impl Auditable for Customer {
    fn audit_fields(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_fields_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }
}

/// Non-auditable entity with a store-assigned identifier.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub account: String,
    pub amount: i64,
    pub booked_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(account: &str, amount: i64, booked_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            account: account.to_string(),
            amount,
            booked_at,
        }
    }
}

impl Entity for LedgerEntry {
    type Id = i64;

    const TYPE_NAME: &'static str = "LedgerEntry";

    const TABLE: Option<&'static str> = Some("ledger_entries");

    const COLUMNS: &'static [Column] = &[
        Column::id("id", ColumnType::Int8),
        Column::new("account", ColumnType::Text),
        Column::new("amount", ColumnType::Int8),
        Column::new("booked_at", ColumnType::TimestampTz),
    ];

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into_sql_value(),
            (&self.account).into_sql_value(),
            self.amount.into_sql_value(),
            self.booked_at.into_sql_value(),
        ]
    }
}

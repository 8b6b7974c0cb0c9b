use sqlx::postgres::PgRow;
use sqlx::{Decode, FromRow, Postgres, Type};
use uuid::Uuid;

use crate::audit::Auditable;
use crate::schema::Column;
use crate::value::{IntoSqlValue, SqlValue};

/// Who produces identifier values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// Random identifiers, filled in before persisting when left at zero.
    Generated,
    /// Auto-increment identifiers, populated by the store.
    StoreAssigned,
}

pub trait EntityId:
    Copy
    + Send
    + Sync
    + Unpin
    + 'static
    + IntoSqlValue
    + Type<Postgres>
    + for<'r> Decode<'r, Postgres>
{
    const KIND: IdKind;

    /// Whether this is the zero value.
    fn is_unset(&self) -> bool;

    /// A fresh value, for [`IdKind::Generated`] identifiers only.
    fn generate() -> Option<Self>;
}

impl EntityId for Uuid {
    const KIND: IdKind = IdKind::Generated;

    fn is_unset(&self) -> bool {
        self.is_nil()
    }

    fn generate() -> Option<Self> {
        Some(Uuid::new_v4())
    }
}

impl EntityId for i32 {
    const KIND: IdKind = IdKind::StoreAssigned;

    fn is_unset(&self) -> bool {
        *self == 0
    }

    fn generate() -> Option<Self> {
        None
    }
}

impl EntityId for i64 {
    const KIND: IdKind = IdKind::StoreAssigned;

    fn is_unset(&self) -> bool {
        *self == 0
    }

    fn generate() -> Option<Self> {
        None
    }
}

/// A record persisted one-to-one in a table.
///
/// `COLUMNS` and [`Entity::values`] must agree in length, order and type;
/// the unit of work checks this before writing.
///
/// ```ignore
/// impl Entity for Customer {
///     type Id = Uuid;
///     const TYPE_NAME: &'static str = "Customer";
///     const COLUMNS: &'static [Column] = &[
///         Column::id("id", ColumnType::Uuid),
///         Column::new("name", ColumnType::Text),
///     ];
///     fn id(&self) -> Uuid { self.id }
///     fn set_id(&mut self, id: Uuid) { self.id = id }
///     fn values(&self) -> Vec<SqlValue> {
///         vec![self.id.into_sql_value(), (&self.name).into_sql_value()]
///     }
/// }
/// ```
pub trait Entity: for<'r> FromRow<'r, PgRow> + Send + Sync + Unpin {
    type Id: EntityId;

    const TYPE_NAME: &'static str;

    /// Pins the table name regardless of the naming strategy.
    const TABLE: Option<&'static str> = None;

    const COLUMNS: &'static [Column];

    fn id(&self) -> Self::Id;

    fn set_id(&mut self, id: Self::Id);

    fn values(&self) -> Vec<SqlValue>;

    /// Auditable entities return themselves here.
    fn as_auditable_mut(&mut self) -> Option<&mut dyn Auditable> {
        None
    }

    /// Assigns a fresh identifier when a generated-kind id is still zero.
    fn ensure_id(&mut self) {
        if Self::Id::KIND == IdKind::Generated && self.id().is_unset() {
            if let Some(id) = Self::Id::generate() {
                self.set_id(id);
            }
        }
    }
}

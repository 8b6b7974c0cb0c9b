//! Audited Unit of Work Module
//!
//! This module provides a PostgreSQL unit of work: one connection and one
//! transaction per logical operation, audit stamping of inserted and updated
//! entities, single-entity CRUD, raw query passthrough and `COPY`-based bulk
//! inserts.

pub mod audit;
mod bulk;
pub mod entity;
pub mod error;
pub mod executor;
pub mod factory;
pub mod schema;
pub mod settings;
pub mod transaction_aware;
pub mod unit_of_work;
pub mod user_context;
pub mod value;

pub use audit::{AuditFields, Auditable};
pub use entity::{Entity, EntityId, IdKind};
pub use error::{Result, UnitOfWorkError};
pub use executor::Executor;
pub use factory::{UnitOfWorkFactory, UnitOfWorkProvider};
pub use schema::{Column, ColumnKind, ColumnType, TableNaming, TableSchema};
pub use settings::DatabaseSettings;
pub use transaction_aware::{Completion, ListenerResult, TransactionAware};
pub use unit_of_work::{UnitOfWork, UnitOfWorkOptions};
pub use user_context::{CurrentUserContext, SharedUserContext, StaticUserContext};
pub use value::{IntoSqlValue, SqlValue};

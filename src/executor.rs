use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, Postgres, Transaction};
use std::fmt;

use crate::error::{Result, UnitOfWorkError};

/// Executor owns the connection a unit of work runs its statements on.
///
/// Nothing outside the owning unit of work touches the handle; statements
/// borrow it mutably, so at most one is in flight at a time.
pub enum Executor {
    /// An open transaction, holding its connection.
    Transaction(Transaction<'static, Postgres>),
    /// A bare connection; every statement auto-commits.
    AutoCommit(PoolConnection<Postgres>),
    /// The connection has been handed back.
    Released,
}

impl Executor {
    /// The live connection, bound to the transaction if there is one.
    pub fn connection(&mut self) -> Result<&mut PgConnection> {
        match self {
            Executor::Transaction(tx) => Ok(&mut **tx),
            Executor::AutoCommit(conn) => Ok(&mut **conn),
            Executor::Released => Err(UnitOfWorkError::Released),
        }
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self, Executor::Transaction(_))
    }

    pub fn is_released(&self) -> bool {
        matches!(self, Executor::Released)
    }

    /// Takes the transaction out for commit or rollback, leaving `Released`.
    pub(crate) fn take_transaction(&mut self) -> Option<Transaction<'static, Postgres>> {
        match std::mem::replace(self, Executor::Released) {
            Executor::Transaction(tx) => Some(tx),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Drops whatever handle is held, returning the connection to its pool.
    pub(crate) fn release(&mut self) {
        *self = Executor::Released;
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Executor::Transaction(_) => "Transaction",
            Executor::AutoCommit(_) => "AutoCommit",
            Executor::Released => "Released",
        };
        f.debug_tuple("Executor").field(&state).finish()
    }
}

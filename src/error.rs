/// Errors raised by a unit of work and its factory.
#[derive(Debug, thiserror::Error)]
pub enum UnitOfWorkError {
    /// Opening the connection or beginning the transaction failed.
    #[error("Connection failed: {0}")]
    Connection(#[source] sqlx::Error),

    /// Bulk insert was requested on a connection that cannot bulk-load.
    #[error("Bulk insert into {table} is not supported: {reason}")]
    UnsupportedCapability { table: String, reason: &'static str },

    /// Constraint violations, SQL errors and mapping failures reported by the store.
    #[error("Database error: {0}")]
    Store(#[from] sqlx::Error),

    /// The entity's column descriptor and its values disagree.
    #[error("Entity {entity} cannot be mapped: {reason}")]
    SchemaMismatch { entity: &'static str, reason: String },

    /// A single-row query matched more than one row.
    #[error("Query returned more than one row, expected exactly one")]
    MultipleRows,

    /// An earlier statement failed, so the store rolled the transaction back
    /// instead of committing it.
    #[error("Transaction was aborted by an earlier failure and has been rolled back")]
    TransactionAborted,

    /// The connection was already handed back by commit, rollback or dispose.
    #[error("Unit of work has already released its connection")]
    Released,

    #[error("Transaction listener failed: {0}")]
    Listener(String),

    /// Implicit rollback during disposal failed. Only ever logged.
    #[error("Implicit rollback during disposal failed: {0}")]
    DisposalRollback(#[source] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, UnitOfWorkError>;

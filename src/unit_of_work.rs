use chrono::Utc;
use futures::TryStreamExt;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::bulk::{self, BulkLayout};
use crate::entity::{Entity, EntityId, IdKind};
use crate::error::{Result, UnitOfWorkError};
use crate::executor::Executor;
use crate::schema::{quote_ident, TableNaming, TableSchema};
use crate::transaction_aware::{Completion, TransactionAware};
use crate::user_context::CurrentUserContext;
use crate::value::{IntoSqlValue, SqlValue};

/// Settings shared by every unit of work a factory creates.
#[derive(Debug, Clone)]
pub struct UnitOfWorkOptions {
    pub table_naming: TableNaming,
    /// Whether the connection may use `COPY ... FROM STDIN`.
    ///
    /// Timestamps are copied as UTC text without an offset, which the store
    /// reads in the session `TimeZone`. sqlx sets it to UTC when it connects;
    /// connections that override `TimeZone` (connect options, or a pooler
    /// that shares sessions) would shift copied timestamps.
    pub bulk_copy: bool,
    /// Rejects writes in the store. Auto-commit connections opened this way
    /// are closed rather than returned to the pool.
    pub read_only: bool,
    pub bulk_chunk_bytes: usize,
}

impl Default for UnitOfWorkOptions {
    fn default() -> Self {
        Self {
            table_naming: TableNaming::default(),
            bulk_copy: true,
            read_only: false,
            bulk_chunk_bytes: bulk::DEFAULT_CHUNK_BYTES,
        }
    }
}

/// One connection and, unless auto-committing, one transaction.
///
/// Every operation runs inside the same transaction. Operations take
/// `&mut self`, so a unit of work serves one caller at a time; run work in
/// parallel on separate units of work.
///
/// The transaction ends with the first of [`commit`](Self::commit) or
/// [`rollback`](Self::rollback); later calls to either are ignored.
/// [`dispose`](Self::dispose) rolls back anything unresolved and hands the
/// connection back. Dropping without disposing does the same, without
/// waiting for the rollback.
pub struct UnitOfWork {
    executor: Executor,
    user_context: Arc<dyn CurrentUserContext>,
    options: UnitOfWorkOptions,
    completed: bool,
    /// A statement failed inside the transaction; the store will only roll back.
    aborted: bool,
    listeners: Vec<Arc<dyn TransactionAware>>,
}

impl UnitOfWork {
    /// Opens a connection from `pool` and, if `transactional`, begins a
    /// transaction on it.
    #[instrument(skip(pool, user_context, options), fields(read_only = options.read_only))]
    pub async fn open(
        pool: &PgPool,
        user_context: Arc<dyn CurrentUserContext>,
        options: UnitOfWorkOptions,
        transactional: bool,
    ) -> Result<Self> {
        let executor = if transactional {
            let mut tx = pool.begin().await.map_err(UnitOfWorkError::Connection)?;
            if options.read_only {
                sqlx::query("SET TRANSACTION READ ONLY")
                    .execute(&mut *tx)
                    .await
                    .map_err(UnitOfWorkError::Connection)?;
            }
            Executor::Transaction(tx)
        } else {
            let mut conn = pool.acquire().await.map_err(UnitOfWorkError::Connection)?;
            if options.read_only {
                // The session setting must not reach the pool's next borrower
                conn.close_on_drop();
                sqlx::query("SET SESSION CHARACTERISTICS AS TRANSACTION READ ONLY")
                    .execute(&mut *conn)
                    .await
                    .map_err(UnitOfWorkError::Connection)?;
            }
            Executor::AutoCommit(conn)
        };
        debug!("Unit of work opened");

        Ok(Self {
            executor,
            user_context,
            options,
            completed: !transactional,
            aborted: false,
            listeners: Vec::new(),
        })
    }

    /// The live connection, bound to this unit of work's transaction.
    ///
    /// Failures of statements run here directly are not seen by
    /// [`commit`](Self::commit); roll back after one.
    pub fn executor(&mut self) -> Result<&mut PgConnection> {
        self.executor.connection()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Whether a failed statement has left the transaction unable to commit.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn is_transactional(&self) -> bool {
        self.executor.is_transactional()
    }

    pub fn register_transaction_aware(&mut self, listener: Arc<dyn TransactionAware>) {
        self.listeners.push(listener);
    }

    /// Inserts `entity`, stamping its creation audit fields if it is auditable.
    ///
    /// A zero generated-kind id is replaced before writing; a store-assigned
    /// id is read back from the store.
    pub async fn insert<T: Entity>(&mut self, entity: &mut T) -> Result<()> {
        let schema = self.schema::<T>(None)?;
        entity.ensure_id();
        if let Some(auditable) = entity.as_auditable_mut() {
            let user_id = self.user_context.user_id();
            auditable.audit_fields_mut().stamp_created(Utc::now(), &user_id);
        }
        let values = schema.values_of(entity)?;
        let columns: Vec<_> = schema.insert_columns::<T>().collect();

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} (", schema.quoted_table()));
        let mut names = builder.separated(", ");
        for (_, column) in &columns {
            names.push(quote_ident(column.name));
        }
        builder.push(") VALUES (");
        let mut binds = builder.separated(", ");
        for (index, _) in &columns {
            binds.push_bind(values[*index].clone());
        }
        builder.push(")");

        let conn = self.executor.connection()?;
        if <T::Id as EntityId>::KIND == IdKind::StoreAssigned {
            builder
                .push(" RETURNING ")
                .push(quote_ident(schema.id_column().name));
            let id: std::result::Result<T::Id, _> =
                builder.build_query_scalar().fetch_one(conn).await;
            let id = self.track(id)?;
            entity.set_id(id);
        } else {
            let result = builder.build().execute(conn).await;
            self.track(result)?;
        }
        debug!(entity = T::TYPE_NAME, table = %schema.table, "Inserted entity");
        Ok(())
    }

    /// Updates `entity` by id, stamping its modification audit fields.
    ///
    /// Insert-only columns are never written. Returns whether a row matched.
    pub async fn update<T: Entity>(&mut self, entity: &mut T) -> Result<bool> {
        let schema = self.schema::<T>(None)?;
        if let Some(auditable) = entity.as_auditable_mut() {
            let user_id = self.user_context.user_id();
            auditable.audit_fields_mut().stamp_modified(Utc::now(), &user_id);
        }
        let values = schema.values_of(entity)?;
        let columns: Vec<_> = schema.update_columns().collect();
        if columns.is_empty() {
            return Err(UnitOfWorkError::SchemaMismatch {
                entity: T::TYPE_NAME,
                reason: "no updatable columns declared".to_string(),
            });
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("UPDATE {} SET ", schema.quoted_table()));
        let mut assignments = builder.separated(", ");
        for (index, column) in &columns {
            assignments
                .push(quote_ident(column.name))
                .push_unseparated(" = ")
                .push_bind_unseparated(values[*index].clone());
        }
        builder
            .push(" WHERE ")
            .push(quote_ident(schema.id_column().name))
            .push(" = ")
            .push_bind(entity.id().into_sql_value());

        let result = builder.build().execute(self.executor.connection()?).await;
        Ok(self.track(result)?.rows_affected() > 0)
    }

    /// Deletes `entity` by id. Returns whether a row matched.
    pub async fn delete<T: Entity>(&mut self, entity: &T) -> Result<bool> {
        let schema = self.schema::<T>(None)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1",
            schema.quoted_table(),
            quote_ident(schema.id_column().name)
        );
        let result = sqlx::query(&sql)
            .bind(entity.id().into_sql_value())
            .execute(self.executor.connection()?)
            .await;
        Ok(self.track(result)?.rows_affected() > 0)
    }

    pub async fn get<T: Entity>(&mut self, id: T::Id) -> Result<Option<T>> {
        let schema = self.schema::<T>(None)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            schema.select_list(),
            schema.quoted_table(),
            quote_ident(schema.id_column().name)
        );
        let entity = sqlx::query_as::<_, T>(&sql)
            .bind(id.into_sql_value())
            .fetch_optional(self.executor.connection()?)
            .await;
        self.track(entity)
    }

    pub async fn get_all<T: Entity>(&mut self) -> Result<Vec<T>> {
        let schema = self.schema::<T>(None)?;
        let sql = format!(
            "SELECT {} FROM {}",
            schema.select_list(),
            schema.quoted_table()
        );
        let entities = sqlx::query_as::<_, T>(&sql)
            .fetch_all(self.executor.connection()?)
            .await;
        self.track(entities)
    }

    pub async fn query<R>(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<R>>
    where
        R: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut query = sqlx::query_as::<_, R>(sql);
        for param in params {
            query = query.bind(param.clone());
        }
        let rows = query.fetch_all(self.executor.connection()?).await;
        self.track(rows)
    }

    /// Returns the only row of the result; no rows or several are errors.
    pub async fn query_single<R>(&mut self, sql: &str, params: &[SqlValue]) -> Result<R>
    where
        R: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut query = sqlx::query_as::<_, R>(sql);
        for param in params {
            query = query.bind(param.clone());
        }
        let (first, second) = {
            let mut rows = query.fetch(self.executor.connection()?);
            let first = rows.try_next().await;
            let second = match first {
                Ok(Some(_)) => rows.try_next().await,
                _ => Ok(None),
            };
            (first, second)
        };
        match (self.track(first)?, self.track(second)?) {
            (Some(row), None) => Ok(row),
            (None, _) => Err(UnitOfWorkError::Store(sqlx::Error::RowNotFound)),
            (Some(_), Some(_)) => Err(UnitOfWorkError::MultipleRows),
        }
    }

    pub async fn query_first_or_default<R>(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<R>>
    where
        R: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut query = sqlx::query_as::<_, R>(sql);
        for param in params {
            query = query.bind(param.clone());
        }
        let row = query.fetch_optional(self.executor.connection()?).await;
        self.track(row)
    }

    /// Runs a statement and returns the number of rows it affected.
    pub async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param.clone());
        }
        let result = query.execute(self.executor.connection()?).await;
        Ok(self.track(result)?.rows_affected())
    }

    /// Writes `items` with one `COPY` instead of one statement per row.
    ///
    /// All rows share one creation timestamp and actor. Zero generated-kind
    /// ids are assigned in place; store-assigned ids are left to the store
    /// and not read back. `table` overrides the entity's table name.
    #[instrument(skip(self, items), fields(entity = T::TYPE_NAME, rows = items.len()))]
    pub async fn bulk_insert<T: Entity>(
        &mut self,
        items: &mut [T],
        table: Option<&str>,
    ) -> Result<u64> {
        let schema = self.schema::<T>(table)?;
        self.ensure_bulk_load(&schema)?;
        let layout = BulkLayout::new::<T>(&schema);
        debug!(table = %schema.table, columns = ?layout.column_types(), "Prepared bulk insert");

        let now = Utc::now();
        let user_id = self.user_context.user_id();
        for item in items.iter_mut() {
            item.ensure_id();
            if let Some(auditable) = item.as_auditable_mut() {
                auditable.audit_fields_mut().stamp_created(now, &user_id);
            }
        }
        if items.is_empty() {
            return Ok(0);
        }

        let chunk_bytes = self.options.bulk_chunk_bytes.max(1);
        let conn = self.executor.connection()?;
        let rows = match bulk::copy_rows(conn, &layout, items, chunk_bytes).await {
            Ok(rows) => rows,
            Err(err) => {
                // Any failure once COPY has started fails the transaction too
                self.aborted |= self.executor.is_transactional();
                return Err(err);
            }
        };
        info!(table = %schema.table, rows, "Bulk insert completed");
        Ok(rows)
    }

    /// Commits the transaction. Ignored once the unit of work has completed.
    ///
    /// If a statement failed earlier the store can only roll back: the
    /// transaction is rolled back, listeners see [`Completion::RolledBack`]
    /// and [`UnitOfWorkError::TransactionAborted`] is returned.
    #[instrument(skip(self))]
    pub async fn commit(&mut self) -> Result<()> {
        if self.completed {
            debug!("Unit of work already completed, commit ignored");
            return Ok(());
        }
        if self.aborted {
            warn!("Transaction aborted by an earlier failure, rolling back instead of committing");
            if let Err(err) = self.rollback().await {
                warn!(error = %err, "Rollback of aborted transaction failed");
            }
            return Err(UnitOfWorkError::TransactionAborted);
        }
        self.completed = true;
        if let Some(tx) = self.executor.take_transaction() {
            tx.commit().await?;
            debug!("Transaction committed");
        }
        Self::notify(self.listeners.clone(), Completion::Committed).await
    }

    /// Rolls back the transaction. Ignored once the unit of work has completed.
    #[instrument(skip(self))]
    pub async fn rollback(&mut self) -> Result<()> {
        if self.completed {
            debug!("Unit of work already completed, rollback ignored");
            return Ok(());
        }
        self.completed = true;
        if let Some(tx) = self.executor.take_transaction() {
            tx.rollback().await?;
            debug!("Transaction rolled back");
        }
        Self::notify(self.listeners.clone(), Completion::RolledBack).await
    }

    /// Rolls back if still unresolved, then releases the connection.
    ///
    /// Never fails: a failed implicit rollback is logged and swallowed,
    /// which leaves the transaction's outcome to the server.
    #[instrument(skip(self))]
    pub async fn dispose(mut self) {
        if !self.completed {
            self.completed = true;
            if let Some(tx) = self.executor.take_transaction() {
                warn!("Unit of work disposed without commit or rollback, rolling back");
                match tx.rollback().await {
                    Ok(()) => {
                        let listeners = self.listeners.clone();
                        if let Err(err) = Self::notify(listeners, Completion::RolledBack).await {
                            warn!(error = %err, "Listener failed after implicit rollback");
                        }
                    }
                    Err(err) => {
                        let err = UnitOfWorkError::DisposalRollback(err);
                        warn!(error = %err, "Transaction outcome is unknown");
                    }
                }
            }
        }
        self.executor.release();
        debug!("Unit of work disposed");
    }

    async fn notify(
        listeners: Vec<Arc<dyn TransactionAware>>,
        completion: Completion,
    ) -> Result<()> {
        for listener in listeners {
            listener
                .on_completed(completion)
                .await
                .map_err(UnitOfWorkError::Listener)?;
        }
        Ok(())
    }

    /// Marks the transaction aborted when the store rejected a statement.
    fn track<R>(&mut self, result: std::result::Result<R, sqlx::Error>) -> Result<R> {
        if let Err(sqlx::Error::Database(_)) = &result {
            self.aborted |= self.executor.is_transactional();
        }
        result.map_err(UnitOfWorkError::from)
    }

    fn schema<T: Entity>(&self, table: Option<&str>) -> Result<TableSchema> {
        TableSchema::resolve::<T>(&self.options.table_naming, table)
    }

    fn ensure_bulk_load(&self, schema: &TableSchema) -> Result<()> {
        if self.executor.is_released() {
            return Err(UnitOfWorkError::Released);
        }
        let reason = if !self.options.bulk_copy {
            "bulk copy is disabled for this connection"
        } else if self.options.read_only {
            "the unit of work is read-only"
        } else {
            return Ok(());
        };
        Err(UnitOfWorkError::UnsupportedCapability {
            table: schema.table.clone(),
            reason,
        })
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.completed && self.executor.is_transactional() {
            warn!("Unit of work dropped without commit or rollback, rolling back");
        }
    }
}

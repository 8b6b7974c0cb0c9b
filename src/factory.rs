use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::warn;

use crate::error::{Result, UnitOfWorkError};
use crate::schema::TableNaming;
use crate::settings::DatabaseSettings;
use crate::unit_of_work::{UnitOfWork, UnitOfWorkOptions};
use crate::user_context::CurrentUserContext;

/// Source of fresh units of work, for code that should not depend on the
/// concrete factory.
#[async_trait]
pub trait UnitOfWorkProvider: Send + Sync {
    /// A new transactional unit of work on its own connection.
    async fn create_unit_of_work(&self) -> Result<UnitOfWork>;
}

/// Creates units of work bound to one connection string and one user context.
///
/// Connections come from a lazily-connecting pool; nothing is opened until
/// the first unit of work is created.
#[derive(Clone)]
pub struct UnitOfWorkFactory {
    pool: PgPool,
    user_context: Arc<dyn CurrentUserContext>,
    options: UnitOfWorkOptions,
}

impl UnitOfWorkFactory {
    pub fn new(connection_string: &str, user_context: Arc<dyn CurrentUserContext>) -> Result<Self> {
        Self::from_settings(&DatabaseSettings::new(connection_string), user_context)
    }

    pub fn from_settings(
        settings: &DatabaseSettings,
        user_context: Arc<dyn CurrentUserContext>,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout())
            .connect_lazy(&settings.url)
            .map_err(UnitOfWorkError::Connection)?;
        let options = UnitOfWorkOptions {
            bulk_copy: settings.bulk_copy,
            read_only: settings.read_only,
            ..UnitOfWorkOptions::default()
        };
        Ok(Self {
            pool,
            user_context,
            options,
        })
    }

    /// Uses an existing pool with default options.
    pub fn with_pool(pool: PgPool, user_context: Arc<dyn CurrentUserContext>) -> Self {
        Self {
            pool,
            user_context,
            options: UnitOfWorkOptions::default(),
        }
    }

    pub fn with_table_naming(mut self, table_naming: TableNaming) -> Self {
        self.options.table_naming = table_naming;
        self
    }

    pub fn with_options(mut self, options: UnitOfWorkOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &UnitOfWorkOptions {
        &self.options
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn create_unit_of_work(&self) -> Result<UnitOfWork> {
        self.open(true).await
    }

    /// A unit of work whose statements auto-commit one by one.
    pub async fn create_auto_commit(&self) -> Result<UnitOfWork> {
        self.open(false).await
    }

    /// Runs `work` in a fresh unit of work, committing if it succeeds and
    /// rolling back if it fails. The unit of work is disposed either way.
    ///
    /// ```ignore
    /// let id = factory
    ///     .in_transaction(|uow| Box::pin(async move {
    ///         let mut customer = Customer::new("Ada");
    ///         uow.insert(&mut customer).await?;
    ///         Ok(customer.id)
    ///     }))
    ///     .await?;
    /// ```
    pub async fn in_transaction<F, R>(&self, work: F) -> Result<R>
    where
        F: for<'a> FnOnce(&'a mut UnitOfWork) -> BoxFuture<'a, Result<R>> + Send,
        R: Send,
    {
        let mut uow = self.create_unit_of_work().await?;
        let outcome = match work(&mut uow).await {
            Ok(value) => uow.commit().await.map(|()| value),
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "Rollback after failed work also failed");
                }
                Err(err)
            }
        };
        uow.dispose().await;
        outcome
    }

    async fn open(&self, transactional: bool) -> Result<UnitOfWork> {
        UnitOfWork::open(
            &self.pool,
            Arc::clone(&self.user_context),
            self.options.clone(),
            transactional,
        )
        .await
    }
}

#[async_trait]
impl UnitOfWorkProvider for UnitOfWorkFactory {
    async fn create_unit_of_work(&self) -> Result<UnitOfWork> {
        self.open(true).await
    }
}

use async_trait::async_trait;

/// How a unit of work's transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Committed,
    RolledBack,
}

/// Result returned by completion listeners. The error is reported verbatim.
pub type ListenerResult = std::result::Result<(), String>;

/// Components that react to the end of a unit of work's transaction.
///
/// Listeners are registered on a `UnitOfWork` and told about the outcome
/// once the store has confirmed it: after a successful commit, after an
/// explicit rollback, or after the implicit rollback of a disposal. Use
/// them to invalidate caches or publish work that must only happen once
/// the data is durable.
#[async_trait]
pub trait TransactionAware: Send + Sync {
    async fn on_completed(&self, completion: Completion) -> ListenerResult;
}

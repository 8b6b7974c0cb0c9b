use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use audited_unit_of_work::{Completion, ListenerResult, TransactionAware};

/// Records every completion it is told about.
#[derive(Default)]
pub struct RecordingListener {
    completions: RwLock<Vec<Completion>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn completions(&self) -> Vec<Completion> {
        self.completions.read().clone()
    }
}

#[async_trait]
impl TransactionAware for RecordingListener {
    async fn on_completed(&self, completion: Completion) -> ListenerResult {
        self.completions.write().push(completion);
        Ok(())
    }
}

/// Fails on every notification.
pub struct FailingListener;

#[async_trait]
impl TransactionAware for FailingListener {
    async fn on_completed(&self, _completion: Completion) -> ListenerResult {
        Err("cache invalidation failed".to_string())
    }
}

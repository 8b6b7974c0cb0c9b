use parking_lot::RwLock;
use std::sync::Arc;

/// Answers "who is acting now" for audit stamping.
pub trait CurrentUserContext: Send + Sync {
    fn user_id(&self) -> String;
}

impl<C: CurrentUserContext + ?Sized> CurrentUserContext for Arc<C> {
    fn user_id(&self) -> String {
        (**self).user_id()
    }
}

/// A context that always reports the same identity.
#[derive(Debug, Clone)]
pub struct StaticUserContext {
    user_id: String,
}

impl StaticUserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

impl CurrentUserContext for StaticUserContext {
    fn user_id(&self) -> String {
        self.user_id.clone()
    }
}

/// A context whose identity can be switched while it is shared.
///
/// Useful for workers that act on behalf of different principals over time:
/// every unit of work created afterwards stamps the new identity, while
/// a bulk insert already in flight keeps the one it captured.
#[derive(Debug, Clone)]
pub struct SharedUserContext {
    user_id: Arc<RwLock<String>>,
}

impl SharedUserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Arc::new(RwLock::new(user_id.into())),
        }
    }

    pub fn set_user_id(&self, user_id: impl Into<String>) {
        *self.user_id.write() = user_id.into();
    }
}

impl CurrentUserContext for SharedUserContext {
    fn user_id(&self) -> String {
        self.user_id.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_context_reflects_switch_in_every_clone() {
        let context = SharedUserContext::new("alice");
        let clone = context.clone();

        context.set_user_id("system");

        assert_eq!(clone.user_id(), "system");
    }

    #[test]
    fn arc_delegates_to_inner_context() {
        let context: Arc<dyn CurrentUserContext> = Arc::new(StaticUserContext::new("bob"));
        assert_eq!(context.user_id(), "bob");
    }
}

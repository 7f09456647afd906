use async_trait::async_trait;

use crate::error::{ModelError, Result};

/// Work handed to a dispatcher. It must run exactly once.
pub type DispatchedAction = Box<dyn FnOnce() + Send>;

/// Marshals model mutations onto the execution context the host requires,
/// such as a UI thread.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn invoke(&self, action: DispatchedAction) -> Result<()>;
}

/// Runs the action on the calling task.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

#[async_trait]
impl Dispatcher for InlineDispatcher {
    async fn invoke(&self, action: DispatchedAction) -> Result<()> {
        action();
        Ok(())
    }
}

/// Runs the action on tokio's blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingDispatcher;

#[async_trait]
impl Dispatcher for BlockingDispatcher {
    async fn invoke(&self, action: DispatchedAction) -> Result<()> {
        tokio::task::spawn_blocking(action)
            .await
            .map_err(|e| ModelError::Dispatcher(e.to_string()))
    }
}

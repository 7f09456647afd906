use std::fmt;
use std::sync::Arc;

use modelgraph_core::{ObserverList, Subscription};
use serde::Serialize;

/// Argument passed to commands. Untyped, the way presentation layers bind it.
pub type CommandParameter = serde_json::Value;

pub type ExecuteFn = Arc<dyn Fn(&CommandParameter) -> anyhow::Result<()> + Send + Sync>;
pub type CanExecuteFn = Arc<dyn Fn(&CommandParameter) -> bool + Send + Sync>;

/// Raised by `Command::invalidate` so bound controls re-query `can_execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandInvalidated {
    pub command: String,
}

/// A named action exposed by a model, with an optional guard.
pub struct Command {
    name: String,
    execute: ExecuteFn,
    can_execute: Option<CanExecuteFn>,
    can_execute_changed: ObserverList<CommandInvalidated>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("guarded", &self.can_execute.is_some())
            .finish()
    }
}

impl Command {
    pub fn new<F>(name: impl Into<String>, execute: F) -> Self
    where
        F: Fn(&CommandParameter) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            execute: Arc::new(execute),
            can_execute: None,
            can_execute_changed: ObserverList::new(),
        }
    }

    pub fn with_can_execute<F>(mut self, can_execute: F) -> Self
    where
        F: Fn(&CommandParameter) -> bool + Send + Sync + 'static,
    {
        self.can_execute = Some(Arc::new(can_execute));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when no guard was supplied.
    pub fn can_execute(&self, parameter: &CommandParameter) -> bool {
        self.can_execute
            .as_ref()
            .map(|guard| guard(parameter))
            .unwrap_or(true)
    }

    /// Runs the command body without consulting the guard.
    pub fn execute(&self, parameter: &CommandParameter) -> anyhow::Result<()> {
        (self.execute)(parameter)
    }

    pub fn invalidate(&self) {
        self.can_execute_changed.emit(&CommandInvalidated {
            command: self.name.clone(),
        });
    }

    pub fn on_can_execute_changed<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CommandInvalidated) + Send + Sync + 'static,
    {
        self.can_execute_changed.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn unguarded_command_can_always_execute() {
        let command = Command::new("save", |_| Ok(()));
        assert!(command.can_execute(&json!(null)));
        assert!(command.execute(&json!(null)).is_ok());
    }

    #[test]
    fn guard_reads_parameter() {
        let command = Command::new("open", |_| Ok(()))
            .with_can_execute(|p| p.as_str().map(|s| !s.is_empty()).unwrap_or(false));
        assert!(command.can_execute(&json!("file.txt")));
        assert!(!command.can_execute(&json!("")));
        assert!(!command.can_execute(&json!(3)));
    }

    #[test]
    fn invalidate_notifies_subscribers() {
        let command = Command::new("refresh", |_| Ok(()));
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = command.on_can_execute_changed(move |event| {
            assert_eq!(event.command, "refresh");
            h.fetch_add(1, Ordering::SeqCst);
        });

        command.invalidate();
        command.invalidate();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}

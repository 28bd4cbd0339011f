//! Execution hooks fired around every handler call.

use std::fmt;

use osapi_core::RequestItem;
use tracing::debug;

/// Observer notified before and after each handler invocation.
///
/// `executed` fires exactly once per `executing`, including when the handler
/// returns an error or panics. It fires when the synchronous call returns,
/// not when a deferred reply completes.
pub trait ExecutionListener: Send + Sync + fmt::Debug {
    fn executing(&self, operation: &str, item: &RequestItem);

    fn executed(&self, operation: &str, item: &RequestItem);
}

/// Listener that logs both hooks at `debug` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl ExecutionListener for TracingListener {
    fn executing(&self, operation: &str, item: &RequestItem) {
        debug!(
            service = item.service(),
            operation,
            transport = %item.transport(),
            "executing"
        );
    }

    fn executed(&self, operation: &str, item: &RequestItem) {
        debug!(
            service = item.service(),
            operation,
            transport = %item.transport(),
            "executed"
        );
    }
}

/// Guard pairing one `executing` call with one `executed` call on drop.
pub(crate) struct ExecutionScope<'a> {
    listener: &'a dyn ExecutionListener,
    operation: &'a str,
    item: &'a RequestItem,
}

impl<'a> ExecutionScope<'a> {
    pub(crate) fn enter(
        listener: &'a dyn ExecutionListener,
        operation: &'a str,
        item: &'a RequestItem,
    ) -> Self {
        listener.executing(operation, item);
        Self {
            listener,
            operation,
            item,
        }
    }
}

impl Drop for ExecutionScope<'_> {
    fn drop(&mut self) {
        self.listener.executed(self.operation, self.item);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    use osapi_core::RequestContext;
    use parking_lot::Mutex;

    use super::*;

    /// Listener recording every hook as `"executing:op"` / `"executed:op"`.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingListener {
        pub(crate) events: Mutex<Vec<String>>,
    }

    impl RecordingListener {
        pub(crate) fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    impl ExecutionListener for RecordingListener {
        fn executing(&self, operation: &str, _item: &RequestItem) {
            self.events.lock().push(format!("executing:{operation}"));
        }

        fn executed(&self, operation: &str, _item: &RequestItem) {
            self.events.lock().push(format!("executed:{operation}"));
        }
    }

    fn item() -> RequestItem {
        RequestItem::rpc("test", "get", serde_json::Map::new(), RequestContext::default())
    }

    #[test]
    fn scope_pairs_hooks_on_success() {
        let listener = RecordingListener::default();
        let item = item();
        {
            let _scope = ExecutionScope::enter(&listener, "test.get", &item);
            assert_eq!(listener.events(), vec!["executing:test.get"]);
        }
        assert_eq!(
            listener.events(),
            vec!["executing:test.get", "executed:test.get"]
        );
    }

    #[test]
    fn scope_fires_executed_on_error_path() {
        let listener = RecordingListener::default();
        let item = item();
        let run = || -> anyhow::Result<()> {
            let _scope = ExecutionScope::enter(&listener, "test.fail", &item);
            anyhow::bail!("boom")
        };
        assert!(run().is_err());
        assert_eq!(
            listener.events(),
            vec!["executing:test.fail", "executed:test.fail"]
        );
    }

    #[test]
    fn scope_fires_executed_on_panic() {
        let listener = RecordingListener::default();
        let item = item();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _scope = ExecutionScope::enter(&listener, "test.panic", &item);
            panic!("handler blew up");
        }));
        assert!(result.is_err());
        assert_eq!(
            listener.events(),
            vec!["executing:test.panic", "executed:test.panic"]
        );
    }

    #[test]
    fn tracing_listener_accepts_both_hooks() {
        let item = item();
        TracingListener.executing("test.get", &item);
        TracingListener.executed("test.get", &item);
    }
}

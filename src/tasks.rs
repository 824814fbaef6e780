//! Background task orchestration: one handle per task category, each owning
//! its own log buffer, result slot and running flag. At most one run per
//! category is in flight; a second start request is rejected, not queued.

use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Task categories exposed over the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Import,
    RawgSync,
    IgdbSync,
}

impl TaskKind {
    pub fn slug(&self) -> &'static str {
        match self {
            TaskKind::Import => "import",
            TaskKind::RawgSync => "rawg-sync",
            TaskKind::IgdbSync => "igdb-sync",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "import" => Some(TaskKind::Import),
            "rawg-sync" => Some(TaskKind::RawgSync),
            "igdb-sync" => Some(TaskKind::IgdbSync),
            _ => None,
        }
    }
}

/// Append-only progress log for one task run. Lines are mirrored to tracing
/// and kept in memory for HTTP polling; the buffer is reset when the next
/// run begins.
#[derive(Default)]
pub struct TaskLog {
    lines: Mutex<Vec<String>>,
}

impl TaskLog {
    pub fn push(&self, msg: impl Into<String>) {
        let msg = msg.into();
        info!(target: "task", "{msg}");
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(msg);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[derive(Debug, Serialize)]
pub struct TaskStatus {
    pub running: bool,
    pub logs: Vec<String>,
    pub result: Option<Value>,
}

/// State for one task category.
pub struct TaskHandle {
    running: AtomicBool,
    log: Arc<TaskLog>,
    result: Mutex<Option<Value>>,
}

impl TaskHandle {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            log: Arc::new(TaskLog::default()),
            result: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Arc<TaskLog> {
        Arc::clone(&self.log)
    }

    /// Claim the category for a new run. On success the previous run's log
    /// and result are discarded.
    fn try_begin(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.log.clear();
        *self
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        true
    }

    fn finish(&self, result: Value) {
        *self
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(result);
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus {
            running: self.is_running(),
            logs: self.log.snapshot(),
            result: self
                .result
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Reset log and result without affecting a run in progress.
    pub fn clear(&self) {
        self.log.clear();
        *self
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Registry of the three task handles.
pub struct TaskRegistry {
    import: Arc<TaskHandle>,
    rawg_sync: Arc<TaskHandle>,
    igdb_sync: Arc<TaskHandle>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            import: Arc::new(TaskHandle::new()),
            rawg_sync: Arc::new(TaskHandle::new()),
            igdb_sync: Arc::new(TaskHandle::new()),
        }
    }

    pub fn handle(&self, kind: TaskKind) -> Arc<TaskHandle> {
        match kind {
            TaskKind::Import => Arc::clone(&self.import),
            TaskKind::RawgSync => Arc::clone(&self.rawg_sync),
            TaskKind::IgdbSync => Arc::clone(&self.igdb_sync),
        }
    }

    /// Fire-and-forget run of `make`'s future on a tokio task. Returns false
    /// without side effects when the category already has a run in flight.
    pub fn spawn<F, Fut>(&self, kind: TaskKind, make: F) -> bool
    where
        F: FnOnce(Arc<TaskLog>) -> Fut,
        Fut: Future<Output = Value> + Send + 'static,
    {
        let handle = self.handle(kind);
        if !handle.try_begin() {
            return false;
        }
        let fut = make(handle.log());
        tokio::spawn(async move {
            let result = fut.await;
            handle.finish(result);
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn second_start_for_same_category_is_rejected() {
        let registry = TaskRegistry::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let accepted = registry.spawn(TaskKind::RawgSync, |log| async move {
            log.push("working");
            let _ = rx.await;
            json!({ "success": true })
        });
        assert!(accepted);

        // Same category: rejected while running.
        assert!(!registry.spawn(TaskKind::RawgSync, |_| async { json!({}) }));
        // Different category: unaffected.
        assert!(registry.spawn(TaskKind::IgdbSync, |_| async { json!({}) }));

        tx.send(()).unwrap();
        // Give the worker a moment to finish and publish its result.
        for _ in 0..50 {
            if !registry.handle(TaskKind::RawgSync).is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let status = registry.handle(TaskKind::RawgSync).status();
        assert!(!status.running);
        assert_eq!(status.logs, vec!["working".to_string()]);
        assert_eq!(status.result, Some(json!({ "success": true })));

        // Category is reusable after completion, and the new run resets state.
        assert!(registry.spawn(TaskKind::RawgSync, |_| async { json!({ "run": 2 }) }));
    }

    #[tokio::test]
    async fn clear_resets_log_and_result_only() {
        let registry = TaskRegistry::new();
        let handle = registry.handle(TaskKind::Import);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        registry.spawn(TaskKind::Import, |log| async move {
            log.push("step 1");
            let _ = rx.await;
            json!({ "done": true })
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        handle.clear();
        let status = handle.status();
        assert!(status.running, "clear must not stop a run in progress");
        assert!(status.logs.is_empty());
        assert!(status.result.is_none());
        tx.send(()).unwrap();
    }

    #[test]
    fn task_kind_slugs_round_trip() {
        for kind in [TaskKind::Import, TaskKind::RawgSync, TaskKind::IgdbSync] {
            assert_eq!(TaskKind::from_slug(kind.slug()), Some(kind));
        }
        assert_eq!(TaskKind::from_slug("bogus"), None);
    }
}

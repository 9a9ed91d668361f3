//! The resource manager collaborator (§6): the scheduler submits placed
//! containers to it and it invokes the completion callback exactly once,
//! on a thread of its own choosing. The real launcher (e.g. YARN/Kubernetes)
//! lives outside this crate; this module defines the trait boundary plus a
//! deterministic in-process test double used by the scheduler's own tests.

use crate::application::AppId;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Invoked exactly once when every container of an application has
/// terminated. The resource manager calls this from an arbitrary thread.
pub type OnFinished = Box<dyn FnOnce(AppId) + Send>;

pub trait ResourceManager: Send + Sync {
    /// Submit `app_id`'s placed containers (already recorded by the
    /// cluster) for execution, and arrange for `on_finished` to run once
    /// they have all terminated.
    fn submit(&self, app_id: AppId, on_finished: OnFinished);
}

/// A resource manager double that completes every submitted application
/// after a short fixed delay on a background thread. Used by the
/// scheduler's own tests and the CLI demo; not a substitute for a real
/// launcher.
pub struct MockResourceManager {
    pub completion_delay: Duration,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl MockResourceManager {
    pub fn new(completion_delay: Duration) -> Self {
        Self {
            completion_delay,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn immediate() -> Self {
        Self::new(Duration::from_millis(0))
    }

    /// Block until every completion thread spawned so far has finished.
    pub fn join_all(&self) {
        let mut handles = self.handles.lock().unwrap();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl ResourceManager for MockResourceManager {
    fn submit(&self, app_id: AppId, on_finished: OnFinished) {
        let delay = self.completion_delay;
        let handle = thread::spawn(move || {
            thread::sleep(delay);
            on_finished(app_id);
        });
        self.handles.lock().unwrap().push(handle);
    }
}

/// A resource manager wrapper that lets a test trigger completion for a
/// specific application on demand, from the test's own thread, instead of
/// a timer.
pub struct ManualResourceManager {
    pending: Mutex<std::collections::HashMap<AppId, OnFinished>>,
}

impl ManualResourceManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(std::collections::HashMap::new()),
        })
    }

    pub fn finish(&self, app_id: AppId) {
        let callback = self.pending.lock().unwrap().remove(&app_id);
        if let Some(callback) = callback {
            callback(app_id);
        }
    }
}

impl ResourceManager for ManualResourceManager {
    fn submit(&self, app_id: AppId, on_finished: OnFinished) {
        self.pending.lock().unwrap().insert(app_id, on_finished);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_mock_resource_manager_invokes_callback_once() {
        let rm = MockResourceManager::new(Duration::from_millis(5));
        let seen = Arc::new(AtomicU64::new(0));
        let seen_clone = seen.clone();
        rm.submit(
            42,
            Box::new(move |app_id| {
                seen_clone.store(app_id, Ordering::SeqCst);
            }),
        );
        rm.join_all();
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_manual_resource_manager_waits_for_finish() {
        let rm = ManualResourceManager::new();
        let seen = Arc::new(AtomicU64::new(0));
        let seen_clone = seen.clone();
        rm.submit(
            7,
            Box::new(move |app_id| {
                seen_clone.store(app_id, Ordering::SeqCst);
            }),
        );
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        rm.finish(7);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }
}

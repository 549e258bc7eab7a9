//! Task spawning and lock helpers shared by the session, publisher and providers

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Spawn an async task on the current Tokio runtime.
///
/// Panics when called outside a runtime, like `tokio::spawn`.
pub(crate) fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    // Wrap the provided future in a profiling scope so spawned tasks are easier
    // to identify in profiling traces. When profiling is disabled this is a no-op.
    #[cfg(feature = "profiling")]
    {
        tokio::spawn(async move {
            profiling::scope!(
                "runtime::spawn",
                format!("task_type={}", std::any::type_name::<F>()).as_str()
            );
            future.await
        })
    }
    #[cfg(not(feature = "profiling"))]
    {
        tokio::spawn(future)
    }
}

/// Check if we're running inside a tokio runtime context
pub(crate) fn in_runtime_context() -> bool {
    tokio::runtime::Handle::try_current().is_ok()
}

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Every critical section in this crate leaves its data consistent before it can panic,
/// so the poisoned value is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
        tracing::warn!("Mutex poisoned; recovering");
        poisoned.into_inner()
    })
}

/// Handle to a background task that is aborted when dropped
#[derive(Debug)]
pub(crate) struct TaskGuard(tokio::task::JoinHandle<()>);

impl TaskGuard {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self(spawn(future))
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

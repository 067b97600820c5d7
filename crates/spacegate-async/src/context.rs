//! Cancellable execution scopes.
//!
//! A [`Context`] owns the async work started on behalf of one component.
//! Disposing it aborts that work and refuses new work. Child contexts are
//! disposed together with their parent.

use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{AsyncError, Result};

/// A cancellation scope. Cloning shares the scope.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    name: String,
    disposed: watch::Sender<bool>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    children: StdMutex<Vec<Context>>,
}

impl Context {
    /// Create a new root scope.
    pub fn new(name: impl Into<String>) -> Self {
        let (disposed, _) = watch::channel(false);
        Self {
            inner: Arc::new(ContextInner {
                name: name.into(),
                disposed,
                tasks: StdMutex::new(Vec::new()),
                children: StdMutex::new(Vec::new()),
            }),
        }
    }

    /// Create a child scope that is disposed when this one is.
    ///
    /// Deriving from a disposed scope yields a disposed child.
    pub fn derive(&self, name: impl Into<String>) -> Self {
        let child = Context::new(name);
        let mut children = self.inner.children.lock().unwrap_or_else(|e| e.into_inner());
        // `dispose` raises the flag before draining, so checking under the
        // lock cannot miss it.
        if self.is_disposed() {
            child.inner.disposed.send_replace(true);
            return child;
        }
        children.retain(|c| !c.is_disposed());
        children.push(child.clone());
        child
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_disposed(&self) -> bool {
        *self.inner.disposed.borrow()
    }

    /// Dispose the scope. Idempotent.
    ///
    /// Wakes every `cancelled()` waiter, aborts spawned tasks and disposes
    /// child scopes.
    pub fn dispose(&self) {
        if self.inner.disposed.send_replace(true) {
            return;
        }
        debug!(context = %self.inner.name, "disposing context");

        let tasks = std::mem::take(&mut *self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            task.abort();
        }

        let children =
            std::mem::take(&mut *self.inner.children.lock().unwrap_or_else(|e| e.into_inner()));
        for child in children {
            child.dispose();
        }
    }

    /// Resolve once the scope is disposed.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.disposed.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|disposed| *disposed).await;
    }

    /// Fail with [`AsyncError::Disposed`] if the scope is gone.
    pub fn check(&self) -> Result<()> {
        if self.is_disposed() {
            Err(AsyncError::Disposed(self.inner.name.clone()))
        } else {
            Ok(())
        }
    }

    /// Run a future until it completes or the scope is disposed.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(AsyncError::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// Spawn a task owned by this scope.
    ///
    /// The task is aborted when the scope is disposed.
    pub fn spawn<F>(&self, name: &str, fut: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.check()?;

        let task_name = name.to_string();
        let context = self.inner.name.clone();
        let handle = tokio::spawn(async move {
            fut.await;
            debug!(context = %context, task = %task_name, "task finished");
        });

        let mut tasks = self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_disposed() {
            handle.abort();
            return self.check();
        }
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
        Ok(())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.inner.name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = Context::new("test");
        assert_eq!(ctx.run(async { 5 }).await, Ok(5));
    }

    #[tokio::test]
    async fn test_run_refuses_after_dispose() {
        let ctx = Context::new("test");
        ctx.dispose();
        ctx.dispose();
        assert_eq!(
            ctx.run(async { 5 }).await,
            Err(AsyncError::Disposed("test".into()))
        );
        assert!(ctx.spawn("late", async {}).is_err());
    }

    #[tokio::test]
    async fn test_dispose_cancels_in_flight_run() {
        let ctx = Context::new("test");
        let runner = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.run(tokio::time::sleep(Duration::from_secs(60))).await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.dispose();

        assert_eq!(runner.await.unwrap(), Err(AsyncError::Cancelled));
    }

    #[tokio::test]
    async fn test_dispose_aborts_spawned_tasks() {
        let ctx = Context::new("test");
        let finished = Arc::new(AtomicBool::new(false));
        {
            let finished = finished.clone();
            ctx.spawn("sleeper", async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                finished.store(true, Ordering::SeqCst);
            })
            .unwrap();
        }

        ctx.dispose();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dispose_racing_spawn_aborts_everything() {
        let runtime = tokio::runtime::Handle::current();
        for _ in 0..20 {
            let ctx = Context::new("race");
            let finished = Arc::new(AtomicBool::new(false));

            let spawners: Vec<_> = (0..4)
                .map(|_| {
                    let ctx = ctx.clone();
                    let finished = finished.clone();
                    let runtime = runtime.clone();
                    std::thread::spawn(move || {
                        let _enter = runtime.enter();
                        let _ = ctx.spawn("late", async move {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            finished.store(true, Ordering::SeqCst);
                        });
                    })
                })
                .collect();
            ctx.dispose();
            for spawner in spawners {
                spawner.join().unwrap();
            }

            tokio::time::sleep(Duration::from_millis(80)).await;
            assert!(!finished.load(Ordering::SeqCst));
        }
    }

    #[tokio::test]
    async fn test_child_disposed_with_parent() {
        let parent = Context::new("parent");
        let child = parent.derive("child");
        assert!(!child.is_disposed());

        parent.dispose();
        assert!(child.is_disposed());
        child.cancelled().await;

        let orphan = parent.derive("late");
        assert!(orphan.is_disposed());
    }
}

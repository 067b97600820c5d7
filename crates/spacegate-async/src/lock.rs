//! FIFO asynchronous lock.
//!
//! Serializes async operations on a shared instance. Waiters are served in
//! call order and only one holder runs at a time. Re-acquiring the same lock
//! from inside its own critical section deadlocks; callers must not nest.

use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

/// A fair async mutex with an optional holder tag for diagnostics.
#[derive(Clone, Default)]
pub struct Lock {
    mutex: Arc<Mutex<()>>,

    /// Tag of the current holder, if any.
    tag: Arc<StdMutex<Option<String>>>,

    /// Diagnostic mode: warn when a waiter is blocked this long.
    warn_after: Option<Duration>,
}

/// Proof of holding a [`Lock`]. Released on drop.
pub struct LockGuard {
    _guard: OwnedMutexGuard<()>,
    tag: Arc<StdMutex<Option<String>>>,
}

impl LockGuard {
    /// Release explicitly.
    pub fn release(self) {}
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // The tag slot must be cleared before the inner guard lets the next
        // waiter in. Fields drop after this body runs.
        let mut tag = self.tag.lock().unwrap_or_else(|e| e.into_inner());
        *tag = None;
    }
}

impl Lock {
    /// Create a lock without diagnostics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a lock that warns when a waiter is blocked longer than `threshold`.
    ///
    /// The warning names the holder's tag. The waiter keeps waiting.
    pub fn with_diagnostics(threshold: Duration) -> Self {
        Self {
            warn_after: Some(threshold),
            ..Self::default()
        }
    }

    /// Wait for the lock.
    pub async fn acquire(&self, tag: Option<&str>) -> LockGuard {
        let acquire = self.mutex.clone().lock_owned();
        tokio::pin!(acquire);

        let guard = match self.warn_after {
            None => acquire.await,
            Some(threshold) => match tokio::time::timeout(threshold, &mut acquire).await {
                Ok(guard) => guard,
                Err(_) => {
                    warn!(
                        holder = ?self.tag(),
                        waiter = ?tag,
                        threshold_ms = threshold.as_millis() as u64,
                        "lock held longer than threshold"
                    );
                    acquire.await
                }
            },
        };

        *self.tag.lock().unwrap_or_else(|e| e.into_inner()) = tag.map(str::to_string);

        LockGuard {
            _guard: guard,
            tag: self.tag.clone(),
        }
    }

    /// Run a future while holding the lock.
    ///
    /// The lock is released on every exit path, including when the returned
    /// future is dropped early.
    pub async fn execute_synchronized<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        self.execute_synchronized_tagged(None, task).await
    }

    /// Like [`Lock::execute_synchronized`] with a holder tag.
    pub async fn execute_synchronized_tagged<F, T>(&self, tag: Option<&str>, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.acquire(tag).await;
        task.await
    }

    /// Tag of the current holder.
    pub fn tag(&self) -> Option<String> {
        self.tag.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Check whether the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.mutex.try_lock().is_err()
    }
}

impl std::fmt::Debug for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock")
            .field("tag", &self.tag())
            .field("warn_after", &self.warn_after)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn test_fifo_ordering() {
        let lock = Lock::new();
        let events = Arc::new(StdMutex::new(Vec::new()));

        let t1 = {
            let events = events.clone();
            lock.execute_synchronized(async move {
                events.lock().unwrap().push("T1 start");
                tokio::time::sleep(Duration::from_millis(50)).await;
                events.lock().unwrap().push("T1 end");
                "A"
            })
        };
        let t2 = {
            let events = events.clone();
            lock.execute_synchronized(async move {
                events.lock().unwrap().push("T2 start");
                "B"
            })
        };

        let (a, b) = tokio::join!(t1, t2);
        assert_eq!((a, b), ("A", "B"));
        assert_eq!(
            *events.lock().unwrap(),
            vec!["T1 start", "T1 end", "T2 start"]
        );
    }

    #[tokio::test]
    async fn test_release_on_error_path() {
        let lock = Lock::new();

        let result: std::result::Result<(), &str> =
            lock.execute_synchronized(async { Err("boom") }).await;
        assert!(result.is_err());
        assert!(!lock.is_locked());

        let value = lock.execute_synchronized(async { 7 }).await;
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_guard_tracks_tag() {
        let lock = Lock::new();
        let guard = lock.acquire(Some("open")).await;
        assert_eq!(lock.tag().as_deref(), Some("open"));
        assert!(lock.is_locked());

        guard.release();
        assert_eq!(lock.tag(), None);
        assert!(!lock.is_locked());
    }

    #[tokio::test]
    async fn test_diagnostics_waiter_still_acquires() {
        let lock = Lock::with_diagnostics(Duration::from_millis(5));
        let guard = lock.acquire(Some("slow")).await;

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.execute_synchronized(async { 1 }).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());
        drop(guard);

        assert_eq!(waiter.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dropped_waiter_releases_queue_slot() {
        let lock = Lock::new();
        let guard = lock.acquire(None).await;

        let abandoned = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.execute_synchronized(async {}).await })
        };
        tokio::task::yield_now().await;
        abandoned.abort();
        drop(guard);

        assert_eq!(lock.execute_synchronized(async { "ok" }).await, "ok");
    }
}

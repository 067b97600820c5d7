//! Credential processors and the consumer that wraps each one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use spacegate_async::{AsyncError, Context};
use spacegate_core::Credential;
use tracing::{debug, warn};

use crate::error::Result;

/// Receives every credential accepted by a space, in log order.
///
/// A processor must not call back into the state machine that delivers to
/// it; delivery happens inside the state machine's critical section.
#[async_trait]
pub trait CredentialProcessor: Send + Sync {
    async fn process_credential(&self, credential: &Credential) -> anyhow::Result<()>;
}

/// One registered processor with its own cancellation scope.
///
/// Until `ready` flips, the consumer only receives backlog replay. After it
/// flips, the state machine delivers live credentials.
pub struct CredentialConsumer {
    processor: Arc<dyn CredentialProcessor>,
    ctx: Context,
    ready: AtomicBool,
}

impl CredentialConsumer {
    pub fn new(processor: Arc<dyn CredentialProcessor>) -> Self {
        Self {
            processor,
            ctx: Context::new("credential-consumer"),
            ready: AtomicBool::new(false),
        }
    }

    pub fn processor(&self) -> &Arc<dyn CredentialProcessor> {
        &self.processor
    }

    /// Check whether this consumer wraps `processor`.
    pub fn wraps(&self, processor: &Arc<dyn CredentialProcessor>) -> bool {
        Arc::as_ptr(&self.processor) as *const () == Arc::as_ptr(processor) as *const ()
    }

    /// Whether live credentials are delivered.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub(crate) fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.ctx.is_disposed()
    }

    /// Fails if the consumer was already closed.
    pub fn open(&self) -> Result<()> {
        self.ctx.check()?;
        Ok(())
    }

    /// Dispose the scope, aborting in-flight delivery.
    pub fn close(&self) {
        self.ctx.dispose();
    }

    /// Deliver one credential. Failures stay inside this consumer.
    ///
    /// Returns true if the processor handled it.
    pub async fn process(&self, credential: &Credential) -> bool {
        match self
            .ctx
            .run(self.processor.process_credential(credential))
            .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(
                    credential = ?credential.id,
                    error = %e,
                    "credential processor failed"
                );
                false
            }
            Err(AsyncError::Cancelled) | Err(AsyncError::Disposed(_)) => {
                debug!(credential = ?credential.id, "delivery to closed consumer skipped");
                false
            }
            Err(e) => {
                warn!(error = %e, "credential delivery aborted");
                false
            }
        }
    }
}

impl std::fmt::Debug for CredentialConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialConsumer")
            .field("ready", &self.is_ready())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

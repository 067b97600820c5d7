//! Deadline helper.

use std::future::Future;
use std::time::Duration;

use crate::error::{AsyncError, Result};

/// Await `fut`, failing with [`AsyncError::Timeout`] after `duration`.
pub async fn with_timeout<F, T>(duration: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| AsyncError::Timeout {
            what: what.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let out = with_timeout(Duration::from_secs(1), "quick", async { 3 }).await;
        assert_eq!(out, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires() {
        let out = with_timeout(
            Duration::from_millis(10),
            "init",
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await;
        assert_eq!(
            out,
            Err(AsyncError::Timeout {
                what: "init".into()
            })
        );
    }
}

//! Bounded gateway calls.

use std::future::Future;
use std::time::Duration;

use crate::ports::PaymentError;

/// Runs a gateway call under a deadline; an elapsed deadline is a timeout error.
pub(crate) async fn bounded<T, F>(
    timeout: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, PaymentError>
where
    F: Future<Output = Result<T, PaymentError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = timeout.as_millis() as u64,
                "Gateway call timed out"
            );
            Err(PaymentError::timeout(operation))
        }
    }
}

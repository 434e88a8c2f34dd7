//! Timeout and bounded-retry wrapper for external calls.
//!
//! Every outbound call (knowledge source, generator) goes through
//! [`with_policy`]. A timeout counts as a transient upstream failure; only
//! transient failures are retried, at most `max_retries` times.

use std::future::Future;

use tracing::{debug, warn};

use crate::config::CallPolicy;
use crate::error::{DraftsmithError, Result};

/// Run `op` under `policy`, labelling failures with `service`.
pub async fn with_policy<T, F, Fut>(policy: &CallPolicy, service: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        let outcome = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(DraftsmithError::transient(
                service,
                format!("timed out after {}s", policy.timeout.as_secs_f32()),
            )),
        };

        match outcome {
            Ok(value) => {
                if attempt > 0 {
                    debug!(service, attempt, "call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(service, attempt, error = %e, "transient failure, retrying");
                tokio::time::sleep(policy.backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

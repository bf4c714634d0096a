//! Bounded, fixed-interval retry for backend round trips

use crate::error::{ProvisioningError, ResourceRef};
use crate::model::RetryPolicy;
use std::fmt;
use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Run `operation` until it succeeds or the policy's budget is spent.
///
/// Only the final failure escalates, as `ResourceProvisioningFailed` carrying the
/// resource and the number of attempts made. Earlier failures are logged and
/// retried after `policy.interval`. Cancelling `cancel` aborts both the in-flight
/// call and the wait with `ProvisioningError::Cancelled`.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    resource: &ResourceRef,
    mut operation: F,
) -> Result<T, ProvisioningError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        if cancel.is_cancelled() {
            return Err(cancelled(resource));
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled(resource)),
            result = operation() => result,
        };

        let err = match result {
            Ok(value) => {
                if attempt > 1 {
                    info!(resource = %resource, attempt, "Backend call succeeded after retrying");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let over_budget = policy
            .max_elapsed
            .is_some_and(|cap| started.elapsed() + policy.interval > cap);

        if attempt >= max_attempts || over_budget {
            error!(
                resource = %resource,
                attempts = attempt,
                error = %err,
                "Giving up on backend call"
            );
            return Err(ProvisioningError::ResourceProvisioningFailed {
                kind: resource.kind,
                name: resource.name.clone(),
                attempts: attempt,
                last_error: err.to_string(),
            });
        }

        warn!(
            resource = %resource,
            attempt,
            max_attempts,
            error = %err,
            "Backend call failed, waiting for the emulator to finish initializing"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled(resource)),
            () = tokio::time::sleep(policy.interval) => {}
        }
    }
}

fn cancelled(resource: &ResourceRef) -> ProvisioningError {
    warn!(resource = %resource, "Provisioning cancelled");
    ProvisioningError::Cancelled {
        kind: resource.kind,
        name: resource.name.clone(),
    }
}

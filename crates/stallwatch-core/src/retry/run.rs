//! Retry loop: run a closure until success or policy says stop.

use super::classify;
use super::error::RequestError;
use super::policy::{RetryDecision, RetryPolicy};

/// Runs a closure until it succeeds or the retry policy says to stop.
/// On retryable failure, sleeps for the backoff duration then tries again.
/// `what` names the operation in log lines.
pub fn run_with_retry<T, F>(policy: &RetryPolicy, what: &str, mut f: F) -> Result<T, RequestError>
where
    F: FnMut() -> Result<T, RequestError>,
{
    let mut attempt = 1u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tracing::warn!(attempt, error = %e, "{} failed, retrying in {:?}", what, d);
                        std::thread::sleep(d);
                        attempt += 1;
                    }
                }
            }
        }
    }
}

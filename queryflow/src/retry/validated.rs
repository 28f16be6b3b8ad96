//! Generate, validate and correct loop.

use super::RetryConfig;
use serde::Serialize;
use std::future::Future;

/// Result of [`generate_validated`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedOutcome<T> {
    /// The last candidate produced: the first valid one, or the final attempt.
    pub candidate: T,
    /// Number of generation attempts made.
    pub attempts: usize,
    /// The validation issue of the returned candidate, if it is invalid.
    pub error: Option<String>,
    /// Issues fed back as hints, in attempt order.
    pub corrections: Vec<String>,
}

impl<T> ValidatedOutcome<T> {
    /// Returns true if the candidate passed validation.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Generates a candidate and regenerates it until it validates.
///
/// `generate` receives the 1-based attempt number and, after a failed
/// attempt, the issue the validator reported so it can correct itself.
/// `validate` reports at most one issue per candidate. When the budget is
/// spent the last candidate is returned together with its issue.
///
/// Generation errors are not retried here; they end the loop immediately.
pub async fn generate_validated<T, E, G, Fut, V>(
    config: &RetryConfig,
    key: &str,
    mut generate: G,
    mut validate: V,
) -> Result<ValidatedOutcome<T>, E>
where
    G: FnMut(usize, Option<String>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    V: FnMut(&T) -> Result<(), String>,
{
    let mut corrections = Vec::new();
    let mut hint = None;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let candidate = generate(attempt, hint.take()).await?;

        let issue = match validate(&candidate) {
            Ok(()) => {
                return Ok(ValidatedOutcome {
                    candidate,
                    attempts: attempt,
                    error: None,
                    corrections,
                });
            }
            Err(issue) => issue,
        };

        if !config.allows_retry_after(attempt) {
            tracing::warn!(key, attempts = attempt, error = %issue, "Validation attempts exhausted");
            return Ok(ValidatedOutcome {
                candidate,
                attempts: attempt,
                error: Some(issue),
                corrections,
            });
        }

        let delay = config.delay(u32::try_from(attempt).unwrap_or(u32::MAX));
        tracing::debug!(
            key,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %issue,
            "Candidate failed validation, regenerating"
        );
        corrections.push(issue.clone());
        hint = Some(issue);

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

//! Bounded exponential backoff around transient statement failures.
//!
//! Transport errors and timeouts are not retried: they surface on the first
//! occurrence. Neither are server failures that repeating cannot fix, see
//! [`ServerError::is_transient`](crate::transport::ServerError::is_transient).

use graphmap_core::RetryPolicy;

use crate::client::{GraphError, Session};
use crate::transport::ResultSet;

impl Session {
    /// Execute `statement` until it succeeds or `policy` runs out of attempts.
    ///
    /// `on_failure` builds the error for a failed attempt from the server
    /// message. A permanent failure or a single-attempt policy returns that
    /// error as is; otherwise exhaustion wraps the last one in
    /// [`GraphError::RetriesExhausted`].
    pub async fn execute_retrying(
        &mut self,
        statement: &str,
        policy: &RetryPolicy,
        on_failure: impl Fn(String) -> GraphError,
    ) -> Result<ResultSet, GraphError> {
        let attempts = policy.attempts();
        let mut attempt = 1;
        loop {
            let result = self.execute(statement).await?;
            let Some(error) = result.error() else {
                return Ok(result);
            };
            let message = error.message.clone();

            if !error.is_transient() {
                tracing::debug!(attempt, code = error.code, error = %message, "Statement failed permanently");
                return Err(on_failure(message));
            }
            if attempt >= attempts {
                let last = on_failure(message);
                if attempts == 1 {
                    return Err(last);
                }
                return Err(GraphError::RetriesExhausted {
                    attempts,
                    last: Box::new(last),
                });
            }

            let delay = policy.delay_after(attempt);
            tracing::warn!(
                attempt,
                max_attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "Statement failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

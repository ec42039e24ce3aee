// Copyright (C) 2024 Quickwit, Inc.
//
// Quickwit is offered under the AGPL v3.0 and as commercial software.
// For commercial licensing, contact us at hello@quickwit.io.
//
// AGPL:
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// What a single poll attempt observed.
#[derive(Debug)]
pub enum PollOutcome<T> {
    Ready(T),
    Pending,
    /// The condition can no longer be met, e.g. the process we were waiting on exited.
    Abort(anyhow::Error),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PollContext {
    /// 1-based.
    pub attempt: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("condition not met after {num_attempts} attempts ({}s)", elapsed.as_secs())]
    Timeout {
        num_attempts: usize,
        elapsed: Duration,
    },
    #[error("polling aborted: {0:#}")]
    Aborted(anyhow::Error),
}

/// Polls `poll_fn` every `interval` until it reports `Ready`, reports `Abort`, or `timeout`
/// elapses.
///
/// The deadline is measured on tokio's monotonic clock and also bounds each individual attempt,
/// so a hanging probe cannot extend the wait past `timeout`.
pub async fn poll_until<T, F, Fut>(
    mut poll_fn: F,
    timeout: Duration,
    interval: Duration,
) -> Result<T, PollError>
where
    F: FnMut(PollContext) -> Fut,
    Fut: Future<Output = PollOutcome<T>>,
{
    let start = Instant::now();
    let deadline = start + timeout;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let context = PollContext {
            attempt,
            elapsed: start.elapsed(),
        };
        match tokio::time::timeout_at(deadline, poll_fn(context)).await {
            Ok(PollOutcome::Ready(value)) => return Ok(value),
            Ok(PollOutcome::Abort(error)) => return Err(PollError::Aborted(error)),
            Ok(PollOutcome::Pending) => {}
            Err(_elapsed) => {
                return Err(PollError::Timeout {
                    num_attempts: attempt,
                    elapsed: start.elapsed(),
                });
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(PollError::Timeout {
                num_attempts: attempt,
                elapsed: start.elapsed(),
            });
        }
        debug!(attempt=%attempt, "condition not met yet");
        tokio::time::sleep_until((now + interval).min(deadline)).await;
    }
}

/// Waits until `predicate` returns true, failing after `timeout`.
pub async fn wait_until_predicate<F, Fut>(
    predicate: F,
    timeout: Duration,
    retry_interval: Duration,
) -> Result<(), PollError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    poll_until(
        |_context| {
            let predicate_fut = predicate();
            async move {
                if predicate_fut.await {
                    PollOutcome::Ready(())
                } else {
                    PollOutcome::Pending
                }
            }
        },
        timeout,
        retry_interval,
    )
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_wait_until_predicate_ready() {
        tokio::time::pause();
        let counter = AtomicUsize::new(0);
        wait_until_predicate(
            || {
                let num_calls = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { num_calls == 3 }
            },
            Duration::from_secs(10),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_until_predicate_times_out_within_ceiling() {
        tokio::time::pause();
        let start = Instant::now();
        let error = wait_until_predicate(
            || async { false },
            Duration::from_secs(120),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(120));
        assert!(elapsed < Duration::from_secs(121));
        let PollError::Timeout { num_attempts, .. } = error else {
            panic!("expected a timeout error, got `{error:?}`");
        };
        assert_eq!(num_attempts, 121);
    }

    #[tokio::test]
    async fn test_poll_until_bounds_hanging_attempt() {
        tokio::time::pause();
        let start = Instant::now();
        let error = poll_until(
            |_context| async {
                std::future::pending::<()>().await;
                PollOutcome::Ready(())
            },
            Duration::from_secs(5),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(error, PollError::Timeout { num_attempts: 1, .. }));
        assert!(start.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_poll_until_abort() {
        tokio::time::pause();
        let error = poll_until(
            |context| async move {
                if context.attempt == 2 {
                    PollOutcome::<()>::Abort(anyhow::anyhow!("process exited"))
                } else {
                    PollOutcome::Pending
                }
            },
            Duration::from_secs(5),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(error, PollError::Aborted(_)));
        assert!(error.to_string().contains("process exited"));
    }

    #[tokio::test]
    async fn test_poll_until_reports_attempt_and_elapsed() {
        tokio::time::pause();
        let mut contexts = Vec::new();
        let value = poll_until(
            |context| {
                contexts.push(context);
                async move {
                    if context.attempt == 3 {
                        PollOutcome::Ready(context.elapsed)
                    } else {
                        PollOutcome::Pending
                    }
                }
            },
            Duration::from_secs(5),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        // Paused time still rounds each sleep up to the next millisecond.
        assert!(value >= Duration::from_secs(2));
        assert!(value < Duration::from_secs(2) + Duration::from_millis(10));
        assert_eq!(
            contexts.iter().map(|context| context.attempt).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }
}

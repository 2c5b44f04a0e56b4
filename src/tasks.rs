//! Cancellable, time-bounded asynchronous primitives.
//!
//! Every slow external call in the hub goes through [`timed`] so a stuck
//! service bounds caller-visible latency instead of wedging a handler.
//! Cancellation is cooperative: [`timed`] hands the task a
//! [`CancellationToken`] and triggers it when the budget elapses, but it is
//! the task's job to notice. The loser of the race may still have side
//! effects in flight; callers must tolerate at-most-one-result semantics.
//!
//! None of these primitives retries internally. Retry policy belongs to the
//! caller.

use crate::error::HubError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Suspend the caller for `duration`. Always succeeds.
pub async fn delay(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Run `task` with a deadline of `budget`.
///
/// The task receives a fresh [`CancellationToken`]. If the task settles
/// first its result is returned as-is. If the timer fires first the token
/// is cancelled (so cooperative work can abort) and the call fails with
/// [`HubError::Timeout`] carrying `error_message`.
///
/// # Errors
///
/// Returns [`HubError::Timeout`] when the budget elapses, or whatever error
/// the task itself produced.
pub async fn timed<T, F, Fut>(
    budget: Duration,
    error_message: impl Into<String>,
    task: F,
) -> Result<T, HubError>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, HubError>>,
{
    let token = CancellationToken::new();
    tokio::select! {
        result = task(token.clone()) => result,
        () = tokio::time::sleep(budget) => {
            token.cancel();
            Err(HubError::Timeout(error_message.into()))
        }
    }
}

/// Repeatedly evaluate `predicate` until it reports `true`, sleeping
/// `interval` between evaluations.
///
/// The interval is wall-clock between iterations, not measured from the
/// start of the predicate. There is no backoff. When `cancel` is supplied
/// and is already triggered at the start of an iteration, the call fails
/// with [`HubError::Cancelled`] without evaluating the predicate again.
///
/// # Errors
///
/// Returns [`HubError::Cancelled`] on a triggered token, or any error the
/// predicate itself produced.
pub async fn poll<F, Fut>(
    interval: Duration,
    cancel: Option<&CancellationToken>,
    mut predicate: F,
) -> Result<(), HubError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, HubError>>,
{
    loop {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(HubError::Cancelled);
        }
        if predicate().await? {
            return Ok(());
        }
        delay(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn timed_returns_task_result_when_task_wins() {
        let result = timed(Duration::from_millis(100), "slow", |_token| async {
            delay(Duration::from_millis(10)).await;
            Ok(42)
        })
        .await;

        assert_eq!(result.ok(), Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_fails_and_cancels_token_when_timer_wins() {
        let observed = Arc::new(tokio::sync::Mutex::new(None::<CancellationToken>));
        let observed_clone = observed.clone();

        let started = Instant::now();
        let result: Result<(), HubError> =
            timed(Duration::from_millis(100), "никогда", move |token| {
                let observed = observed_clone;
                async move {
                    *observed.lock().await = Some(token);
                    std::future::pending().await
                }
            })
            .await;

        assert!(matches!(result, Err(HubError::Timeout(msg)) if msg == "никогда"));
        assert_eq!(started.elapsed(), Duration::from_millis(100));
        let token = observed.lock().await.take().expect("task never started");
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_evaluates_until_true() {
        let evaluations = Arc::new(AtomicUsize::new(0));
        let counter = evaluations.clone();

        let started = Instant::now();
        let result = poll(Duration::from_millis(10), None, move || {
            let counter = counter.clone();
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1 >= 3) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(evaluations.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn poll_fails_fast_on_triggered_token() {
        let token = CancellationToken::new();
        token.cancel();

        let result = poll(Duration::from_millis(10), Some(&token), || async {
            panic!("predicate must not run after cancellation")
        })
        .await;

        assert!(matches!(result, Err(HubError::Cancelled)));
    }

    #[tokio::test]
    async fn poll_propagates_predicate_errors() {
        let result = poll(Duration::from_millis(1), None, || async {
            Err(HubError::CommandError("rpc".to_string()))
        })
        .await;

        assert!(matches!(result, Err(HubError::CommandError(_))));
    }
}

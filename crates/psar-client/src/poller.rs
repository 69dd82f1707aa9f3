//! Fixed-interval payment-status polling with explicit cancellation.
//!
//! Polling always terminates: on the first activated answer, when the
//! attempt budget runs out, or when the returned handle is cancelled
//! (view teardown). There is no path that keeps a timer alive forever.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use psar_types::api::PaymentStatusResponse;

/// Terminal result of a polling run.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The boost is live (first activation or already activated earlier).
    Activated {
        activated_at: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
    },
    /// Attempt budget exhausted without confirmation — tell the user to
    /// check back later.
    StillPending,
    Cancelled,
}

/// Handle to a running poll task. Cancel it on component teardown;
/// a completed task treats cancel as a no-op.
pub struct PollHandle {
    token: CancellationToken,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the poll to reach a terminal outcome.
    pub async fn join(self) -> PollOutcome {
        self.task.await.unwrap_or(PollOutcome::Cancelled)
    }
}

/// Start polling `check` every `interval`, at most `max_attempts` times.
///
/// A failed check (network error, malformed body) counts as "not yet" for
/// that attempt and is retried on the next tick, mirroring how the server
/// treats verifier failures.
pub fn start_polling<F, Fut>(check: F, interval: Duration, max_attempts: u32) -> PollHandle
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<PaymentStatusResponse>> + Send,
{
    let token = CancellationToken::new();
    let child = token.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        for attempt in 1..=max_attempts {
            tokio::select! {
                _ = child.cancelled() => return PollOutcome::Cancelled,
                _ = ticker.tick() => {}
            }

            match check().await {
                Ok(status) if status.activated => {
                    return PollOutcome::Activated {
                        activated_at: status.activated_at,
                        expires_at: status.expires_at,
                    };
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("status poll attempt {} failed: {:#}", attempt, e);
                }
            }
        }

        PollOutcome::StillPending
    });

    PollHandle { token, task }
}

/// Convenience wrapper polling the marketplace API's status endpoint.
pub fn poll_payment_status(
    client: reqwest::Client,
    base_url: String,
    tracking_hash: String,
    interval: Duration,
    max_attempts: u32,
) -> PollHandle {
    start_polling(
        move || {
            let client = client.clone();
            let url = format!("{}/payment/status?hash={}", base_url, tracking_hash);
            async move {
                let resp = client.get(&url).send().await?.error_for_status()?;
                Ok(resp.json::<PaymentStatusResponse>().await?)
            }
        },
        interval,
        max_attempts,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn status(activated: bool) -> PaymentStatusResponse {
        PaymentStatusResponse {
            paid: activated,
            activated,
            purchase_id: activated.then(|| "boost-1".into()),
            activated_at: activated.then(Utc::now),
            expires_at: activated.then(Utc::now),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_first_activated_answer() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let handle = start_polling(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok(status(n >= 3)) }
            },
            Duration::from_secs(3),
            10,
        );

        assert!(matches!(handle.join().await, PollOutcome::Activated { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 3, "stopped at activation");
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_attempt_budget() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let handle = start_polling(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(status(false)) }
            },
            Duration::from_secs(3),
            5,
        );

        assert_eq!(handle.join().await, PollOutcome::StillPending);
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn check_errors_count_as_not_yet() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let handle = start_polling(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        anyhow::bail!("connection reset");
                    }
                    Ok(status(true))
                }
            },
            Duration::from_secs(3),
            10,
        );

        assert!(matches!(handle.join().await, PollOutcome::Activated { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_polling_early() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let handle = start_polling(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(status(false)) }
            },
            Duration::from_secs(3),
            1000,
        );

        // Let a couple of ticks happen, then tear down
        tokio::time::sleep(Duration::from_secs(7)).await;
        handle.cancel();

        assert_eq!(handle.join().await, PollOutcome::Cancelled);
        let seen = attempts.load(Ordering::SeqCst);
        assert!(seen < 1000 && seen >= 1);
    }
}

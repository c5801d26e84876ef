//! Bounded fixed-interval polling for checkout confirmation.
//!
//! A client that returns from the processor's checkout page cannot know
//! whether the webhook has landed yet. It polls the status endpoint a fixed
//! number of times and then gives up with [`PollOutcome::TimedOut`], at which
//! point the caller offers a manual "check now" action instead of blocking.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::models::payment_record::{PaymentRecordView, PaymentStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_ATTEMPTS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

/// Anything whose payment status can be observed by a poll.
pub trait PaymentProgress {
    fn payment_status(&self) -> PaymentStatus;
}

impl PaymentProgress for PaymentRecordView {
    fn payment_status(&self) -> PaymentStatus {
        self.status
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Succeeded(T),
    Failed(T),
    Expired(T),
    /// Attempts exhausted while still pending. Carries the last observation, if any.
    TimedOut { attempts: u32, last: Option<T> },
}

impl<T> PollOutcome<T> {
    pub fn label(&self) -> &'static str {
        match self {
            PollOutcome::Succeeded(_) => "succeeded",
            PollOutcome::Failed(_) => "failed",
            PollOutcome::Expired(_) => "expired",
            PollOutcome::TimedOut { .. } => "timed_out",
        }
    }
}

/// Calls `probe` until it reports a terminal status or the policy runs out.
/// Probe errors count as an attempt and polling continues.
pub async fn poll_until_settled<T, E, F, Fut>(policy: PollPolicy, mut probe: F) -> PollOutcome<T>
where
    T: PaymentProgress,
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last = None;
    for attempt in 1..=policy.max_attempts {
        match probe().await {
            Ok(observed) => match observed.payment_status() {
                PaymentStatus::Succeeded => return PollOutcome::Succeeded(observed),
                PaymentStatus::Failed => return PollOutcome::Failed(observed),
                PaymentStatus::Expired => return PollOutcome::Expired(observed),
                PaymentStatus::Pending => {
                    debug!(attempt, "payment still pending");
                    last = Some(observed);
                }
            },
            Err(err) => warn!(attempt, %err, "payment status probe failed"),
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    PollOutcome::TimedOut {
        attempts: policy.max_attempts,
        last,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Observed(PaymentStatus);

    impl PaymentProgress for Observed {
        fn payment_status(&self) -> PaymentStatus {
            self.0
        }
    }

    fn fast_policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    #[test]
    fn default_policy_is_eight_polls_two_seconds_apart() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(2));
        assert_eq!(policy.max_attempts, 8);
    }

    #[tokio::test]
    async fn stops_at_first_terminal_status() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let outcome = poll_until_settled(fast_policy(8), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Ok::<_, String>(Observed(PaymentStatus::Pending))
                } else {
                    Ok(Observed(PaymentStatus::Succeeded))
                }
            }
        })
        .await;

        assert_eq!(outcome, PollOutcome::Succeeded(Observed(PaymentStatus::Succeeded)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let outcome = poll_until_settled(fast_policy(3), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(Observed(PaymentStatus::Pending)) }
        })
        .await;

        assert_eq!(
            outcome,
            PollOutcome::TimedOut {
                attempts: 3,
                last: Some(Observed(PaymentStatus::Pending))
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn probe_errors_keep_polling() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let outcome = poll_until_settled(fast_policy(4), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err("connection reset".to_string())
                } else {
                    Ok(Observed(PaymentStatus::Failed))
                }
            }
        })
        .await;

        assert_eq!(outcome.label(), "failed");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

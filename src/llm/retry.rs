use super::clock::Clock;
use super::types::AttemptOutcome;
use crate::config::ReliabilityConfig;
use crate::error::{ProviderError, ProviderErrorKind};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-backend retry budget and backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries per backend, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound on a single call; `None` leaves it to the HTTP client.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ReliabilityConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms.max(config.base_backoff_ms)),
            attempt_timeout: config
                .attempt_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    /// Sleep before retry number `retry_index` (0-based): `base * 2^index`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry_index))
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying on the same backend.
    Recoverable,
    /// Move on to the next backend.
    Fatal,
}

pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &ProviderError) -> ErrorClass;
}

impl<F> ErrorClassifier for F
where
    F: Fn(&ProviderError) -> ErrorClass + Send + Sync,
{
    fn classify(&self, error: &ProviderError) -> ErrorClass {
        self(error)
    }
}

/// Status- and pattern-based classification, configured from `[reliability]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultClassifier {
    pub recoverable_statuses: Vec<u16>,
    pub recoverable_patterns: Vec<String>,
    pub fatal_patterns: Vec<String>,
}

impl Default for DefaultClassifier {
    fn default() -> Self {
        Self {
            recoverable_statuses: default_recoverable_statuses(),
            recoverable_patterns: default_recoverable_patterns(),
            fatal_patterns: default_fatal_patterns(),
        }
    }
}

pub fn default_recoverable_statuses() -> Vec<u16> {
    vec![408, 425, 429, 500, 502, 503, 504, 529]
}

pub fn default_recoverable_patterns() -> Vec<String> {
    [
        "rate limit",
        "rate_limit",
        "too many requests",
        "timeout",
        "timed out",
        "overloaded",
        "temporarily unavailable",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub fn default_fatal_patterns() -> Vec<String> {
    ["insufficient_quota", "exceeded your current quota", "billing"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl DefaultClassifier {
    pub fn from_config(config: &ReliabilityConfig) -> Self {
        let lower = |patterns: &[String]| -> Vec<String> {
            patterns
                .iter()
                .map(|p| p.trim().to_ascii_lowercase())
                .filter(|p| !p.is_empty())
                .collect()
        };
        Self {
            recoverable_statuses: config.recoverable_statuses.clone(),
            recoverable_patterns: lower(&config.recoverable_patterns),
            fatal_patterns: lower(&config.fatal_patterns),
        }
    }
}

impl ErrorClassifier for DefaultClassifier {
    fn classify(&self, error: &ProviderError) -> ErrorClass {
        let haystack = match &error.code {
            Some(code) => format!("{} {}", error.message, code).to_ascii_lowercase(),
            None => error.message.to_ascii_lowercase(),
        };

        // Quota and billing failures look like 429s but never clear up.
        if self.fatal_patterns.iter().any(|p| haystack.contains(p)) {
            return ErrorClass::Fatal;
        }

        match error.kind {
            ProviderErrorKind::Timeout | ProviderErrorKind::Connection => {
                return ErrorClass::Recoverable;
            }
            ProviderErrorKind::MissingCredential
            | ProviderErrorKind::Decode
            | ProviderErrorKind::EmptyResponse => return ErrorClass::Fatal,
            ProviderErrorKind::Http | ProviderErrorKind::Other => {}
        }

        if let Some(status) = error.status {
            if self.recoverable_statuses.contains(&status) {
                return ErrorClass::Recoverable;
            }
            if (400..500).contains(&status) {
                return ErrorClass::Fatal;
            }
        }

        if self.recoverable_patterns.iter().any(|p| haystack.contains(p)) {
            ErrorClass::Recoverable
        } else {
            ErrorClass::Fatal
        }
    }
}

/// One try made by [`with_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryRecord {
    /// 1-based.
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub outcome: AttemptOutcome,
    pub error: Option<ProviderError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Succeeded(T),
    /// Every try failed with a recoverable error.
    Exhausted(ProviderError),
    Fatal(ProviderError),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRun<T> {
    pub outcome: RetryOutcome<T>,
    pub tries: Vec<TryRecord>,
}

fn elapsed_since(clock: &dyn Clock, started_at: DateTime<Utc>) -> Duration {
    (clock.now() - started_at).to_std().unwrap_or_default()
}

fn cancelled_record(attempt_number: u32, clock: &dyn Clock) -> TryRecord {
    TryRecord {
        attempt_number,
        started_at: clock.now(),
        elapsed: Duration::ZERO,
        outcome: AttemptOutcome::Cancelled,
        error: None,
    }
}

/// Run `operation` until it succeeds, fails fatally, or runs out of tries.
///
/// `operation` receives the 1-based attempt number. Recoverable failures
/// sleep `policy.delay_for(n)` on `clock` before the next try. A fired
/// `cancel` token aborts the in-flight call or the pending sleep.
/// `on_try` sees every [`TryRecord`] the moment it is made, before any
/// backoff sleep.
#[allow(clippy::too_many_arguments)]
pub async fn with_retry<T, F, Fut, R>(
    policy: &RetryPolicy,
    classifier: &dyn ErrorClassifier,
    clock: &dyn Clock,
    cancel: Option<&CancellationToken>,
    label: &str,
    mut on_try: R,
    mut operation: F,
) -> RetryRun<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
    R: FnMut(&TryRecord),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut tries = Vec::new();
    let mut push = |tries: &mut Vec<TryRecord>, record: TryRecord| {
        on_try(&record);
        tries.push(record);
    };

    for attempt in 1..=max_attempts {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            push(&mut tries, cancelled_record(attempt, clock));
            return RetryRun {
                outcome: RetryOutcome::Cancelled,
                tries,
            };
        }

        let started_at = clock.now();
        let call = async {
            match policy.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, operation(attempt)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::timeout(
                        label,
                        format!("attempt timed out after {}ms", limit.as_millis()),
                    )),
                },
                None => operation(attempt).await,
            }
        };

        let result = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => None,
                result = call => Some(result),
            },
            None => Some(call.await),
        };

        let Some(result) = result else {
            tracing::info!(backend = label, attempt, "Attempt cancelled");
            push(
                &mut tries,
                TryRecord {
                    attempt_number: attempt,
                    started_at,
                    elapsed: elapsed_since(clock, started_at),
                    outcome: AttemptOutcome::Cancelled,
                    error: None,
                },
            );
            return RetryRun {
                outcome: RetryOutcome::Cancelled,
                tries,
            };
        };

        let elapsed = elapsed_since(clock, started_at);
        let error = match result {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(backend = label, attempt, "Backend recovered after retries");
                }
                push(
                    &mut tries,
                    TryRecord {
                        attempt_number: attempt,
                        started_at,
                        elapsed,
                        outcome: AttemptOutcome::Success,
                        error: None,
                    },
                );
                return RetryRun {
                    outcome: RetryOutcome::Succeeded(value),
                    tries,
                };
            }
            Err(error) => error,
        };

        let class = classifier.classify(&error);
        push(
            &mut tries,
            TryRecord {
                attempt_number: attempt,
                started_at,
                elapsed,
                outcome: match class {
                    ErrorClass::Recoverable => AttemptOutcome::RecoverableError,
                    ErrorClass::Fatal => AttemptOutcome::FatalError,
                },
                error: Some(error.clone()),
            },
        );

        if class == ErrorClass::Fatal {
            tracing::warn!(backend = label, attempt, "Non-retryable error: {error}");
            return RetryRun {
                outcome: RetryOutcome::Fatal(error),
                tries,
            };
        }

        if attempt == max_attempts {
            tracing::warn!(backend = label, attempt, "Retries exhausted: {error}");
            return RetryRun {
                outcome: RetryOutcome::Exhausted(error),
                tries,
            };
        }

        let delay = policy.delay_for(attempt - 1);
        tracing::warn!(
            backend = label,
            attempt,
            max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Backend call failed, retrying: {error}"
        );

        let slept = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => false,
                () = clock.sleep(delay) => true,
            },
            None => {
                clock.sleep(delay).await;
                true
            }
        };
        if !slept {
            tracing::info!(backend = label, attempt, "Backoff cancelled");
            push(&mut tries, cancelled_record(attempt + 1, clock));
            return RetryRun {
                outcome: RetryOutcome::Cancelled,
                tries,
            };
        }
    }

    // max_attempts >= 1, so the loop always returns.
    RetryRun {
        outcome: RetryOutcome::Cancelled,
        tries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::clock::ManualClock;
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Backoff sleeps on this clock never finish.
    struct StalledClock;

    impl Clock for StalledClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::<Utc>::UNIX_EPOCH
        }

        fn sleep(&self, _duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            Box::pin(std::future::pending())
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            attempt_timeout: None,
        }
    }

    fn rate_limited() -> ProviderError {
        ProviderError::http("test", 429, None, "Too Many Requests")
    }

    fn unauthorized() -> ProviderError {
        ProviderError::http("test", 401, None, "Unauthorized")
    }

    fn scripted(
        script: Vec<Result<&'static str, ProviderError>>,
    ) -> impl FnMut(u32) -> std::future::Ready<Result<&'static str, ProviderError>> {
        let script = Mutex::new(VecDeque::from(script));
        move |_| {
            let next = script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::other("test", "script exhausted")));
            std::future::ready(next)
        }
    }

    #[test]
    fn delay_doubles_and_caps() {
        let p = RetryPolicy {
            max_delay: Duration::from_millis(350),
            ..policy(5)
        };
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(2), Duration::from_millis(350));
        assert_eq!(p.delay_for(40), Duration::from_millis(350));
    }

    #[test]
    fn default_classifier_statuses() {
        let c = DefaultClassifier::default();
        assert_eq!(c.classify(&rate_limited()), ErrorClass::Recoverable);
        assert_eq!(
            c.classify(&ProviderError::http("t", 503, None, "Service Unavailable")),
            ErrorClass::Recoverable
        );
        assert_eq!(c.classify(&unauthorized()), ErrorClass::Fatal);
        assert_eq!(
            c.classify(&ProviderError::http("t", 400, None, "bad request")),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn default_classifier_quota_is_fatal_even_on_429() {
        let c = DefaultClassifier::default();
        let err = ProviderError::http(
            "openai",
            429,
            Some("insufficient_quota".into()),
            "You exceeded your current quota",
        );
        assert_eq!(c.classify(&err), ErrorClass::Fatal);
    }

    #[test]
    fn default_classifier_kinds_and_patterns() {
        let c = DefaultClassifier::default();
        assert_eq!(
            c.classify(&ProviderError::timeout("t", "deadline")),
            ErrorClass::Recoverable
        );
        assert_eq!(
            c.classify(&ProviderError::missing_credential("t")),
            ErrorClass::Fatal
        );
        assert_eq!(
            c.classify(&ProviderError::empty_response("t")),
            ErrorClass::Fatal
        );
        assert_eq!(
            c.classify(&ProviderError::other("t", "upstream Overloaded, retry")),
            ErrorClass::Recoverable
        );
        assert_eq!(
            c.classify(&ProviderError::other("t", "model does not exist")),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn closures_are_classifiers() {
        let always_fatal = |_: &ProviderError| ErrorClass::Fatal;
        assert_eq!(always_fatal.classify(&rate_limited()), ErrorClass::Fatal);
    }

    #[tokio::test]
    async fn succeeds_first_try_without_sleeping() {
        let clock = ManualClock::default();
        let run = with_retry(
            &policy(3),
            &DefaultClassifier::default(),
            &clock,
            None,
            "test",
            |_| {},
            scripted(vec![Ok("done")]),
        )
        .await;
        assert_eq!(run.outcome, RetryOutcome::Succeeded("done"));
        assert_eq!(run.tries.len(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn recoverable_failures_back_off_exponentially() {
        let clock = ManualClock::default();
        let run = with_retry(
            &policy(3),
            &DefaultClassifier::default(),
            &clock,
            None,
            "test",
            |_| {},
            scripted(vec![Err(rate_limited()), Err(rate_limited()), Ok("done")]),
        )
        .await;
        assert_eq!(run.outcome, RetryOutcome::Succeeded("done"));
        let outcomes: Vec<AttemptOutcome> = run.tries.iter().map(|t| t.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                AttemptOutcome::RecoverableError,
                AttemptOutcome::RecoverableError,
                AttemptOutcome::Success
            ]
        );
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
        let gap = run.tries[2].started_at - run.tries[0].started_at;
        assert_eq!(gap, chrono::Duration::milliseconds(300));
    }

    #[tokio::test]
    async fn fatal_error_stops_immediately() {
        let clock = ManualClock::default();
        let run = with_retry(
            &policy(3),
            &DefaultClassifier::default(),
            &clock,
            None,
            "test",
            |_| {},
            scripted(vec![Err(unauthorized()), Ok("never")]),
        )
        .await;
        assert_eq!(run.outcome, RetryOutcome::Fatal(unauthorized()));
        assert_eq!(run.tries.len(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let clock = ManualClock::default();
        let run: RetryRun<&str> = with_retry(
            &policy(2),
            &DefaultClassifier::default(),
            &clock,
            None,
            "test",
            |_| {},
            scripted(vec![Err(rate_limited()), Err(rate_limited())]),
        )
        .await;
        assert_eq!(run.outcome, RetryOutcome::Exhausted(rate_limited()));
        assert_eq!(run.tries.len(), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(100)]);
    }

    #[tokio::test]
    async fn cancelled_token_skips_the_call() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = std::sync::atomic::AtomicU32::new(0);
        let run: RetryRun<&str> = with_retry(
            &policy(3),
            &DefaultClassifier::default(),
            &ManualClock::default(),
            Some(&token),
            "test",
            |_| {},
            |_| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                std::future::ready(Ok("never"))
            },
        )
        .await;
        assert_eq!(run.outcome, RetryOutcome::Cancelled);
        assert_eq!(run.tries.len(), 1);
        assert_eq!(run.tries[0].outcome, AttemptOutcome::Cancelled);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_aborts_in_flight_call() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let run: RetryRun<&str> = with_retry(
            &policy(3),
            &DefaultClassifier::default(),
            &ManualClock::default(),
            Some(&token),
            "test",
            |_| {},
            move |_| {
                trigger.cancel();
                std::future::pending()
            },
        )
        .await;
        assert_eq!(run.outcome, RetryOutcome::Cancelled);
        assert_eq!(run.tries.len(), 1);
    }

    #[tokio::test]
    async fn attempt_timeout_is_recoverable() {
        let p = RetryPolicy {
            attempt_timeout: Some(Duration::from_millis(20)),
            ..policy(2)
        };
        let clock = ManualClock::default();
        let run: RetryRun<&str> = with_retry(
            &p,
            &DefaultClassifier::default(),
            &clock,
            None,
            "slow",
            |_| {},
            |_| std::future::pending(),
        )
        .await;
        match run.outcome {
            RetryOutcome::Exhausted(err) => {
                assert_eq!(err.kind, ProviderErrorKind::Timeout);
                assert_eq!(err.backend, "slow");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(run.tries.len(), 2);
    }

    #[tokio::test]
    async fn cancel_aborts_pending_backoff() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let calls = AtomicU32::new(0);
        let run: RetryRun<&str> = with_retry(
            &policy(3),
            &DefaultClassifier::default(),
            &StalledClock,
            Some(&token),
            "test",
            |_| {},
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err(rate_limited()))
            },
        )
        .await;

        assert_eq!(run.outcome, RetryOutcome::Cancelled);
        let outcomes: Vec<AttemptOutcome> = run.tries.iter().map(|t| t.outcome).collect();
        assert_eq!(
            outcomes,
            vec![AttemptOutcome::RecoverableError, AttemptOutcome::Cancelled]
        );
        assert_eq!(run.tries[1].attempt_number, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn each_try_is_reported_before_the_next_call() {
        let reported = Mutex::new(Vec::new());
        let reported_at_call = Mutex::new(Vec::new());
        let mut script = VecDeque::from(vec![Err(rate_limited()), Err(rate_limited()), Ok("done")]);

        let run = with_retry(
            &policy(3),
            &DefaultClassifier::default(),
            &ManualClock::default(),
            None,
            "test",
            |record: &TryRecord| reported.lock().unwrap().push(record.outcome),
            |_| {
                reported_at_call
                    .lock()
                    .unwrap()
                    .push(reported.lock().unwrap().len());
                std::future::ready(script.pop_front().unwrap_or(Ok("extra")))
            },
        )
        .await;

        assert_eq!(run.outcome, RetryOutcome::Succeeded("done"));
        assert_eq!(*reported_at_call.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(
            *reported.lock().unwrap(),
            vec![
                AttemptOutcome::RecoverableError,
                AttemptOutcome::RecoverableError,
                AttemptOutcome::Success
            ]
        );
    }
}

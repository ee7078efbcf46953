//! Bounded, cancellable polling for answers written by the other endpoint.
//!
//! Each attempt first sleeps the full interval, then does an independent,
//! fully validated read. Errors that a later read can clear up (transport
//! failures, a record not written yet or caught mid-rewrite) are retried;
//! anything else ends the poll. The loop gives up once the elapsed time
//! reaches the timeout, so at most `ceil(timeout / interval)` reads happen.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::RelayClient;
use crate::models::{AnyPayload, Request, RequestPayload, RequestType};
use crate::{KeyRelayError, Result};

/// Floor applied to the interval so a zero setting cannot spin.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

impl PollOptions {
    pub fn new(interval_ms: u64, timeout_secs: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn effective_interval(&self) -> Duration {
        self.interval.max(MIN_INTERVAL)
    }

    /// Upper bound on the number of reads a poll performs.
    pub fn max_attempts(&self) -> u64 {
        let interval = self.effective_interval().as_nanos();
        let timeout = self.timeout.as_nanos();
        (timeout.div_ceil(interval) as u64).max(1)
    }
}

async fn poll_loop<R, G, Fut, P>(
    id: &str,
    options: PollOptions,
    cancel: &CancellationToken,
    mut fetch: G,
    mut predicate: P,
) -> Result<R>
where
    G: FnMut() -> Fut,
    Fut: Future<Output = Result<R>>,
    P: FnMut(&R) -> bool,
{
    let started = Instant::now();
    let interval = options.effective_interval();
    let mut attempt: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(KeyRelayError::PollCancelled(id.to_string())),
            _ = sleep(interval) => {}
        }

        attempt += 1;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(KeyRelayError::PollCancelled(id.to_string())),
            outcome = fetch() => outcome,
        };

        let last_error = match outcome {
            Ok(value) if predicate(&value) => {
                debug!("Poll for {} satisfied after {} attempt(s)", id, attempt);
                return Ok(value);
            }
            Ok(_) => None,
            Err(e) if e.is_retryable() => {
                debug!("Poll attempt {} for {} failed, retrying: {}", attempt, id, e);
                Some(e)
            }
            Err(e) => return Err(e),
        };

        let elapsed = started.elapsed();
        if elapsed >= options.timeout {
            return Err(KeyRelayError::PollTimeout {
                id: id.to_string(),
                elapsed,
                last_error: last_error.map(Box::new),
            });
        }
    }
}

/// Poll a request until `predicate` accepts it.
pub async fn poll_until<T, P>(
    client: &RelayClient,
    id: &str,
    options: PollOptions,
    cancel: &CancellationToken,
    predicate: P,
) -> Result<Request<T>>
where
    T: RequestPayload,
    P: FnMut(&Request<T>) -> bool,
{
    poll_loop(id, options, cancel, move || client.get_request::<T>(id), predicate).await
}

/// [`poll_until`] with the request type chosen at runtime.
pub async fn poll_any_until<P>(
    client: &RelayClient,
    id: &str,
    request_type: RequestType,
    options: PollOptions,
    cancel: &CancellationToken,
    predicate: P,
) -> Result<Request<AnyPayload>>
where
    P: FnMut(&Request<AnyPayload>) -> bool,
{
    poll_loop(
        id,
        options,
        cancel,
        move || client.get_any_request(id, request_type),
        predicate,
    )
    .await
}

/// Wait until the request leaves `pending`.
pub async fn wait_for_resolution<T: RequestPayload>(
    client: &RelayClient,
    id: &str,
    options: PollOptions,
    cancel: &CancellationToken,
) -> Result<Request<T>> {
    poll_until(client, id, options, cancel, |r: &Request<T>| {
        r.payload.status().is_terminal()
    })
    .await
}

pub async fn wait_for_any_resolution(
    client: &RelayClient,
    id: &str,
    request_type: RequestType,
    options: PollOptions,
    cancel: &CancellationToken,
) -> Result<Request<AnyPayload>> {
    poll_any_until(client, id, request_type, options, cancel, |r| {
        r.payload.status().is_terminal()
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SubmitOptions;
    use crate::models::{PairingRequest, RequestStatus, SignPersonalMessageRequest};
    use crate::relay::{MemoryRelay, RelayBackend, RelayError};
    use crate::secret::SharedSecret;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::sync::{Arc, Mutex};

    /// Memory relay that records when each read happened.
    #[derive(Default)]
    struct CountingRelay {
        inner: MemoryRelay,
        reads: Mutex<Vec<Instant>>,
    }

    impl CountingRelay {
        fn reads(&self) -> Vec<Instant> {
            self.reads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RelayBackend for CountingRelay {
        async fn get(&self, path: &str) -> std::result::Result<Option<Value>, RelayError> {
            self.reads.lock().unwrap().push(Instant::now());
            self.inner.get(path).await
        }

        async fn put(&self, path: &str, value: &Value) -> std::result::Result<(), RelayError> {
            self.inner.put(path, value).await
        }

        async fn delete(&self, path: &str) -> std::result::Result<(), RelayError> {
            self.inner.delete(path).await
        }
    }

    fn secret() -> SharedSecret {
        SharedSecret::from_bytes([42; 32])
    }

    fn setup() -> (Arc<CountingRelay>, RelayClient, RelayClient) {
        let relay = Arc::new(CountingRelay::default());
        let poller = RelayClient::new(relay.clone(), secret());
        let answerer = RelayClient::new(Arc::new(relay.inner.clone()), secret());
        (relay, poller, answerer)
    }

    fn approve() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("status".to_string(), json!("approved"));
        map
    }

    #[test]
    fn max_attempts_is_ceiling() {
        assert_eq!(PollOptions::new(1000, 5).max_attempts(), 5);
        assert_eq!(PollOptions::new(2000, 5).max_attempts(), 3);
        assert_eq!(PollOptions::new(1000, 0).max_attempts(), 1);
        assert_eq!(PollOptions::default().max_attempts(), 300);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_satisfying_state() {
        let (relay, poller, answerer) = setup();
        let id = poller
            .submit_request(&PairingRequest::pending(), SubmitOptions::default())
            .await
            .unwrap()
            .id;

        let answer_id = id.clone();
        let answering = tokio::spawn(async move {
            sleep(Duration::from_millis(2500)).await;
            answerer
                .update_request::<PairingRequest>(&answer_id, approve())
                .await
                .unwrap();
        });

        let started = Instant::now();
        let resolved: Request<PairingRequest> = wait_for_resolution(
            &poller,
            &id,
            PollOptions::new(1000, 10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        answering.await.unwrap();

        assert_eq!(resolved.payload.status, RequestStatus::Approved);
        assert_eq!(relay.reads().len(), 3);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_within_bounded_attempts() {
        for (interval_ms, timeout_secs) in [(1000, 5), (2000, 5), (700, 3)] {
            let (relay, poller, _) = setup();
            let id = poller
                .submit_request(&PairingRequest::pending(), SubmitOptions::default())
                .await
                .unwrap()
                .id;
            let options = PollOptions::new(interval_ms, timeout_secs);

            let err = wait_for_resolution::<PairingRequest>(
                &poller,
                &id,
                options,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

            match err {
                KeyRelayError::PollTimeout { elapsed, last_error, .. } => {
                    assert!(elapsed >= options.timeout);
                    assert!(last_error.is_none());
                }
                other => panic!("expected timeout, got {other:?}"),
            }
            assert_eq!(relay.reads().len() as u64, options.max_attempts());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn never_reads_faster_than_interval() {
        let (relay, poller, _) = setup();
        let id = poller
            .submit_request(&PairingRequest::pending(), SubmitOptions::default())
            .await
            .unwrap()
            .id;
        let started = Instant::now();

        let _ = wait_for_resolution::<PairingRequest>(
            &poller,
            &id,
            PollOptions::new(250, 2),
            &CancellationToken::new(),
        )
        .await;

        let reads = relay.reads();
        assert!(reads[0] - started >= Duration::from_millis(250));
        for pair in reads.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_record_is_retried() {
        let (relay, poller, _) = setup();

        let err = wait_for_resolution::<PairingRequest>(
            &poller,
            "1-notyet",
            PollOptions::new(1000, 3),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        match err {
            KeyRelayError::PollTimeout { last_error, .. } => {
                assert!(matches!(
                    last_error.as_deref(),
                    Some(KeyRelayError::NotFound(_))
                ));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(relay.reads().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn record_written_mid_poll_is_picked_up() {
        let (relay, poller, answerer) = setup();
        let id = answerer
            .submit_request(&PairingRequest::pending(), SubmitOptions::default())
            .await
            .unwrap()
            .id;
        answerer
            .update_request::<PairingRequest>(&id, approve())
            .await
            .unwrap();
        let path = crate::relay::request_path(poller.room_id(), &id);
        let stored = relay.inner.snapshot().await.remove(&path).unwrap();
        answerer.delete_request(&id).await.unwrap();

        let store = relay.inner.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(1500)).await;
            store.put(&path, &stored).await.unwrap();
        });

        let resolved = wait_for_resolution::<PairingRequest>(
            &poller,
            &id,
            PollOptions::new(1000, 10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(resolved.payload.status, RequestStatus::Approved);
        assert_eq!(relay.reads().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn type_mismatch_is_fatal() {
        let (relay, poller, _) = setup();
        let id = poller
            .submit_request(&PairingRequest::pending(), SubmitOptions::default())
            .await
            .unwrap()
            .id;

        let err = wait_for_resolution::<SignPersonalMessageRequest>(
            &poller,
            &id,
            PollOptions::new(1000, 60),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, KeyRelayError::TypeMismatch { .. }));
        assert_eq!(relay.reads().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_request_id_is_fatal() {
        let (relay, poller, _) = setup();
        let started = Instant::now();

        let err = wait_for_resolution::<PairingRequest>(
            &poller,
            "bad id",
            PollOptions::new(1000, 60),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(
            matches!(err, KeyRelayError::Relay(RelayError::InvalidPath(_))),
            "{err:?}"
        );
        assert_eq!(relay.reads().len(), 1);
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_poll() {
        let (relay, poller, _) = setup();
        let id = poller
            .submit_request(&PairingRequest::pending(), SubmitOptions::default())
            .await
            .unwrap()
            .id;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = wait_for_resolution::<PairingRequest>(
            &poller,
            &id,
            PollOptions::new(1000, 300),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, KeyRelayError::PollCancelled(ref cancelled) if cancelled == &id));
        assert_eq!(relay.reads().len(), 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn independent_polls_keep_their_own_deadlines() {
        let (_, poller, answerer) = setup();
        let slow = poller
            .submit_request(&PairingRequest::pending(), SubmitOptions::default())
            .await
            .unwrap()
            .id;
        let fast = poller
            .submit_request(&PairingRequest::pending(), SubmitOptions::default())
            .await
            .unwrap()
            .id;
        answerer
            .update_request::<PairingRequest>(&fast, approve())
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let (slow_result, fast_result) = tokio::join!(
            wait_for_resolution::<PairingRequest>(&poller, &slow, PollOptions::new(1000, 2), &cancel),
            wait_for_any_resolution(
                &poller,
                &fast,
                RequestType::Pairing,
                PollOptions::new(500, 60),
                &cancel
            ),
        );

        assert!(matches!(slow_result, Err(KeyRelayError::PollTimeout { .. })));
        assert_eq!(fast_result.unwrap().payload.status(), RequestStatus::Approved);
    }
}

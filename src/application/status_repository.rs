//! Payment status polling.
//!
//! [`StatusRepository::poll`] returns a lazy [`PollingStream`]: the polling
//! task starts on the first `poll_next` and is cancelled when the stream is
//! dropped. Each tick issues one status request. The stream ends after the
//! first terminal response, the first failure, or a timeout.

use crate::config::{DEFAULT_MAX_POLLING_DURATION, DEFAULT_POLLING_INTERVAL};
use crate::domain::ports::StatusServiceRef;
use crate::domain::status::{StatusRequest, StatusResponse};
use crate::error::{CheckoutError, Result};
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace, warn};

const REFRESH_CAPACITY: usize = 16;
const STREAM_BUFFER: usize = 4;

#[derive(Clone)]
pub struct StatusRepository {
    service: StatusServiceRef,
    interval: Duration,
    refresh: broadcast::Sender<String>,
}

impl StatusRepository {
    pub fn new(service: StatusServiceRef) -> Self {
        Self::with_interval(service, DEFAULT_POLLING_INTERVAL)
    }

    pub fn with_interval(service: StatusServiceRef, interval: Duration) -> Self {
        let (refresh, _) = broadcast::channel(REFRESH_CAPACITY);
        Self {
            service,
            interval,
            refresh,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Polls with the default maximum duration of 15 minutes.
    pub fn poll_default(&self, payment_data: impl Into<String>) -> PollingStream {
        self.poll(payment_data, DEFAULT_MAX_POLLING_DURATION)
    }

    pub fn poll(&self, payment_data: impl Into<String>, max_duration: Duration) -> PollingStream {
        PollingStream {
            state: StreamState::Idle(PollingJob {
                service: self.service.clone(),
                payment_data: payment_data.into(),
                interval: self.interval,
                max_duration,
                refresh: self.refresh.subscribe(),
            }),
        }
    }

    /// Triggers an immediate extra tick on every live stream polling `payment_data`.
    ///
    /// The regular schedule is not reset.
    pub fn refresh_status(&self, payment_data: &str) {
        match self.refresh.send(payment_data.to_owned()) {
            Ok(streams) => debug!(streams, "Refreshing status"),
            Err(_) => trace!("No active polling to refresh"),
        }
    }
}

struct PollingJob {
    service: StatusServiceRef,
    payment_data: String,
    interval: Duration,
    max_duration: Duration,
    refresh: broadcast::Receiver<String>,
}

enum StreamState {
    Idle(PollingJob),
    Running {
        rx: mpsc::Receiver<Result<StatusResponse>>,
        _guard: DropGuard,
    },
    Finished,
}

/// Stream of status results for one payment. See the module docs.
pub struct PollingStream {
    state: StreamState,
}

impl PollingStream {
    /// Whether the polling task was started.
    pub fn is_started(&self) -> bool {
        matches!(self.state, StreamState::Running { .. })
    }
}

impl Stream for PollingStream {
    type Item = Result<StatusResponse>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        this.state = match std::mem::replace(&mut this.state, StreamState::Finished) {
            StreamState::Idle(job) => {
                let (tx, rx) = mpsc::channel(STREAM_BUFFER);
                let token = CancellationToken::new();
                tokio::spawn(job.run(tx, token.clone()));
                StreamState::Running {
                    rx,
                    _guard: token.drop_guard(),
                }
            }
            other => other,
        };

        match &mut this.state {
            StreamState::Running { rx, .. } => rx.poll_recv(cx),
            _ => Poll::Ready(None),
        }
    }
}

impl PollingJob {
    async fn run(mut self, tx: mpsc::Sender<Result<StatusResponse>>, token: CancellationToken) {
        debug!(max_duration = ?self.max_duration, "Starting status polling");
        let deadline = Instant::now() + self.max_duration;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut refresh_open = true;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(max_duration = ?self.max_duration, "Status polling timed out");
                    let _ = tx.send(Err(CheckoutError::PollingTimeout(self.max_duration))).await;
                    break;
                }
                _ = ticker.tick() => {}
                refreshed = self.refresh.recv(), if refresh_open => match refreshed {
                    Ok(payment_data) if payment_data == self.payment_data => {
                        trace!("Out-of-band status refresh");
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        refresh_open = false;
                        continue;
                    }
                },
            }

            let request = StatusRequest {
                payment_data: self.payment_data.clone(),
            };
            let result = tokio::select! {
                _ = token.cancelled() => break,
                result = self.service.check_status(request) => result,
            };

            match result {
                Ok(response) => {
                    trace!(result_code = %response.result_code, "Status received");
                    let is_final = response.is_final();
                    if tx.send(Ok(response)).await.is_err() || is_final {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Error while polling status");
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
        debug!("Status polling stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::StatusService;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct ScriptedStatus {
        responses: Mutex<VecDeque<Result<StatusResponse>>>,
        calls: AtomicUsize,
    }

    impl ScriptedStatus {
        fn new(codes: &[(&str, Option<&str>)]) -> Arc<Self> {
            let responses = codes
                .iter()
                .map(|(code, payload)| Ok(StatusResponse::new(*code, *payload)))
                .collect();
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusService for ScriptedStatus {
        async fn check_status(&self, _request: StatusRequest) -> Result<StatusResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(StatusResponse::new("pending", None)))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_ends_after_terminal_response() {
        let service = ScriptedStatus::new(&[
            ("pending", None),
            ("pending", None),
            ("authorised", Some("abc")),
            ("pending", None),
        ]);
        let repository = StatusRepository::new(service.clone());

        let items: Vec<_> = repository.poll_default("pd1").collect().await;

        let codes: Vec<_> = items
            .into_iter()
            .map(|r| r.unwrap().result_code)
            .collect();
        assert_eq!(codes, vec!["pending", "pending", "authorised"]);
        assert_eq!(service.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_is_lazy() {
        let service = ScriptedStatus::new(&[]);
        let repository = StatusRepository::new(service.clone());

        let stream = repository.poll_default("pd1");
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(!stream.is_started());
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_ends_stream_with_error() {
        let service = ScriptedStatus::new(&[]);
        let repository = StatusRepository::with_interval(service, Duration::from_secs(1));

        let items: Vec<_> = repository
            .poll("pd1", Duration::from_millis(2500))
            .collect()
            .await;

        let (last, pending) = items.split_last().unwrap();
        assert!(pending.iter().all(|r| r.as_ref().is_ok_and(|s| !s.is_final())));
        assert!(matches!(last, Err(CheckoutError::PollingTimeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_ends_stream() {
        let service = Arc::new(ScriptedStatus::default());
        service
            .responses
            .lock()
            .unwrap()
            .push_back(Err(CheckoutError::component("network down")));
        let repository = StatusRepository::new(service.clone());

        let items: Vec<_> = repository.poll_default("pd1").collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_stream_stops_polling() {
        let service = ScriptedStatus::new(&[]);
        let repository = StatusRepository::new(service.clone());

        let mut stream = repository.poll_default("pd1");
        assert!(stream.next().await.unwrap().is_ok());
        drop(stream);

        let calls = service.calls();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(service.calls() <= calls + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_triggers_extra_tick() {
        let service = ScriptedStatus::new(&[]);
        let repository = StatusRepository::with_interval(service.clone(), Duration::from_secs(60));

        let mut stream = repository.poll_default("pd1");
        stream.next().await.unwrap().unwrap();
        assert_eq!(service.calls(), 1);

        repository.refresh_status("other");
        repository.refresh_status("pd1");
        stream.next().await.unwrap().unwrap();
        assert_eq!(service.calls(), 2);
    }
}

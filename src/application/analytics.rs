//! Telemetry buffering and delivery.
//!
//! Events are stored per kind in bounded buffers and flushed by a periodic
//! task once a checkout attempt id is available. Nothing here fails the
//! payment path: every error is logged and dropped.

use crate::config::DEFAULT_ANALYTICS_DISPATCH_INTERVAL;
use crate::domain::analytics::{
    AnalyticsEvent, AnalyticsLevel, AnalyticsSetupRequest, AnalyticsTrackRequest,
    CheckoutAttemptIdState, ErrorEventData, InfoEvent, LogEvent,
};
use crate::domain::ports::AnalyticsRemoteRef;
use crate::error::Result;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

pub const INFO_EVENTS_CAPACITY: usize = 50;
pub const LOG_EVENTS_CAPACITY: usize = 5;
pub const ERROR_EVENTS_CAPACITY: usize = 5;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bounded in-memory buffer. When full, the oldest event is evicted.
pub struct LocalEventStore<T> {
    events: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> LocalEventStore<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn store(&self, event: T) {
        let mut events = lock(&self.events);
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn snapshot(&self) -> Vec<T> {
        lock(&self.events).iter().cloned().collect()
    }

    pub fn remove_where(&self, mut sent: impl FnMut(&T) -> bool) {
        lock(&self.events).retain(|e| !sent(e));
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Local buffers plus the remote analytics endpoint.
pub struct AnalyticsRepository {
    remote: AnalyticsRemoteRef,
    setup: AnalyticsSetupRequest,
    info: LocalEventStore<InfoEvent>,
    logs: LocalEventStore<LogEvent>,
    errors: LocalEventStore<ErrorEventData>,
}

impl AnalyticsRepository {
    pub fn new(remote: AnalyticsRemoteRef, setup: AnalyticsSetupRequest) -> Self {
        Self {
            remote,
            setup,
            info: LocalEventStore::new(INFO_EVENTS_CAPACITY),
            logs: LocalEventStore::new(LOG_EVENTS_CAPACITY),
            errors: LocalEventStore::new(ERROR_EVENTS_CAPACITY),
        }
    }

    pub fn store_event(&self, event: AnalyticsEvent) {
        match event {
            AnalyticsEvent::Info(e) => self.info.store(e),
            AnalyticsEvent::Log(e) => self.logs.store(e),
            AnalyticsEvent::Error(e) => self.errors.store(e),
        }
    }

    pub fn buffered(&self) -> usize {
        self.info.len() + self.logs.len() + self.errors.len()
    }

    pub async fn fetch_checkout_attempt_id(&self) -> Result<Option<String>> {
        self.remote.fetch_checkout_attempt_id(self.setup.clone()).await
    }

    /// Sends every buffered event. Sent events are removed only on success.
    pub async fn send_events(&self, checkout_attempt_id: &str) -> Result<()> {
        let request = AnalyticsTrackRequest {
            channel: "sdk".to_owned(),
            platform: self.setup.platform.clone(),
            info: self.info.snapshot(),
            logs: self.logs.snapshot(),
            errors: self.errors.snapshot(),
        };
        if request.is_empty() {
            return Ok(());
        }

        let info_ids: Vec<String> = request.info.iter().map(|e| e.id.clone()).collect();
        let log_ids: Vec<String> = request.logs.iter().map(|e| e.id.clone()).collect();
        let error_ids: Vec<String> = request.errors.iter().map(|e| e.id.clone()).collect();

        let count = request.len();
        self.remote.send_events(checkout_attempt_id, request).await?;
        debug!(count, "Analytics events sent");

        self.info.remove_where(|e| info_ids.contains(&e.id));
        self.logs.remove_where(|e| log_ids.contains(&e.id));
        self.errors.remove_where(|e| error_ids.contains(&e.id));
        Ok(())
    }
}

/// Identity of a component that may initialize and clear the manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerToken(u64);

impl OwnerToken {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for OwnerToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct ManagerState {
    owner: Option<OwnerToken>,
    attempt_id: CheckoutAttemptIdState,
    flush_scope: Option<CancellationToken>,
}

struct ManagerInner {
    repository: AnalyticsRepository,
    level: AnalyticsLevel,
    dispatch_interval: Duration,
    state: Mutex<ManagerState>,
    flush_now: Notify,
    tasks: TaskTracker,
}

/// Shared telemetry front end. Clones share the same buffers and timer.
#[derive(Clone)]
pub struct AnalyticsManager {
    inner: Arc<ManagerInner>,
}

impl AnalyticsManager {
    pub fn new(repository: AnalyticsRepository, level: AnalyticsLevel) -> Self {
        Self::with_dispatch_interval(repository, level, DEFAULT_ANALYTICS_DISPATCH_INTERVAL)
    }

    pub fn with_dispatch_interval(
        repository: AnalyticsRepository,
        level: AnalyticsLevel,
        dispatch_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                repository,
                level,
                dispatch_interval,
                state: Mutex::new(ManagerState::default()),
                flush_now: Notify::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Fetches the attempt id and starts the flush timer.
    ///
    /// Only the first owner is accepted; later calls are ignored until that
    /// owner calls [`AnalyticsManager::clear`].
    pub async fn initialize(&self, owner: &OwnerToken) {
        {
            let mut state = lock(&self.inner.state);
            if state.owner.is_some() {
                debug!("Analytics already initialized, ignoring");
                return;
            }
            state.owner = Some(owner.clone());
        }

        let attempt_id = match self.inner.repository.fetch_checkout_attempt_id().await {
            Ok(Some(id)) => CheckoutAttemptIdState::Available(id),
            Ok(None) => CheckoutAttemptIdState::NotAvailable,
            Err(e) => {
                warn!(error = %e, "Failed to fetch checkoutAttemptId");
                CheckoutAttemptIdState::Failed
            }
        };

        let mut state = lock(&self.inner.state);
        if state.owner.as_ref() != Some(owner) {
            // Cleared while the id was being fetched.
            return;
        }
        if let CheckoutAttemptIdState::Available(id) = &attempt_id {
            info!(checkout_attempt_id = %id, "Analytics initialized");
            let scope = CancellationToken::new();
            self.inner
                .tasks
                .spawn(flush_loop(Arc::clone(&self.inner), id.clone(), scope.clone()));
            state.flush_scope = Some(scope);
        }
        state.attempt_id = attempt_id;
    }

    pub fn checkout_attempt_id(&self) -> String {
        lock(&self.inner.state).attempt_id.as_attempt_id().to_owned()
    }

    pub fn attempt_id_state(&self) -> CheckoutAttemptIdState {
        lock(&self.inner.state).attempt_id.clone()
    }

    pub fn is_flush_timer_running(&self) -> bool {
        lock(&self.inner.state)
            .flush_scope
            .as_ref()
            .is_some_and(|s| !s.is_cancelled())
    }

    pub fn buffered_events(&self) -> usize {
        self.inner.repository.buffered()
    }

    /// Buffers an event. Events are dropped when the level forbids sending.
    pub fn track_event(&self, event: AnalyticsEvent) {
        if !self.inner.level.can_send_events() {
            return;
        }
        let force = event.should_force_send();
        self.inner.repository.store_event(event);
        if force {
            self.inner.flush_now.notify_one();
        }
    }

    /// Stops the flush timer and resets the attempt id. Ignored for other owners.
    pub fn clear(&self, owner: &OwnerToken) {
        let mut state = lock(&self.inner.state);
        if state.owner.as_ref() != Some(owner) {
            return;
        }
        if let Some(scope) = state.flush_scope.take() {
            scope.cancel();
        }
        state.owner = None;
        state.attempt_id = CheckoutAttemptIdState::NotAvailable;
    }
}

async fn flush_loop(inner: Arc<ManagerInner>, attempt_id: String, scope: CancellationToken) {
    if !inner.level.can_send_events() {
        return;
    }
    loop {
        tokio::select! {
            biased;
            _ = scope.cancelled() => break,
            _ = inner.flush_now.notified() => {}
            _ = tokio::time::sleep(inner.dispatch_interval) => {}
        }
        if let Err(e) = inner.repository.send_events(&attempt_id).await {
            warn!(error = %e, "Failed to send analytics events");
        }
    }
}

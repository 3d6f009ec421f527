//! Intent-driven component state.
//!
//! Intents are queued on a channel and applied one at a time by a single
//! task: reducer first, validator second. Every resulting state is
//! published, so observers never see a half-applied intent.

use crate::error::{CheckoutError, Result};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub trait ComponentStateReducer<S, I>: Send + Sync + 'static {
    fn reduce(&self, state: S, intent: I) -> S;
}

pub trait ComponentStateValidator<S>: Send + Sync + 'static {
    fn validate(&self, state: S) -> S;
}

impl<S, I, F> ComponentStateReducer<S, I> for F
where
    F: Fn(S, I) -> S + Send + Sync + 'static,
{
    fn reduce(&self, state: S, intent: I) -> S {
        self(state, intent)
    }
}

/// Validator that accepts the state as is.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoValidation;

impl<S> ComponentStateValidator<S> for NoValidation {
    fn validate(&self, state: S) -> S {
        state
    }
}

pub struct ComponentStateFlow<S, I> {
    intents: mpsc::UnboundedSender<I>,
    state: watch::Receiver<S>,
    scope: CancellationToken,
}

impl<S, I> ComponentStateFlow<S, I>
where
    S: Clone + Send + Sync + 'static,
    I: std::fmt::Debug + Send + 'static,
{
    /// Starts the reducer task. Must be called within a Tokio runtime.
    pub fn new(
        initial_state: S,
        reducer: impl ComponentStateReducer<S, I>,
        validator: impl ComponentStateValidator<S>,
    ) -> Self {
        let initial_state = validator.validate(initial_state);
        let (state_tx, state) = watch::channel(initial_state);
        let (intents, mut intent_rx) = mpsc::unbounded_channel::<I>();
        let scope = CancellationToken::new();

        let token = scope.clone();
        tokio::spawn(async move {
            loop {
                let intent = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    intent = intent_rx.recv() => match intent {
                        Some(intent) => intent,
                        None => break,
                    },
                };
                trace!(?intent, "Reducing intent");
                let current = state_tx.borrow().clone();
                let next = validator.validate(reducer.reduce(current, intent));
                state_tx.send_replace(next);
            }
            debug!("Component state flow stopped");
        });

        Self {
            intents,
            state,
            scope,
        }
    }

    pub fn handle_intent(&self, intent: I) -> Result<()> {
        if self.scope.is_cancelled() {
            return Err(CheckoutError::checkout("Component state flow is closed"));
        }
        self.intents
            .send(intent)
            .map_err(|_| CheckoutError::checkout("Component state flow is closed"))
    }

    pub fn state(&self) -> S {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.state.clone()
    }

    /// Stops the reducer task. Queued intents are dropped.
    pub fn close(&self) {
        self.scope.cancel();
    }
}

impl<S, I> Drop for ComponentStateFlow<S, I> {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Default)]
    struct LoadingState {
        is_loading: bool,
        submissions: u32,
        is_valid: bool,
    }

    #[derive(Debug)]
    enum Intent {
        UpdateLoading(bool),
        Submit,
    }

    fn reduce(state: LoadingState, intent: Intent) -> LoadingState {
        match intent {
            Intent::UpdateLoading(is_loading) => LoadingState { is_loading, ..state },
            Intent::Submit => LoadingState {
                submissions: state.submissions + 1,
                ..state
            },
        }
    }

    struct NotLoading;

    impl ComponentStateValidator<LoadingState> for NotLoading {
        fn validate(&self, state: LoadingState) -> LoadingState {
            LoadingState {
                is_valid: !state.is_loading,
                ..state
            }
        }
    }

    #[tokio::test]
    async fn test_intents_are_applied_in_order() {
        let flow = ComponentStateFlow::new(LoadingState::default(), reduce, NotLoading);
        let mut rx = flow.subscribe();
        assert!(flow.state().is_valid);

        flow.handle_intent(Intent::UpdateLoading(true)).unwrap();
        flow.handle_intent(Intent::Submit).unwrap();
        flow.handle_intent(Intent::Submit).unwrap();

        let state = rx.wait_for(|s| s.submissions == 2).await.unwrap().clone();
        assert_eq!(
            state,
            LoadingState {
                is_loading: true,
                submissions: 2,
                is_valid: false
            }
        );
    }

    #[tokio::test]
    async fn test_closed_flow_rejects_intents() {
        let flow = ComponentStateFlow::new(LoadingState::default(), reduce, NoValidation);
        flow.close();

        assert!(flow.handle_intent(Intent::Submit).is_err());
    }
}

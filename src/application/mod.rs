//! Application layer: the components a checkout flow is assembled from.
//!
//! Status polling, action delegates, the session interactor and component
//! event routing all run on Tokio. Each component owns a cancellation scope
//! and reports through channels rather than callbacks where it can.

pub mod actions;
pub mod analytics;
pub mod channel;
pub mod event_handler;
pub mod saved_state;
pub mod session_interactor;
pub mod state_flow;
pub mod state_manager;
pub mod status_repository;

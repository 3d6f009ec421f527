//! Checkout domain model and the ports the engine talks through.

pub mod action;
pub mod analytics;
pub mod field;
pub mod payment;
pub mod ports;
pub mod session;
pub mod status;

//! Keys and typed accessors for state that must survive process recreation.

use crate::domain::action::Action;
use crate::domain::ports::StateStoreRef;
use crate::error::Result;
use serde_json::Value;

pub const ACTION_KEY: &str = "ACTION_KEY";
pub const IS_POLLING_KEY: &str = "IS_POLLING_KEY";
pub const PAYMENT_DATA_KEY: &str = "PAYMENT_DATA_KEY";
pub const NATIVE_REDIRECT_DATA_KEY: &str = "NATIVE_REDIRECT_DATA_KEY";
pub const SESSION_DATA_KEY: &str = "SESSION_DATA_KEY";
pub const IS_FLOW_TAKEN_OVER_KEY: &str = "IS_FLOW_TAKEN_OVER_KEY";
pub const AUTHORIZATION_TOKEN_KEY: &str = "AUTHORIZATION_TOKEN_KEY";

/// Owns the opaque `paymentData` of the current action.
#[derive(Clone)]
pub struct PaymentDataRepository {
    store: StateStoreRef,
}

impl PaymentDataRepository {
    pub fn new(store: StateStoreRef) -> Self {
        Self { store }
    }

    pub async fn payment_data(&self) -> Result<Option<String>> {
        self.store.get_as(PAYMENT_DATA_KEY).await
    }

    /// Overwrites the payment data. `None` clears it.
    pub async fn set_payment_data(&self, payment_data: Option<&str>) -> Result<()> {
        match payment_data {
            Some(pd) => self.store.put(PAYMENT_DATA_KEY, Value::from(pd)).await,
            None => self.store.remove(PAYMENT_DATA_KEY).await,
        }
    }

    pub async fn native_redirect_data(&self) -> Result<Option<String>> {
        self.store.get_as(NATIVE_REDIRECT_DATA_KEY).await
    }

    pub async fn set_native_redirect_data(&self, data: Option<&str>) -> Result<()> {
        match data {
            Some(d) => self.store.put(NATIVE_REDIRECT_DATA_KEY, Value::from(d)).await,
            None => self.store.remove(NATIVE_REDIRECT_DATA_KEY).await,
        }
    }
}

/// The action a delegate is working on, plus its polling flag.
#[derive(Clone)]
pub struct ActionStateRepository {
    store: StateStoreRef,
}

impl ActionStateRepository {
    pub fn new(store: StateStoreRef) -> Self {
        Self { store }
    }

    pub async fn action(&self) -> Result<Option<Action>> {
        self.store.get_as(ACTION_KEY).await
    }

    pub async fn set_action(&self, action: &Action) -> Result<()> {
        self.store.put_as(ACTION_KEY, action).await
    }

    pub async fn is_polling(&self) -> Result<bool> {
        Ok(self.store.get_as(IS_POLLING_KEY).await?.unwrap_or(false))
    }

    pub async fn set_polling(&self) -> Result<()> {
        self.store.put(IS_POLLING_KEY, Value::Bool(true)).await
    }

    /// Forgets the action and the polling flag.
    pub async fn clear(&self) -> Result<()> {
        self.store.remove(ACTION_KEY).await?;
        self.store.remove(IS_POLLING_KEY).await
    }
}

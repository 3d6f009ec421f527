use thiserror::Error;

/// Errors surfaced by the checkout engine.
///
/// `Component` errors are recoverable: the host shows a message and the
/// shopper may retry (re-open the action, resubmit). `Checkout` errors are
/// contract violations that end the current attempt.
#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("{message}")]
    Component {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    #[error("{message}")]
    Checkout {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    #[error("3DS2 challenge canceled: {0}")]
    ChallengeCancelled(String),
    #[error("Status polling timed out after {0:?}")]
    PollingTimeout(std::time::Duration),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),
}

impl CheckoutError {
    pub fn component(message: impl Into<String>) -> Self {
        Self::Component {
            message: message.into(),
            source: None,
        }
    }

    pub fn component_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Component {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn checkout(message: impl Into<String>) -> Self {
        Self::Checkout {
            message: message.into(),
            source: None,
        }
    }

    pub fn checkout_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Checkout {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether the shopper can retry after this error without restarting checkout.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Checkout { .. })
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;

//! Telemetry events and the checkout attempt id they are correlated with.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Sent as the attempt id when none was fetched yet.
pub const ATTEMPT_ID_NOT_FETCHED: &str = "do-not-track";
/// Sent as the attempt id when fetching it failed.
pub const ATTEMPT_ID_FAILED: &str = "fetch-checkoutAttemptId-failed";

/// How much the SDK reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsLevel {
    /// Initial setup call plus every event.
    #[default]
    All,
    /// Only the initial setup call, events are dropped.
    Initial,
}

impl AnalyticsLevel {
    pub fn can_send_events(&self) -> bool {
        matches!(self, AnalyticsLevel::All)
    }
}

impl std::str::FromStr for AnalyticsLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "initial" | "none" => Ok(Self::Initial),
            other => Err(format!("unknown analytics level: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CheckoutAttemptIdState {
    #[default]
    NotAvailable,
    Available(String),
    Failed,
}

impl CheckoutAttemptIdState {
    pub fn as_attempt_id(&self) -> &str {
        match self {
            CheckoutAttemptIdState::NotAvailable => ATTEMPT_ID_NOT_FETCHED,
            CheckoutAttemptIdState::Available(id) => id,
            CheckoutAttemptIdState::Failed => ATTEMPT_ID_FAILED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InfoType {
    Rendered,
    Selected,
    Focus,
    Unfocus,
    ValidationError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogType {
    Action,
    Submit,
    Redirect,
    ThreeDS2,
    Closed,
}

/// Error codes reported alongside `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorEvent {
    RedirectFailed,
    RedirectParseFailed,
    ApiPayments,
    ApiDetails,
    ApiNativeRedirect,
    ApiThreeds2,
    ThirdParty,
    Threeds2TokenDecoding,
    Threeds2FingerprintHandling,
    Threeds2ChallengeHandling,
}

impl ErrorEvent {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorEvent::RedirectFailed => "600",
            ErrorEvent::RedirectParseFailed => "601",
            ErrorEvent::ApiPayments => "620",
            ErrorEvent::ApiDetails => "621",
            ErrorEvent::ApiNativeRedirect => "623",
            ErrorEvent::ApiThreeds2 => "624",
            ErrorEvent::ThirdParty => "630",
            ErrorEvent::Threeds2TokenDecoding => "704",
            ErrorEvent::Threeds2FingerprintHandling => "705",
            ErrorEvent::Threeds2ChallengeHandling => "706",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoEvent {
    pub id: String,
    pub timestamp: u128,
    pub component: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<InfoType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_stored_payment_method: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_error_code: Option<String>,
    #[serde(skip)]
    pub should_force_send: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub id: String,
    pub timestamp: u128,
    pub component: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<LogType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip)]
    pub should_force_send: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEventData {
    pub id: String,
    pub timestamp: u128,
    pub component: String,
    #[serde(rename = "errorType", skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip)]
    pub should_force_send: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsEvent {
    Info(InfoEvent),
    Log(LogEvent),
    Error(ErrorEventData),
}

impl AnalyticsEvent {
    pub fn id(&self) -> &str {
        match self {
            AnalyticsEvent::Info(e) => &e.id,
            AnalyticsEvent::Log(e) => &e.id,
            AnalyticsEvent::Error(e) => &e.id,
        }
    }

    pub fn component(&self) -> &str {
        match self {
            AnalyticsEvent::Info(e) => &e.component,
            AnalyticsEvent::Log(e) => &e.component,
            AnalyticsEvent::Error(e) => &e.component,
        }
    }

    pub fn should_force_send(&self) -> bool {
        match self {
            AnalyticsEvent::Info(e) => e.should_force_send,
            AnalyticsEvent::Log(e) => e.should_force_send,
            AnalyticsEvent::Error(e) => e.should_force_send,
        }
    }

    pub fn force_send(mut self) -> Self {
        match &mut self {
            AnalyticsEvent::Info(e) => e.should_force_send = true,
            AnalyticsEvent::Log(e) => e.should_force_send = true,
            AnalyticsEvent::Error(e) => e.should_force_send = true,
        }
        self
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

fn next_event_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("{:x}-{:x}", now_millis(), COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Builders for the events every component reports.
pub struct GenericEvents;

impl GenericEvents {
    pub fn info(component: impl Into<String>) -> InfoEvent {
        InfoEvent {
            id: next_event_id(),
            timestamp: now_millis(),
            component: component.into(),
            kind: None,
            target: None,
            is_stored_payment_method: None,
            validation_error_code: None,
            should_force_send: false,
        }
    }

    pub fn rendered(component: impl Into<String>, is_stored: bool) -> AnalyticsEvent {
        AnalyticsEvent::Info(InfoEvent {
            kind: Some(InfoType::Rendered),
            is_stored_payment_method: Some(is_stored),
            ..Self::info(component)
        })
    }

    pub fn submit(component: impl Into<String>) -> AnalyticsEvent {
        AnalyticsEvent::Log(LogEvent {
            id: next_event_id(),
            timestamp: now_millis(),
            component: component.into(),
            kind: Some(LogType::Submit),
            subtype: None,
            result: None,
            should_force_send: false,
        })
    }

    pub fn action(component: impl Into<String>, subtype: impl Into<String>) -> AnalyticsEvent {
        AnalyticsEvent::Log(LogEvent {
            id: next_event_id(),
            timestamp: now_millis(),
            component: component.into(),
            kind: Some(LogType::Action),
            subtype: Some(subtype.into()),
            result: None,
            should_force_send: false,
        })
    }

    pub fn error(component: impl Into<String>, event: ErrorEvent) -> AnalyticsEvent {
        AnalyticsEvent::Error(ErrorEventData {
            id: next_event_id(),
            timestamp: now_millis(),
            component: component.into(),
            error: Some(event),
            code: Some(event.code().to_owned()),
            message: None,
            should_force_send: false,
        })
    }

    pub fn error_with_message(
        component: impl Into<String>,
        event: ErrorEvent,
        message: impl Into<String>,
    ) -> AnalyticsEvent {
        match Self::error(component, event) {
            AnalyticsEvent::Error(mut e) => {
                e.message = Some(message.into());
                AnalyticsEvent::Error(e)
            }
            other => other,
        }
    }
}

/// Body of the attempt id request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSetupRequest {
    pub client_key: String,
    pub level: AnalyticsLevel,
    pub platform: String,
    pub version: String,
}

/// Batch of buffered events sent in one flush.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsTrackRequest {
    pub channel: String,
    pub platform: String,
    pub info: Vec<InfoEvent>,
    pub logs: Vec<LogEvent>,
    pub errors: Vec<ErrorEventData>,
}

impl AnalyticsTrackRequest {
    pub fn is_empty(&self) -> bool {
        self.info.is_empty() && self.logs.is_empty() && self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.info.len() + self.logs.len() + self.errors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_id_sentinels() {
        assert_eq!(CheckoutAttemptIdState::NotAvailable.as_attempt_id(), "do-not-track");
        assert_eq!(
            CheckoutAttemptIdState::Failed.as_attempt_id(),
            "fetch-checkoutAttemptId-failed"
        );
        assert_eq!(
            CheckoutAttemptIdState::Available("abc".into()).as_attempt_id(),
            "abc"
        );
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = GenericEvents::submit("card");
        let b = GenericEvents::submit("card");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_error_event_carries_code() {
        let event = GenericEvents::error_with_message("redirect", ErrorEvent::RedirectFailed, "boom");
        let AnalyticsEvent::Error(data) = event else {
            panic!("expected error event");
        };
        assert_eq!(data.code.as_deref(), Some("600"));
        assert_eq!(data.message.as_deref(), Some("boom"));
        assert!(!data.should_force_send);
    }

    #[test]
    fn test_force_send_flag() {
        let event = GenericEvents::rendered("dropin", false).force_send();
        assert!(event.should_force_send());
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!("ALL".parse::<AnalyticsLevel>(), Ok(AnalyticsLevel::All));
        assert_eq!("none".parse::<AnalyticsLevel>(), Ok(AnalyticsLevel::Initial));
        assert!("verbose".parse::<AnalyticsLevel>().is_err());
    }
}

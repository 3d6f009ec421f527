use serde::{Deserialize, Serialize};

pub const RESULT_PENDING: &str = "pending";
pub const RESULT_AUTHORIZED: &str = "authorised";
pub const RESULT_REFUSED: &str = "refused";
pub const RESULT_ERROR: &str = "error";
pub const RESULT_CANCELED: &str = "canceled";

/// Response of the payment status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub result_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl StatusResponse {
    pub fn new(result_code: impl Into<String>, payload: Option<&str>) -> Self {
        Self {
            result_code: result_code.into(),
            payload: payload.map(str::to_owned),
        }
    }

    /// Every result code except `pending` ends polling.
    pub fn is_final(&self) -> bool {
        !self.result_code.eq_ignore_ascii_case(RESULT_PENDING)
    }

    /// The payload, if present and non-empty.
    pub fn non_empty_payload(&self) -> Option<&str> {
        self.payload.as_deref().filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub payment_data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_is_non_terminal() {
        assert!(!StatusResponse::new("pending", None).is_final());
        assert!(!StatusResponse::new("Pending", None).is_final());
        for code in [RESULT_AUTHORIZED, RESULT_REFUSED, RESULT_ERROR, RESULT_CANCELED, "received"] {
            assert!(StatusResponse::new(code, None).is_final(), "{code} should be final");
        }
    }

    #[test]
    fn test_empty_payload_is_absent() {
        assert_eq!(StatusResponse::new("authorised", Some("")).non_empty_payload(), None);
        assert_eq!(
            StatusResponse::new("authorised", Some("abc")).non_empty_payload(),
            Some("abc")
        );
    }

    #[test]
    fn test_deserialize_without_payload() {
        let response: StatusResponse = serde_json::from_str(r#"{"resultCode":"pending"}"#).unwrap();
        assert_eq!(response, StatusResponse::new("pending", None));
    }
}

//! Extraction of the details payload from a redirect return URL.

use crate::error::{CheckoutError, Result};
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

pub const PAYLOAD_PARAMETER: &str = "payload";
pub const REDIRECT_RESULT_PARAMETER: &str = "redirectResult";
pub const PAYMENT_RESULT_PARAMETER: &str = "PaRes";
pub const MD_PARAMETER: &str = "MD";
pub const QUERY_STRING_RESULT: &str = "returnUrlQueryString";

/// Parses the query of a return URL into a details object.
///
/// Known parameters are `payload`, `redirectResult` and the `PaRes` + `MD`
/// pair. When none is present the raw query is returned under
/// `returnUrlQueryString`.
pub fn parse_redirect_result(return_url: &str) -> Result<Map<String, Value>> {
    debug!(return_url, "Parsing redirect result");
    let url = Url::parse(return_url)?;

    let mut details = Map::new();
    let param = |name: &str| {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };

    if let Some(payload) = param(PAYLOAD_PARAMETER) {
        details.insert(PAYLOAD_PARAMETER.to_owned(), Value::String(payload));
    }
    if let Some(redirect_result) = param(REDIRECT_RESULT_PARAMETER) {
        details.insert(
            REDIRECT_RESULT_PARAMETER.to_owned(),
            Value::String(redirect_result),
        );
    }
    if let (Some(pa_res), Some(md)) = (param(PAYMENT_RESULT_PARAMETER), param(MD_PARAMETER)) {
        details.insert(PAYMENT_RESULT_PARAMETER.to_owned(), Value::String(pa_res));
        details.insert(MD_PARAMETER.to_owned(), Value::String(md));
    }

    if details.is_empty()
        && let Some(query) = url.query().filter(|q| !q.is_empty())
    {
        details.insert(QUERY_STRING_RESULT.to_owned(), Value::String(query.to_owned()));
    }

    if details.is_empty() {
        return Err(CheckoutError::component(
            "Error parsing redirect result, could not find any query parameters",
        ));
    }
    Ok(details)
}

/// Checks a URL before handing it to the host for opening.
pub fn validate_redirect_url(url: Option<&str>) -> Result<Url> {
    let url = url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| CheckoutError::component("Redirect URL is empty."))?;
    Ok(Url::parse(url)?)
}

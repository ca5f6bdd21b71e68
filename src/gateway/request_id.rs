//! Request correlation identifiers.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header carrying the correlation identifier in both directions.
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Generates UUIDv7 identifiers, which sort by creation time.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeOrderedRequestId;

impl MakeRequestId for TimeOrderedRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::now_v7().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Correlation identifier already attached to a request, if any.
#[must_use]
pub fn request_id_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn generated_ids_are_uuid_v7() {
        let request = Request::new(());
        let id = TimeOrderedRequestId
            .make_request_id(&request)
            .expect("request id");
        let text = id.header_value().to_str().expect("ascii");
        let parsed = Uuid::parse_str(text).expect("uuid");
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[rstest]
    #[case(Some("abc-123"), Some("abc-123"))]
    #[case(Some("  "), None)]
    #[case(None, None)]
    fn reads_inbound_identifier(#[case] header: Option<&str>, #[case] expected: Option<&str>) {
        let mut headers = HeaderMap::new();
        if let Some(value) = header {
            headers.insert(
                REQUEST_ID_HEADER.clone(),
                HeaderValue::from_str(value).expect("header"),
            );
        }
        assert_eq!(request_id_from(&headers).as_deref(), expected);
    }
}

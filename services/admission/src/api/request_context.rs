//! Request-scoped context extracted from HTTP requests.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use rsvp_id::RequestId;

use crate::api::error::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id echoed in problem responses.
    pub request_id: String,
    /// The same id when it is a well-formed `req_` id; stored on audit records.
    pub typed_request_id: Option<RequestId>,
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl RequestContext {
    fn from_headers(headers: &HeaderMap) -> Self {
        match header_string(headers, REQUEST_ID_HEADER) {
            Some(request_id) => Self {
                typed_request_id: request_id.parse().ok(),
                request_id,
            },
            None => {
                let id = RequestId::new();
                Self {
                    request_id: id.to_string(),
                    typed_request_id: Some(id),
                }
            }
        }
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

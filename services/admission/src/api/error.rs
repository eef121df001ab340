//! RFC 7807 problem responses.

use axum::{
    http::{
        header::{CONTENT_TYPE, RETRY_AFTER},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::error::AdmissionError;

/// Seconds a client should wait before retrying a lock timeout.
const LOCK_RETRY_AFTER_SECONDS: u32 = 1;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub code: String,
    pub request_id: String,
    pub retryable: bool,
    pub retry_after_seconds: u32,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("https://rsvp.dev/problems/{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            instance: None,
            code,
            request_id: "unknown".to_string(),
            retryable: false,
            retry_after_seconds: 0,
        }
    }

    fn set_request_id(&mut self, request_id: impl Into<String>) {
        let request_id = request_id.into();
        self.request_id = request_id.clone();
        if self.instance.is_none() {
            self.instance = Some(request_id);
        }
    }

    fn set_retry_after_seconds(&mut self, seconds: u32) {
        self.retry_after_seconds = seconds;
        if seconds > 0 {
            self.retryable = true;
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    fn with_status(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn payment_required(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::PAYMENT_REQUIRED, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, code, message)
    }

    pub fn unprocessable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::UNPROCESSABLE_ENTITY, code, message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }

    pub fn service_unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.problem.set_request_id(request_id);
        self
    }

    pub fn with_retry_after_seconds(mut self, seconds: u32) -> Self {
        self.problem.set_retry_after_seconds(seconds);
        self
    }
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match &err {
            AdmissionError::NotFound(_) => Self::not_found("event_not_found", err.to_string()),
            AdmissionError::Validation(v) => Self::unprocessable(v.code(), err.to_string()),
            AdmissionError::PaymentRequired(_) => {
                Self::payment_required("payment_required", err.to_string())
            }
            AdmissionError::EventFull(_) => Self::conflict("event_full", err.to_string()),
            AdmissionError::LockTimeout(_) => {
                Self::service_unavailable("lock_timeout", err.to_string())
                    .with_retry_after_seconds(LOCK_RETRY_AFTER_SECONDS)
            }
            AdmissionError::Store(store_err) => {
                error!(error = %store_err, "Admission storage failure");
                Self::internal("internal_error", "Internal storage error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = self.problem.retry_after_seconds;
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        if retry_after > 0 {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::store::StoreError;
    use rsvp_id::EventId;
    use rstest::rstest;

    #[rstest]
    #[case(AdmissionError::NotFound(EventId::new()), StatusCode::NOT_FOUND, false)]
    #[case(AdmissionError::Validation(ValidationError::RegistrationDisabled), StatusCode::UNPROCESSABLE_ENTITY, false)]
    #[case(AdmissionError::PaymentRequired(EventId::new()), StatusCode::PAYMENT_REQUIRED, false)]
    #[case(AdmissionError::EventFull(EventId::new()), StatusCode::CONFLICT, false)]
    #[case(AdmissionError::LockTimeout(EventId::new()), StatusCode::SERVICE_UNAVAILABLE, true)]
    #[case(AdmissionError::Store(StoreError::Corrupt("x".into())), StatusCode::INTERNAL_SERVER_ERROR, false)]
    fn test_admission_error_mapping(
        #[case] err: AdmissionError,
        #[case] status: StatusCode,
        #[case] retryable: bool,
    ) {
        let api = ApiError::from(err);
        assert_eq!(api.status, status);
        assert_eq!(api.problem.retryable, retryable);
    }

    #[test]
    fn test_problem_json_headers() {
        let response = ApiError::from(AdmissionError::LockTimeout(EventId::new()))
            .with_request_id("req_test")
            .into_response();
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "1");
    }
}

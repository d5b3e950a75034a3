//! Error responses
//!
//! Every failure leaves as `{"error": {"kind", "message", ...}}` with the
//! kind unchanged from the core.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::RoutebookError;

#[derive(Debug)]
pub struct ApiError(pub RoutebookError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RoutebookError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RoutebookError::BundleNotFound(_) | RoutebookError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            RoutebookError::UnplannableDescription(_)
            | RoutebookError::UnplannableRequest(_)
            | RoutebookError::StepExecutionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            RoutebookError::CatalogUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RoutebookError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RoutebookError::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RoutebookError> for ApiError {
    fn from(err: RoutebookError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(RoutebookError::InvalidInput(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(RoutebookError::InvalidInput(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::warn!("Request failed: {}", self.0);
        }

        let mut body = json!({
            "kind": self.0.kind(),
            "message": self.0.to_string(),
        });
        if let RoutebookError::StepExecutionFailed { step_index, cause } = &self.0 {
            body["step_index"] = json!(step_index);
            body["cause"] = json!(cause);
        }

        (status, Json(json!({ "error": body }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (RoutebookError::InvalidInput("x".into()), 400),
            (RoutebookError::BundleNotFound("x".into()), 404),
            (RoutebookError::RouteNotFound("x".into()), 404),
            (RoutebookError::UnplannableDescription("x".into()), 422),
            (RoutebookError::UnplannableRequest("x".into()), 422),
            (
                RoutebookError::StepExecutionFailed {
                    step_index: 1,
                    cause: "x".into(),
                },
                422,
            ),
            (RoutebookError::CatalogUnavailable("x".into()), 503),
            (RoutebookError::UpstreamTimeout("x".into()), 504),
            (RoutebookError::Upstream("x".into()), 502),
            (RoutebookError::StoreWriteFailed("x".into()), 500),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status().as_u16(), expected);
        }
    }
}

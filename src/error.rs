//! Error type for the HTTP surface, rendered as a JSON error body.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed JSON body: {0}")]
    JsonRejection(#[from] JsonRejection),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::JsonRejection(rejection) => rejection.status(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::JsonRejection(_) => "json_parse_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        error!(error_code = code, message = %message, "Request failed");

        let body = Json(json!({
            "error": {
                "message": message,
                "code": code
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::extract::FromRequest;
    use axum::http::Request;

    async fn rejection(body: &'static str) -> AppError {
        let request = Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        match Json::<serde_json::Value>::from_request(request, &()).await {
            Ok(_) => panic!("body should have been rejected"),
            Err(rejection) => AppError::from(rejection),
        }
    }

    #[tokio::test]
    async fn syntax_error_maps_to_bad_request() {
        let err = rejection("{").await;
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "json_parse_error");
        assert!(err.to_string().starts_with("Malformed JSON body"));
    }

    #[tokio::test]
    async fn response_carries_code_and_status() {
        let response = rejection("not json").await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "json_parse_error");
    }
}

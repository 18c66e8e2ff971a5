use axum::Json;
use axum::http::StatusCode;
use axum::http::header::WWW_AUTHENTICATE;
use axum::response::{IntoResponse, Response};

use crate::error::Error;

impl Error {
    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::State(_) | Self::InvalidRedirectUri(_) => StatusCode::BAD_REQUEST,
            Self::Session(_) => StatusCode::NOT_FOUND,
            Self::Token(crate::token::TokenError::Signing(_))
            | Self::Directory(_)
            | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Token(_)
            | Self::UserNotFound
            | Self::UserInactive
            | Self::InvalidCredentials
            | Self::MissingHeader
            | Self::MalformedHeader => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let description = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            tracing::error!(error = %self, "Auth internal error");
            "Internal error".to_string()
        } else {
            self.to_string()
        };
        let body = Json(serde_json::json!({
            "error": self.kind(),
            "error_description": description,
        }));

        if status == StatusCode::UNAUTHORIZED {
            (status, [(WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;
    use crate::state::StateError;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn csrf_errors_are_bad_request() {
        let response = Error::from(StateError::Expired).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "expired_state");
    }

    #[tokio::test]
    async fn unauthorized_carries_challenge() {
        let response = Error::MissingHeader.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let response = Error::Directory("password=hunter2 rejected".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "directory_error");
        assert_eq!(json["error_description"], "Internal error");
    }
}

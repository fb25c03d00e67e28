use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracking::TrackingError;
use tracking::error::ErrorKind;

#[derive(Debug, serde::Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

/// An error rendered as `{"code": ..., "message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn forbidden() -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "You are not allowed to perform this operation",
        )
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Internal server error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = axum::Json(ErrorBody {
            code: self.code,
            message: &self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<framework::Error> for ApiError {
    fn from(error: framework::Error) -> Self {
        match error {
            framework::Error::NotFound => {
                Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found")
            }
            framework::Error::PermissionsDenied => Self::forbidden(),
            framework::Error::Unauthenticated => Self::new(
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Missing or invalid bearer token",
            ),
            framework::Error::InvalidInput => Self::bad_request("Invalid input"),
            framework::Error::Conflict => {
                Self::new(StatusCode::CONFLICT, "CONFLICT", "Conflicting update")
            }
            other => {
                tracing::error!(error = %other, "Request failed");
                Self::internal()
            }
        }
    }
}

impl From<TrackingError> for ApiError {
    fn from(error: TrackingError) -> Self {
        let error = match error {
            TrackingError::Storage(inner) => return inner.into(),
            other => other,
        };
        let code = match &error {
            TrackingError::ParcelNotFound(_) => "PARCEL_NOT_FOUND",
            TrackingError::SenderNotFound(_) => "SENDER_NOT_FOUND",
            TrackingError::ActorNotFound(_) => "ACTOR_NOT_FOUND",
            TrackingError::DriverNotFound(_) => "DRIVER_NOT_FOUND",
            TrackingError::AlreadyAssigned(_) => "ALREADY_ASSIGNED",
            TrackingError::NoDriverAssigned => "NO_DRIVER_ASSIGNED",
            TrackingError::InvalidTransition { .. } => "INVALID_TRANSITION",
            TrackingError::InvalidCoordinates => "INVALID_COORDINATES",
            TrackingError::InvalidDetails(_) => "INVALID_DETAILS",
            TrackingError::TrackingCodeConflict => "TRACKING_CODE_CONFLICT",
            TrackingError::ConcurrentModification => "CONCURRENT_MODIFICATION",
            TrackingError::Storage(_) => "INTERNAL_ERROR",
        };
        let status = match error.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::InvalidTransition | ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, code, error.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

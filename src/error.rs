use aide::OperationOutput;
use axum::{http::StatusCode, response::IntoResponse, Json};
use log::error;
use schemars::JsonSchema;
use serde_json::json;
use sqlx::error::ErrorKind;

/// Represent errors in the application
///
/// All `ServiceError`s can be transformed to http errors.
#[derive(Debug, Clone, PartialEq, JsonSchema)]
pub enum ServiceError {
    InternalServerError(String),
    NotFound,
    BadRequest(String),
    Unauthorized(&'static str),
    Forbidden,
    Conflict(String),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for ServiceError {}

/// Helper for `ServiceError` result
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Postgres `numeric_value_out_of_range`
const SQLSTATE_NUMERIC_OUT_OF_RANGE: &str = "22003";
/// Postgres `invalid_text_representation`
const SQLSTATE_INVALID_TEXT: &str = "22P02";

impl From<sqlx::Error> for ServiceError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_error) = error {
            let message = db_error.message().to_owned();
            match db_error.kind() {
                ErrorKind::UniqueViolation | ErrorKind::ForeignKeyViolation => {
                    return ServiceError::Conflict(message)
                }
                ErrorKind::NotNullViolation | ErrorKind::CheckViolation => {
                    return ServiceError::BadRequest(message)
                }
                _ => {}
            }

            if let Some(code) = db_error.code() {
                if code == SQLSTATE_NUMERIC_OUT_OF_RANGE || code == SQLSTATE_INVALID_TEXT {
                    return ServiceError::BadRequest(message);
                }
            }
        }

        if let sqlx::Error::RowNotFound = error {
            return ServiceError::NotFound;
        }

        error!("Database error: {}", error);
        ServiceError::InternalServerError(error.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for ServiceError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        ServiceError::InternalServerError(format!("Migration error: {error}"))
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(error: std::io::Error) -> Self {
        ServiceError::InternalServerError(format!("IO error: {error}"))
    }
}

impl OperationOutput for ServiceError {
    type Inner = String;
}
impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ServiceError::InternalServerError(ref cause) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "cause": cause })),
            ),
            ServiceError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": "Not found",
                })),
            ),
            ServiceError::BadRequest(ref cause) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Bad request",
                    "cause": cause,
                })),
            ),
            ServiceError::Unauthorized(cause) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Unauthorized",
                    "cause": cause,
                })),
            ),
            ServiceError::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "Missing permissions",
                })),
            ),
            ServiceError::Conflict(ref cause) => (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "Conflict",
                    "cause": cause,
                })),
            ),
        }
        .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ServiceError::NotFound, StatusCode::NOT_FOUND),
            (ServiceError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::Unauthorized("x"), StatusCode::UNAUTHORIZED),
            (ServiceError::Forbidden, StatusCode::FORBIDDEN),
            (ServiceError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                ServiceError::InternalServerError("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_row_not_found_is_not_found() {
        assert_eq!(
            ServiceError::from(sqlx::Error::RowNotFound),
            ServiceError::NotFound
        );
    }
}

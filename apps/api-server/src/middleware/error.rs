//! Handler errors rendered as RFC 7807 problem details.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use dealflow_admission::AdmissionError;
use dealflow_core::DomainError;
use dealflow_shared::ErrorResponse;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            AppError::NotFound(detail) => ErrorResponse::not_found(detail),
            AppError::BadRequest(detail) => ErrorResponse::bad_request(detail),
            AppError::ServiceUnavailable(detail) => ErrorResponse::service_unavailable(detail),
        };

        HttpResponse::build(self.status_code()).json(error)
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::InvalidRequest(msg) => AppError::BadRequest(msg),
            AdmissionError::Store(e) => {
                tracing::error!(error = %e, "Counter store error during admin operation");
                AppError::ServiceUnavailable("Rate limit store is unavailable".to_string())
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use dealflow_core::ports::StoreError;

    #[test]
    fn test_store_errors_map_to_503() {
        let err = AppError::from(AdmissionError::Store(StoreError::Backend("down".to_string())));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_invalid_key_maps_to_400() {
        let err = AppError::from(DomainError::InvalidKey("nonsense".to_string()));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}

//! Application error types for host adapters.

use thiserror::Error;

use crate::metabox::MetaboxError;
use crate::settings::{PageError, RenderError, SubmitError};

/// Errors surfaced to the host as a terminal response.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    /// HTTP-style status code for the host response.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Internal(_) => 500,
            AppError::NotFound => 404,
            AppError::Forbidden(_) => 403,
            AppError::BadRequest(_) => 400,
        }
    }

    /// Status and body of the terminal response.
    ///
    /// Internal errors are logged and replaced with a generic message.
    pub fn into_response(self) -> (u16, String) {
        let status = self.status_code();
        let body = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };
        (status, body)
    }
}

impl From<SubmitError> for AppError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Forbidden { .. } | SubmitError::InvalidToken { .. } => {
                AppError::Forbidden(err.user_message().to_string())
            }
            SubmitError::Store { .. } => AppError::Internal(err.into()),
        }
    }
}

impl From<PageError> for AppError {
    fn from(err: PageError) -> Self {
        AppError::Internal(err.into())
    }
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        AppError::Internal(err.into())
    }
}

impl From<MetaboxError> for AppError {
    fn from(err: MetaboxError) -> Self {
        AppError::Internal(err.into())
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

//! Errors surfaced synchronously to whoever submits or queries a conversion.
//!
//! Failures inside a running conversion never show up here; they are written
//! into the job record instead.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("File is empty")]
    EmptyFile,

    #[error("File name is required")]
    MissingFileName,

    #[error("Target format is required")]
    MissingTargetFormat,

    #[error("Unsupported target format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("File size exceeds maximum allowed size: {limit}")]
    FileTooLarge { limit: String },

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    InvalidRequest,
    FileTooLarge,
    NotFound,
    UploadError,
    InternalError,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorType,
    description: String,
}

impl Error {
    pub fn error_type(&self) -> ErrorType {
        match self {
            Error::EmptyFile
            | Error::MissingFileName
            | Error::MissingTargetFormat
            | Error::UnsupportedFormat(_)
            | Error::InvalidParameter { .. } => ErrorType::InvalidRequest,
            Error::FileTooLarge { .. } => ErrorType::FileTooLarge,
            Error::NotFound(_) => ErrorType::NotFound,
            Error::Upload(_) => ErrorType::UploadError,
            Error::Config(_) | Error::Io(_) => ErrorType::InternalError,
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self.error_type() {
            ErrorType::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorType::FileTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::UploadError | ErrorType::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Internal details stay in the log.
        let description = match self.error_type() {
            ErrorType::InternalError => "An unexpected error occurred".to_owned(),
            ErrorType::UploadError => "Failed to upload file".to_owned(),
            _ => self.to_string(),
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.error_type(),
            description,
        })
    }
}

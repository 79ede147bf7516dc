use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Book absent from storage, or stored in a form that cannot be decoded.
    #[error("Book not found: {0}")]
    NotFound(String),

    /// Export format outside the supported set.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Request rejected before reaching the exporter.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An encoder could not produce its artifact.
    #[error("Conversion failed during {stage}: {message}")]
    Conversion {
        /// Pipeline stage that failed.
        stage: &'static str,
        /// Underlying failure.
        message: String,
    },

    /// The uploaded source was already imported.
    #[error("Book already imported: {title}")]
    DuplicateImport {
        /// Identifier of the existing book.
        id: String,
        /// Title of the existing book.
        title: String,
    },

    /// Import pipeline failure (parser or storage).
    #[error("Import failed: {0}")]
    Import(String),

    /// Stored book could not be encoded or decoded.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// PDF generation error.
    #[error("PDF error: {0}")]
    Pdf(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Re-express a lower-level failure as a conversion failure of `stage`.
    ///
    /// Taxonomy members that already carry meaning for callers pass through.
    pub fn conversion(stage: &'static str, err: AppError) -> AppError {
        match err {
            AppError::NotFound(_)
            | AppError::UnsupportedFormat(_)
            | AppError::InvalidRequest(_)
            | AppError::Conversion { .. }
            | AppError::DuplicateImport { .. } => err,
            other => AppError::Conversion {
                stage,
                message: other.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DuplicateImport { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request error");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let body = match &self {
            AppError::DuplicateImport { id, title } => json!({
                "detail": self.to_string(),
                "id": id,
                "title": title,
            }),
            AppError::NotFound(_) | AppError::InvalidRequest(_) | AppError::Import(_) => {
                json!({ "detail": self.to_string() })
            }
            _ => json!({ "detail": format!("Export failed: {}", self) }),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;

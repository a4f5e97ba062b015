use std::path::PathBuf;

use thiserror::Error;

/// Failure to read the backing inventory file.
///
/// Raised by [`crate::loader::read_table`] and everything built on top of it.
/// Individual malformed cells never produce this error; they are coerced to
/// defaults instead.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("inventory file {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported inventory file type: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("failed to read workbook {}: {source}", .path.display())]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    #[error("workbook {} has no worksheets", .0.display())]
    NoWorksheet(PathBuf),

    #[error("failed to read CSV file {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// A shopping list operation referenced a sku missing from the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("product {sku} is not in the inventory")]
pub struct ProductNotFoundError {
    pub sku: String,
}

/// QR image generation failures.
#[derive(Debug, Error)]
pub enum QrGenerationError {
    #[error("link cannot be encoded as a QR code: {0}")]
    Encode(#[from] qrcode::types::QrError),

    #[error("failed to encode QR image as PNG: {0}")]
    Image(#[from] image::ImageError),
}

/// Replacing the inventory file with an uploaded one failed.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The upload was written but could not be read back as an inventory.
    #[error("uploaded file is not a readable inventory: {0}")]
    Invalid(#[from] DataSourceError),

    #[error("failed to store uploaded inventory: {0}")]
    Io(#[from] std::io::Error),
}

/// Startup configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("session_secret must be at least {min} bytes long (got {len})")]
    SecretTooShort { min: usize, len: usize },
}

#[cfg(feature = "web")]
pub use web::AppError;

#[cfg(feature = "web")]
mod web {
    use axum::{
        http::StatusCode,
        response::{Html, IntoResponse, Response},
    };
    use thiserror::Error;

    use super::{DataSourceError, QrGenerationError};

    /// Errors surfaced by request handlers.
    ///
    /// Recoverable conditions (unknown sku on add, empty upload) never reach
    /// this type; they are reported to the user through flash messages.
    #[derive(Debug, Error)]
    pub enum AppError {
        #[error(transparent)]
        DataSource(#[from] DataSourceError),

        #[error("product {0} not found")]
        ProductNotFound(String),

        #[error(transparent)]
        Qr(#[from] QrGenerationError),

        #[error("failed to render page: {0}")]
        Render(#[from] handlebars::RenderError),

        #[error("failed to read upload: {0}")]
        Multipart(#[from] axum::extract::multipart::MultipartError),

        #[error("failed to store uploaded inventory: {0}")]
        Io(#[from] std::io::Error),
    }

    impl IntoResponse for AppError {
        fn into_response(self) -> Response {
            let (status, message) = match &self {
                AppError::DataSource(e) => {
                    log::error!("Inventory unavailable: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "The inventory could not be loaded. Ask staff to upload a valid spreadsheet."
                            .to_string(),
                    )
                }
                AppError::ProductNotFound(sku) => {
                    (StatusCode::NOT_FOUND, format!("Product {} was not found.", sku))
                }
                AppError::Qr(QrGenerationError::Encode(e)) => {
                    (StatusCode::BAD_REQUEST, format!("Cannot build a QR code: {}", e))
                }
                other => {
                    log::error!("Internal Server Error: {}", other);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal Server Error".to_string(),
                    )
                }
            };

            let body = format!(
                "<!doctype html>\n<html><head><title>Grocerz</title></head><body>\
                 <h2>{}</h2><p>{}</p><p><a href=\"/\">Back to start</a></p></body></html>",
                status,
                handlebars::html_escape(&message)
            );

            (status, Html(body)).into_response()
        }
    }
}

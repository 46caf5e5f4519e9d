use thiserror::Error;

/// Failures while rendering a QR code image
#[derive(Debug, Error)]
pub enum QrCodeError {
    #[error("Data cannot be encoded as a QR code: {0}")]
    Encoding(#[from] qrcode::types::QrError),

    #[error("Invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Failed to write PNG image: {0}")]
    Io(#[from] image::ImageError),
}

/// The file store rejected a write or could not be reached
#[derive(Debug, Error)]
#[error("Failed to upload {key}: {message}")]
pub struct UploadError {
    pub key: String,
    pub message: String,
}

impl UploadError {
    pub fn new(key: impl Into<String>, message: impl ToString) -> Self {
        Self {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

/// The record store rejected a write or could not be reached
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors surfaced by location registration, passed through unmodified
/// from the step that failed
#[derive(Debug, Error)]
pub enum LocationError {
    #[error(transparent)]
    QrCode(#[from] QrCodeError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Failures while producing an access URL for a stored QR code
#[derive(Debug, Error)]
pub enum QrCodeUrlError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Failed to presign {path}: {message}")]
    Presign { path: String, message: String },
}

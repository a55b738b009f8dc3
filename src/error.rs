//! Error types for the HTML fit-to-pages converter

use thiserror::Error;

/// Result type alias for html-fit-pdf
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for html-fit-pdf
#[derive(Error, Debug)]
pub enum Error {
    /// Degenerate solver input or request parameter, rejected before rendering
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The rendering engine could not produce a measurement or a PDF
    #[error("Rendering failed: {reason}")]
    Render { reason: String },

    /// HTML file not found
    #[error("HTML document not found: {path}")]
    HtmlNotFound { path: String },

    /// Input is not a usable HTML document
    #[error("Invalid HTML document: {reason}")]
    InvalidHtml { reason: String },

    /// HTML document exceeds the configured size limit
    #[error("HTML document too large: {size} bytes (max: {max_size} bytes)")]
    HtmlTooLarge { size: u64, max_size: u64 },

    /// Cache key not found
    #[error("Cache key not found: {key}")]
    CacheKeyNotFound { key: String },

    /// Source resolution error
    #[error("Failed to resolve source: {reason}")]
    SourceResolution { reason: String },

    /// Base64 decode error
    #[error("Invalid base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// qpdf error while post-processing the generated PDF
    #[error("PDF post-processing error: {reason}")]
    Pdf { reason: String },

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// SSRF blocked (URL resolves to private/reserved IP)
    #[error("SSRF blocked: {url}")]
    SsrfBlocked { url: String },

    /// Download too large
    #[error("Download too large: {size} bytes (max: {max_size} bytes)")]
    DownloadTooLarge { size: u64, max_size: u64 },

    /// Malformed configuration value
    #[error("Invalid configuration for {key}: {reason}")]
    Config { key: String, reason: String },
}

impl Error {
    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, engine errors, file sizes) are omitted.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::InvalidInput { reason } => format!("Invalid input: {}", reason),
            Error::Render { .. } => "Failed to render HTML document".to_string(),
            Error::HtmlNotFound { .. } => "HTML document not found".to_string(),
            Error::InvalidHtml { reason } => format!("Invalid HTML document: {}", reason),
            Error::HtmlTooLarge { max_size, .. } => {
                format!("HTML document exceeds maximum size of {} bytes", max_size)
            }
            Error::CacheKeyNotFound { .. } => "Cache key not found".to_string(),
            Error::SourceResolution { .. } => "Failed to resolve HTML source".to_string(),
            Error::Base64Decode(_) => "Invalid base64 data".to_string(),
            Error::HttpRequest(_) => "HTTP request failed".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::Serialization(_) => "Serialization error".to_string(),
            Error::Pdf { .. } => "PDF processing error".to_string(),
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::SsrfBlocked { .. } => "URL not allowed".to_string(),
            Error::DownloadTooLarge { max_size, .. } => {
                format!("Download exceeds maximum size of {} bytes", max_size)
            }
            Error::Config { key, .. } => format!("Invalid configuration for {}", key),
        }
    }

    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn render(reason: impl std::fmt::Display) -> Self {
        Error::Render {
            reason: reason.to_string(),
        }
    }
}

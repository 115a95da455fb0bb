use reqwest::StatusCode;
use thiserror::Error;

/// Errors produced while talking to the document-chat backend.
///
/// The `Display` text of every variant is what ends up in the chat log, so it
/// is written for the user rather than for a developer.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Unsupported file format. Supported formats: {}", .allowed.join(", "))]
    UnsupportedExtension { allowed: Vec<String> },

    #[error("File is too large, the maximum supported size is {} MB", .max_bytes / (1024 * 1024))]
    FileTooLarge { size: u64, max_bytes: u64 },

    #[error("{message}")]
    Http { status: StatusCode, message: String },

    /// A 2xx response whose body carried an `error` field.
    #[error("{0}")]
    Server(String),

    #[error("An upload is already in progress")]
    Busy,

    #[error("Please upload and process a document first")]
    NoDocument,

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    /// Whether the error was raised before any request left the client.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ClientError::UnsupportedExtension { .. } | ClientError::FileTooLarge { .. }
        )
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extension_lists_allowed_formats() {
        let err = ClientError::UnsupportedExtension {
            allowed: vec![".pdf".into(), ".txt".into(), ".md".into()],
        };
        assert_eq!(
            err.to_string(),
            "Unsupported file format. Supported formats: .pdf, .txt, .md"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn http_error_displays_server_message_verbatim() {
        let err = ClientError::Http {
            status: StatusCode::BAD_REQUEST,
            message: "missing chunk info".into(),
        };
        assert_eq!(err.to_string(), "missing chunk info");
        assert!(!err.is_validation());
    }
}

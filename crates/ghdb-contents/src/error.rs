use thiserror::Error;

/// Errors from the contents codec and transports.
#[derive(Debug, Error)]
pub enum ContentsError {
    #[error("invalid base64 content: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("content is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

pub type ContentsResult<T> = Result<T, ContentsError>;

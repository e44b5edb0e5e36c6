use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{ContentsError, ContentsResult};
use crate::wire::{ApiError, PutContents};

/// Raw response from a contents endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentsResponse {
    pub status: u16,
    /// Response body as JSON text.
    pub body: String,
}

impl ContentsResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as `T`.
    pub fn json<T: DeserializeOwned>(&self) -> ContentsResult<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            ContentsError::UnexpectedResponse(format!("status {} body: {e}", self.status))
        })
    }

    /// Error message from an [`ApiError`] body, or the raw body.
    pub fn error_message(&self) -> String {
        match serde_json::from_str::<ApiError>(&self.body) {
            Ok(err) => err.message,
            Err(_) => self.body.clone(),
        }
    }
}

/// Transport interface to a repository contents endpoint.
///
/// Implementations carry their own credentials and base URL; an HTTP client
/// builds them from [`RepoLocation::contents_url`](crate::RepoLocation::contents_url)
/// and [`ContentsConfig::authorization`](crate::ContentsConfig::authorization).
/// A response with any status is `Ok`; `Err` means no response arrived at all.
#[async_trait]
pub trait ContentsTransport: Send + Sync {
    /// `GET /contents/{path}?ref={git_ref}`. An empty `path` names the
    /// repository root.
    async fn get_contents(&self, path: &str, git_ref: &str) -> ContentsResult<ContentsResponse>;

    /// `PUT /contents/{path}`.
    async fn put_contents(&self, path: &str, body: &PutContents) -> ContentsResult<ContentsResponse>;
}

#[async_trait]
impl<T: ContentsTransport + ?Sized> ContentsTransport for Arc<T> {
    async fn get_contents(&self, path: &str, git_ref: &str) -> ContentsResult<ContentsResponse> {
        (**self).get_contents(path, git_ref).await
    }

    async fn put_contents(&self, path: &str, body: &PutContents) -> ContentsResult<ContentsResponse> {
        (**self).put_contents(path, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        assert!(ContentsResponse::new(200, "{}").is_success());
        assert!(ContentsResponse::new(201, "{}").is_success());
        assert!(!ContentsResponse::new(404, "{}").is_success());
        assert!(!ContentsResponse::new(500, "").is_success());
    }

    #[test]
    fn error_message_prefers_api_error() {
        let r = ContentsResponse::new(404, r#"{"message":"Not Found","documentation_url":"x"}"#);
        assert_eq!(r.error_message(), "Not Found");

        let raw = ContentsResponse::new(502, "Bad Gateway");
        assert_eq!(raw.error_message(), "Bad Gateway");
    }

    #[test]
    fn json_failure_is_unexpected_response() {
        let r = ContentsResponse::new(200, "<html>");
        let err = r.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, ContentsError::UnexpectedResponse(_)));
    }
}

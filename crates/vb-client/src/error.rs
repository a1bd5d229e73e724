use thiserror::Error;

/// Number of response-body characters kept in a [`ClientError::Download`].
pub const BODY_EXCERPT_CHARS: usize = 100;

/// Every way a single generation can fail. The client never retries; each
/// variant is a terminal rejection for the prompt it was called with.
#[derive(Error, Debug)]
pub enum ClientError {
    /// A required input was empty. Raised before any network call.
    #[error("{0} is required.")]
    Missing(&'static str),

    /// The cancellation predicate was observed true while polling.
    #[error("Video generation was stopped by the user.")]
    Cancelled,

    /// The operation finished without a download locator.
    #[error("Video generation finished but no download link was found.")]
    MissingDownloadLink,

    /// The operation's download locator is not an absolute URL.
    #[error("Video generation returned an invalid download link: {0}")]
    InvalidDownloadLink(String),

    /// The media transfer returned a non-success status.
    #[error("Download failed: {status}. {body}")]
    Download { status: u16, body: String },

    /// The remote operation finished with an error payload.
    #[error("Video generation failed ({code}): {message}")]
    Remote { code: i32, message: String },

    /// The API answered a submit or poll with a non-success status.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Network, TLS or decoding failure in the HTTP layer.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl ClientError {
    pub fn download(status: u16, body: &[u8]) -> Self {
        Self::Download {
            status,
            body: excerpt(body),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// First [`BODY_EXCERPT_CHARS`] characters of a (possibly binary) body.
pub fn excerpt(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(BODY_EXCERPT_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(ClientError::Missing("Prompt").to_string(), "Prompt is required.");
        assert_eq!(ClientError::Missing("API Key").to_string(), "API Key is required.");
        assert_eq!(
            ClientError::download(403, b"forbidden").to_string(),
            "Download failed: 403. forbidden"
        );
    }

    #[test]
    fn test_download_body_is_truncated() {
        let body = "x".repeat(500);
        match ClientError::download(500, body.as_bytes()) {
            ClientError::Download { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.chars().count(), BODY_EXCERPT_CHARS);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let body = "é".repeat(150);
        assert_eq!(excerpt(body.as_bytes()).chars().count(), BODY_EXCERPT_CHARS);
    }
}

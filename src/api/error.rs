use thiserror::Error;

/// Maximum length for error response bodies carried in error messages.
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The server did not answer within the request deadline. Surfaced to
    /// the user as "server too slow", but queued exactly like a network
    /// failure.
    #[error("request timed out - the server is too slow")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("unauthorized - session may be expired")]
    Unauthorized,

    #[error("resource not found: {0}")]
    NotFound(String),

    /// Business-rule conflict: a suggested order for this day already
    /// exists. Never queued for retry - retrying would not help.
    #[error("a suggested order for this day was already submitted")]
    DuplicateForDay,

    #[error("server error: {0}")]
    ServerError(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Truncate a response body to avoid carrying excessive data in errors.
    /// Cuts on a char boundary - bodies are frequently non-ASCII text.
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut cut = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &body[..cut],
            body.len()
        )
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 | 403 => ApiError::Unauthorized,
            404 => ApiError::NotFound(truncated),
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("status {}: {}", status, truncated)),
        }
    }

    /// Whether the failure is worth retrying later. Transient failures fall
    /// back to the pending queue; everything else is surfaced.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Timeout | ApiError::Network(_) | ApiError::ServerError(_)
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

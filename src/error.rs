use thiserror::Error;

/// Errores del almacenamiento persistente clave/valor.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The write would push the store past its byte quota.
    #[error("storage quota exceeded writing '{key}': need {needed} bytes, {available} available")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },

    #[error("storage I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid storage key: '{0}'")]
    InvalidKey(String),
}

impl StorageError {
    /// True when the failure is a capacity problem rather than a broken slot.
    pub fn is_quota(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

/// Errores al hablar con el gateway de música.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode gateway response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid gateway URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("gateway reported code {code}: {message}")]
    Upstream { code: i64, message: String },
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_errors_are_recognised() {
        let err = StorageError::QuotaExceeded {
            key: "k".into(),
            needed: 10,
            available: 2,
        };
        assert!(err.is_quota());
        assert!(err.to_string().contains("need 10 bytes"));

        let io = StorageError::Io {
            key: "k".into(),
            source: std::io::Error::other("disk"),
        };
        assert!(!io.is_quota());
    }
}

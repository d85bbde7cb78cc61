use thiserror::Error;

/// Errors produced while loading data for a cache key.
///
/// Only `Fetch` is expected to reach a consumer; it is surfaced through
/// the loader snapshot rather than returned from `refetch()`.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Fetch failed for {key}: {message}")]
    Fetch { key: String, message: String },

    #[error("Failed to encode value for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode cached value for {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Maximum length for a fetch error message kept in a snapshot
const MAX_ERROR_MESSAGE_LENGTH: usize = 500;

impl LoadError {
    /// Build a `Fetch` error from whatever the fetch function returned,
    /// flattening the error chain into a single message.
    pub fn fetch(key: &str, err: &anyhow::Error) -> Self {
        LoadError::Fetch {
            key: key.to_string(),
            message: Self::truncate_message(&format!("{:#}", err)),
        }
    }

    fn truncate_message(message: &str) -> String {
        if message.len() <= MAX_ERROR_MESSAGE_LENGTH {
            return message.to_string();
        }
        let mut end = MAX_ERROR_MESSAGE_LENGTH;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &message[..end],
            message.len()
        )
    }

    /// The cache key this error belongs to.
    pub fn key(&self) -> &str {
        match self {
            LoadError::Fetch { key, .. }
            | LoadError::Encode { key, .. }
            | LoadError::Decode { key, .. } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_fetch_error_flattens_chain() {
        let err: anyhow::Result<()> = Err(anyhow::anyhow!("connection reset"));
        let err = err.context("GET /leases").unwrap_err();
        let load = LoadError::fetch("leases", &err);
        assert_eq!(load.key(), "leases");
        assert_eq!(
            load.to_string(),
            "Fetch failed for leases: GET /leases: connection reset"
        );
    }

    #[test]
    fn test_fetch_error_truncates_long_message() {
        let err = anyhow::anyhow!("{}", "x".repeat(2000));
        match LoadError::fetch("payments", &err) {
            LoadError::Fetch { message, .. } => {
                assert!(message.starts_with(&"x".repeat(MAX_ERROR_MESSAGE_LENGTH)));
                assert!(message.ends_with("(truncated, 2000 total bytes)"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

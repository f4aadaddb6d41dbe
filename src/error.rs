use thiserror::Error;

/// Failure while talking to the Tallinna Vesi API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The API key was rejected (HTTP 401 or 403).
    #[error("Authentication failed")]
    Authentication,
    #[error("API request failed with status {status}")]
    Status { status: u16 },
    #[error("Error communicating with Tallinna Vesi API")]
    Request(#[source] reqwest::Error),
    #[error("API key cannot be sent as a header value")]
    InvalidApiKey,
}

impl ApiError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, ApiError::Authentication)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Request(err)
    }
}

/// Outcome of a failed coordinator refresh, as seen by the host.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Credentials are no longer valid; polling must not be retried until the user re-authenticates.
    #[error("re-authentication required")]
    ReauthRequired(#[source] ApiError),
    /// Retried on the next scheduled tick.
    #[error("update failed")]
    UpdateFailed(#[source] ApiError),
}

impl UpdateError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, UpdateError::ReauthRequired(_))
    }
}

impl From<ApiError> for UpdateError {
    fn from(err: ApiError) -> Self {
        if err.is_authentication() {
            UpdateError::ReauthRequired(err)
        } else {
            UpdateError::UpdateFailed(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_error_is_fatal() {
        let update: UpdateError = ApiError::Authentication.into();
        assert!(update.is_fatal());
        assert!(matches!(update, UpdateError::ReauthRequired(_)));
    }

    #[test]
    fn test_status_error_is_transient() {
        let update: UpdateError = ApiError::Status { status: 500 }.into();
        assert!(!update.is_fatal());
        assert_eq!(update.to_string(), "update failed");
        let source = std::error::Error::source(&update).map(ToString::to_string);
        assert_eq!(
            source.as_deref(),
            Some("API request failed with status 500")
        );
    }

    #[test]
    fn test_error_chain_reports_cause_once() {
        let update: UpdateError = ApiError::Authentication.into();
        let chain = format!("{:#}", anyhow::Error::new(update));
        assert_eq!(chain, "re-authentication required: Authentication failed");
    }
}

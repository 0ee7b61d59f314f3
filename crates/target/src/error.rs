use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("downstream rejected the payload as malformed")]
    Rejected,

    #[error("request failed with HTTP {status}")]
    HttpStatus { status: StatusCode },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },
}

impl SendError {
    /// Malformed-payload failures are isolated line by line and
    /// quarantined; everything else is transient and retried.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

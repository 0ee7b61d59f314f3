#[derive(Debug, thiserror::Error)]
pub enum LivestatusError {
    #[error("unknown livestatus connection type `{value}`")]
    UnknownConnectionType { value: String },

    #[error("failed to dial livestatus at `{address}`: {source}")]
    Dial {
        address: String,
        source: std::io::Error,
    },

    #[error("livestatus I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("livestatus query did not complete cleanly")]
    QueryFailed,
}

impl LivestatusError {
    pub fn dial(address: impl Into<String>, source: std::io::Error) -> Self {
        Self::Dial {
            address: address.into(),
            source,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record has an empty table name")]
    EmptyTable,

    #[error("record timestamp `{value}` is not a non-negative integer")]
    InvalidTimestamp { value: String },

    #[error("record {section} contains an empty key")]
    EmptyKey { section: &'static str },
}

impl RecordError {
    pub fn invalid_timestamp(value: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            value: value.into(),
        }
    }
}

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("could not read `{file}`: {source}")]
    Unreadable {
        file: PathBuf,
        source: std::io::Error,
    },

    #[error("`{file}` is empty")]
    EmptyFile { file: PathBuf },

    #[error("`{file}` doesn't contain all of these columns: {required:?}")]
    MissingColumns {
        file: PathBuf,
        required: &'static [&'static str],
    },
}

impl CollectError {
    pub fn unreadable(file: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unreadable {
            file: file.into(),
            source,
        }
    }

    /// Whether the source file could not be read at all. Unreadable files
    /// are left in place; malformed ones are consumed with a warning.
    pub fn is_unreadable(&self) -> bool {
        matches!(self, Self::Unreadable { .. })
    }
}

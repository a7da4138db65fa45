use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HaggleError {
    #[error("invalid dataset reference: {0} (expected \"owner/name\")")]
    InvalidReference(String),

    #[error("dataset not found on Kaggle: {0}")]
    DatasetNotFound(String),

    #[error("download of {reference} failed: {message}")]
    Download { reference: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("directory unavailable {path}: {message}")]
    #[diagnostic(help("create the directory yourself or set HAGGLE_ROOTDIR"))]
    Directory { path: String, message: String },

    #[error("missing Kaggle credentials")]
    #[diagnostic(help(
        "set KAGGLE_USERNAME and KAGGLE_KEY, or put kaggle.json in ~/.kaggle (see https://github.com/Kaggle/kaggle-api#api-credentials)"
    ))]
    MissingCredentials,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("Kaggle request failed: {0}")]
    KaggleHttp(String),

    #[error("Kaggle returned status {status}: {message}")]
    KaggleStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("invalid archive: {0}")]
    Archive(String),

    #[error("invalid metadata record: {0}")]
    Metadata(String),
}

impl HaggleError {
    /// True for the "nothing there" family, local or remote.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            HaggleError::NotFound(_) | HaggleError::DatasetNotFound(_)
        )
    }
}

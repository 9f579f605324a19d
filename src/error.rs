use crate::models::{FileStatus, PolicyFailure};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required option: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {field}: {value}")]
    Invalid { field: &'static str, value: String },

    #[error("Response field names must be distinct, '{0}' is used twice")]
    DuplicateField(String),

    #[error("Extra form field '{0}' is reserved for the upload policy")]
    ReservedField(String),
}

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Policy request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Policy endpoint answered with status {0}")]
    Status(u16),

    #[error("Policy response is not a JSON object")]
    NotJson,

    #[error("Policy status field '{field}' is {actual}, expected {expected}")]
    Rejected {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Policy response is missing field '{0}'")]
    MissingField(String),

    #[error("Policy expired at {0}")]
    Expired(chrono::DateTime<chrono::Utc>),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Storage rejected upload with status {status}: {body}")]
    Storage { status: u16, body: String },

    #[error("Upload request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid status transition {from:?} -> {to:?}")]
    InvalidTransition { from: FileStatus, to: FileStatus },

    #[error("An upload batch is already in progress")]
    BatchInProgress,

    #[error("No files selected")]
    NoFilesSelected,

    #[error("Unknown file id {0}")]
    UnknownFile(u64),

    #[error("File {0} is uploading and cannot be changed")]
    FileBusy(u64),

    #[error("Upload policy unavailable: {}", .0.reason)]
    PolicyFailed(PolicyFailure),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type UploadResult<T> = Result<T, UploadError>;

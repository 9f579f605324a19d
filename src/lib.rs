pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::UploaderConfig;
pub use error::{ConfigError, PolicyError, UploadError};
pub use models::{FileRow, FileStatus, PendingFile, PolicyFailure, UploadPolicy, UploadedObject};
pub use services::uploader::{UploadListener, Uploader};
pub use utils::validation::length_hint;

use crate::error::UploadError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub type FileId = u64;

/// Short-lived credential bundle returned by the policy endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub access_id: String,
    pub signature: String,
    pub policy: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl UploadPolicy {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Waiting,
    Uploading,
    Succeeded,
    Failed,
}

impl FileStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FileStatus::Waiting => "waiting",
            FileStatus::Uploading => "uploading",
            FileStatus::Succeeded => "uploaded",
            FileStatus::Failed => "failed",
        }
    }

    fn can_move_to(&self, next: FileStatus) -> bool {
        matches!(
            (self, next),
            (FileStatus::Waiting, FileStatus::Uploading)
                | (FileStatus::Uploading, FileStatus::Succeeded)
                | (FileStatus::Uploading, FileStatus::Failed)
        )
    }
}

/// A user-selected local file staged for upload.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub id: FileId,
    pub path: PathBuf,
    pub display_name: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub status: FileStatus,
    pub generated_key: Option<String>,
}

impl PendingFile {
    pub fn new(
        id: FileId,
        path: PathBuf,
        display_name: String,
        size_bytes: u64,
        content_type: String,
    ) -> Self {
        Self {
            id,
            path,
            display_name,
            size_bytes,
            content_type,
            status: FileStatus::Waiting,
            generated_key: None,
        }
    }

    pub fn transition(&mut self, next: FileStatus) -> Result<(), UploadError> {
        if !self.status.can_move_to(next) {
            return Err(UploadError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Fresh `Waiting` copy under a new id, used to re-upload a failed file.
    pub fn restaged(&self, id: FileId) -> Self {
        Self::new(
            id,
            self.path.clone(),
            self.display_name.clone(),
            self.size_bytes,
            self.content_type.clone(),
        )
    }

    pub fn row(&self) -> FileRow {
        FileRow {
            id: self.id,
            name: self.display_name.clone(),
            size: format!("{:.1}kb", self.size_bytes as f64 / 1024.0),
            status: self.status.label(),
            deletable: matches!(self.status, FileStatus::Waiting | FileStatus::Failed),
        }
    }
}

/// One row of the staged file list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRow {
    pub id: FileId,
    pub name: String,
    pub size: String,
    pub status: &'static str,
    pub deletable: bool,
}

/// Result entry reported once a batch completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedObject {
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(rename = "ossUrl")]
    pub url: String,
}

/// What the policy endpoint answered when the policy could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyFailure {
    pub status: Option<u16>,
    pub body: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PendingFile {
        PendingFile::new(
            1,
            PathBuf::from("/tmp/a.png"),
            "a.png".to_string(),
            2048,
            "image/png".to_string(),
        )
    }

    #[test]
    fn test_status_moves_forward_once() {
        let mut file = sample();
        assert!(file.transition(FileStatus::Uploading).is_ok());
        assert!(file.transition(FileStatus::Succeeded).is_ok());
        assert!(file.transition(FileStatus::Failed).is_err());
        assert!(file.transition(FileStatus::Uploading).is_err());
        assert_eq!(file.status, FileStatus::Succeeded);
    }

    #[test]
    fn test_waiting_cannot_skip_uploading() {
        let mut file = sample();
        let err = file.transition(FileStatus::Succeeded).unwrap_err();
        assert!(matches!(
            err,
            UploadError::InvalidTransition {
                from: FileStatus::Waiting,
                to: FileStatus::Succeeded
            }
        ));
    }

    #[test]
    fn test_restaged_file_starts_waiting() {
        let mut file = sample();
        file.transition(FileStatus::Uploading).unwrap();
        file.transition(FileStatus::Failed).unwrap();
        let again = file.restaged(7);
        assert_eq!(again.id, 7);
        assert_eq!(again.status, FileStatus::Waiting);
        assert!(again.generated_key.is_none());
    }

    #[test]
    fn test_row_projection() {
        let row = sample().row();
        assert_eq!(row.size, "2.0kb");
        assert_eq!(row.status, "waiting");
        assert!(row.deletable);
    }

    #[test]
    fn test_uploaded_object_json_names() {
        let obj = UploadedObject {
            name: "a.png".into(),
            content_type: "image/png".into(),
            url: "https://b1.r1.aliyuncs.com/a.png".into(),
        };
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["type"], "image/png");
        assert_eq!(json["ossUrl"], "https://b1.r1.aliyuncs.com/a.png");
    }
}

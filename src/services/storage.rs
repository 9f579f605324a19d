use crate::config::UploaderConfig;
use crate::error::UploadError;
use crate::models::UploadPolicy;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use std::collections::BTreeMap;

/// File body handed to the store
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `file` under `key` using a browser-upload policy
    async fn post_object(
        &self,
        key: &str,
        policy: &UploadPolicy,
        file: FilePayload,
    ) -> Result<(), UploadError>;

    /// Public URL of an object
    fn object_url(&self, key: &str) -> String;
}

/// PostObject client for an Aliyun-OSS-style bucket endpoint
pub struct OssStorage {
    http: reqwest::Client,
    endpoint: String,
    extra_fields: BTreeMap<String, String>,
}

impl OssStorage {
    pub fn new(http: reqwest::Client, config: &UploaderConfig) -> Self {
        Self {
            http,
            endpoint: config.storage_endpoint(),
            extra_fields: config.extra_fields.clone(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn form(&self, key: &str, policy: &UploadPolicy, file: FilePayload) -> Result<Form, UploadError> {
        let mut form = Form::new()
            .text("key", key.to_string())
            .text("policy", policy.policy.clone())
            .text("OSSAccessKeyId", policy.access_id.clone())
            .text("signature", policy.signature.clone())
            .text("success_action_status", "200");

        for (name, value) in &self.extra_fields {
            form = form.text(name.clone(), value.clone());
        }

        // The provider ignores every field that follows `file`
        let len = file.data.len() as u64;
        let part = Part::stream_with_length(reqwest::Body::from(file.data), len)
            .file_name(file.name)
            .mime_str(&file.content_type)?;
        Ok(form.part("file", part))
    }
}

#[async_trait]
impl ObjectStore for OssStorage {
    async fn post_object(
        &self,
        key: &str,
        policy: &UploadPolicy,
        file: FilePayload,
    ) -> Result<(), UploadError> {
        let form = self.form(key, policy, file)?;
        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Storage {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.endpoint, key)
    }
}

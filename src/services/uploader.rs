use crate::config::UploaderConfig;
use crate::error::{UploadError, UploadResult};
use crate::models::{FileId, FileRow, FileStatus, PendingFile, PolicyFailure, UploadPolicy, UploadedObject};
use crate::services::policy::PolicyClient;
use crate::services::storage::{FilePayload, ObjectStore, OssStorage};
use crate::utils::object_key::KeyGenerator;
use crate::utils::validation::{FileKind, detect_content_type, display_name};
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::AsyncReadExt;

const HEADER_SNIFF_LEN: usize = 64;

/// Receives the outcome of uploader actions. Every hook defaults to doing nothing.
pub trait UploadListener: Send + Sync {
    /// Called once per completed batch with the objects that made it to storage
    fn on_all_uploaded(&self, _results: &[UploadedObject]) {}

    fn on_policy_failed(&self, _failure: &PolicyFailure) {}

    fn on_dialog_closed(&self) {}

    /// Transient user-facing message
    fn on_notice(&self, _message: &str) {}
}

/// Completion accounting for one batch.
///
/// Successes count up; failures shrink the expected total, so a failed file
/// never keeps the batch open.
#[derive(Debug)]
pub(crate) struct BatchState {
    expected: usize,
    succeeded: usize,
    failed: usize,
    results: Vec<(usize, UploadedObject)>,
    reported: bool,
}

impl BatchState {
    pub(crate) fn new(expected: usize) -> Self {
        Self {
            expected,
            succeeded: 0,
            failed: 0,
            results: Vec::with_capacity(expected),
            reported: false,
        }
    }

    pub(crate) fn record_success(&mut self, position: usize, object: UploadedObject) {
        self.succeeded += 1;
        self.results.push((position, object));
    }

    pub(crate) fn record_failure(&mut self) {
        self.failed += 1;
        self.expected = self.expected.saturating_sub(1);
    }

    /// Hands out the results exactly once, when every dispatched file resolved
    pub(crate) fn take_if_complete(&mut self) -> Option<Vec<UploadedObject>> {
        if self.reported || self.succeeded != self.expected {
            return None;
        }
        self.reported = true;
        let mut results = std::mem::take(&mut self.results);
        results.sort_by_key(|(position, _)| *position);
        Some(results.into_iter().map(|(_, object)| object).collect())
    }
}

struct Job {
    position: usize,
    id: FileId,
    path: PathBuf,
    name: String,
    content_type: String,
    key: String,
}

#[derive(Default)]
struct Staging {
    files: Vec<PendingFile>,
    snapshot: HashSet<PathBuf>,
    next_id: FileId,
    dialog_open: bool,
}

impl Staging {
    fn allocate_id(&mut self) -> FileId {
        self.next_id += 1;
        self.next_id
    }

    fn file_mut(&mut self, id: FileId) -> UploadResult<&mut PendingFile> {
        self.files
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(UploadError::UnknownFile(id))
    }
}

/// Clears the in-progress flag when a batch ends, however it ends
struct BatchGuard<'a>(&'a AtomicBool);

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One upload widget instance: a staged file list plus the policy/storage pipeline
pub struct Uploader {
    config: UploaderConfig,
    kind: FileKind,
    policy: PolicyClient,
    store: Arc<dyn ObjectStore>,
    listener: Arc<dyn UploadListener>,
    staging: Mutex<Staging>,
    in_progress: AtomicBool,
}

impl Uploader {
    /// Validates the configuration and wires up the HTTP-backed pipeline
    pub fn render(config: UploaderConfig, listener: Arc<dyn UploadListener>) -> UploadResult<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let store = Arc::new(OssStorage::new(http.clone(), &config));
        Self::with_store(config, listener, http, store)
    }

    /// Same as `render` with a caller-provided object store
    pub fn with_store(
        config: UploaderConfig,
        listener: Arc<dyn UploadListener>,
        http: reqwest::Client,
        store: Arc<dyn ObjectStore>,
    ) -> UploadResult<Self> {
        config.validate()?;
        let kind = config.file_kind()?;
        let policy = PolicyClient::new(http, &config);
        tracing::info!(
            "📦 Uploader ready: endpoint={}, mode={}",
            store.object_url(""),
            if config.multiple { "multiple" } else { "single" }
        );
        Ok(Self {
            config,
            kind,
            policy,
            store,
            listener,
            staging: Mutex::new(Staging::default()),
            in_progress: AtomicBool::new(false),
        })
    }

    fn staging(&self) -> MutexGuard<'_, Staging> {
        self.staging.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    pub fn is_uploading(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.staging().dialog_open
    }

    /// Opens the file list dialog (multiple mode)
    pub fn open(&self) -> &str {
        self.staging().dialog_open = true;
        tracing::debug!("Dialog opened: {}", self.config.dialog_title);
        &self.config.dialog_title
    }

    /// Closes the dialog, dropping whatever is still staged
    pub fn close(&self) -> UploadResult<()> {
        if self.is_uploading() {
            return Err(UploadError::BatchInProgress);
        }
        {
            let mut staging = self.staging();
            if !staging.dialog_open {
                return Ok(());
            }
            staging.dialog_open = false;
            staging.files.clear();
        }
        self.listener.on_dialog_closed();
        Ok(())
    }

    pub fn rows(&self) -> Vec<FileRow> {
        self.staging().files.iter().map(PendingFile::row).collect()
    }

    pub fn file(&self, id: FileId) -> Option<PendingFile> {
        self.staging().files.iter().find(|f| f.id == id).cloned()
    }

    /// Stages local files. In single mode the selection is deduplicated against
    /// the previous one and submitted right away.
    pub async fn choose<P: AsRef<Path>>(&self, paths: &[P]) -> UploadResult<Vec<FileId>> {
        let mut candidates: Vec<(PathBuf, String, u64, String)> = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            match self.inspect(path).await {
                Ok(file) if candidates.iter().any(|(seen, ..)| *seen == file.0) => {
                    tracing::debug!("{} picked twice, staging it once", path.display());
                }
                Ok(file) => candidates.push(file),
                Err(message) => {
                    tracing::warn!("⚠️  Skipping {}: {}", path.display(), message);
                    self.listener.on_notice(&message);
                }
            }
        }

        let staged = {
            let mut staging = self.staging();
            if self.config.multiple {
                staging.dialog_open = true;
            } else {
                let previous = std::mem::take(&mut staging.snapshot);
                staging.snapshot = candidates.iter().map(|(path, ..)| path.clone()).collect();
                candidates.retain(|(path, ..)| !previous.contains(path));
            }

            let mut staged = Vec::with_capacity(candidates.len());
            for (path, name, size, content_type) in candidates {
                let id = staging.allocate_id();
                staging
                    .files
                    .push(PendingFile::new(id, path, name, size, content_type));
                staged.push(id);
            }
            staged
        };

        tracing::info!("📎 Staged {} file(s)", staged.len());

        if !self.config.multiple {
            if staged.is_empty() {
                tracing::debug!("Selection already submitted, nothing new to upload");
            } else if let Err(e) = self.start().await {
                // Unstage this selection so the same files can be picked again
                self.forget(|f| staged.contains(&f.id));
                return Err(e);
            }
        }
        Ok(staged)
    }

    async fn inspect(&self, path: &Path) -> Result<(PathBuf, String, u64, String), String> {
        let name = display_name(path).map_err(|e| e.message)?;
        self.kind
            .accepts(&name, self.config.file_exts.as_deref())
            .map_err(|e| e.message)?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| format!("cannot read '{}': {}", name, e))?;
        if !metadata.is_file() {
            return Err(format!("'{}' is not a file", name));
        }

        let mut header = [0u8; HEADER_SNIFF_LEN];
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| format!("cannot open '{}': {}", name, e))?;
        let read = file
            .read(&mut header)
            .await
            .map_err(|e| format!("cannot read '{}': {}", name, e))?;
        let content_type = detect_content_type(&name, &header[..read]);

        let path = tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf());
        Ok((path, name, metadata.len(), content_type))
    }

    /// Removes a staged file from the list
    pub fn remove(&self, id: FileId) -> UploadResult<()> {
        let mut staging = self.staging();
        let file = staging.file_mut(id)?;
        if file.status == FileStatus::Uploading {
            return Err(UploadError::FileBusy(id));
        }
        staging.files.retain(|f| f.id != id);
        Ok(())
    }

    /// Replaces a failed file with a fresh waiting copy and returns the new id
    pub fn retry(&self, id: FileId) -> UploadResult<FileId> {
        let mut staging = self.staging();
        let new_id = staging.allocate_id();
        let file = staging.file_mut(id)?;
        if file.status != FileStatus::Failed {
            return Err(UploadError::InvalidTransition {
                from: file.status,
                to: FileStatus::Waiting,
            });
        }
        *file = file.restaged(new_id);
        Ok(new_id)
    }

    /// Uploads every waiting file in one batch:
    /// `fetch_policy -> dispatch_uploads -> await_all -> report_result`.
    pub async fn start(&self) -> UploadResult<Vec<UploadedObject>> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(UploadError::BatchInProgress);
        }
        let _guard = BatchGuard(&self.in_progress);

        let waiting = {
            let staging = self.staging();
            if staging.files.is_empty() {
                drop(staging);
                self.listener.on_notice("select files to upload first");
                return Err(UploadError::NoFilesSelected);
            }
            let ids: Vec<FileId> = staging
                .files
                .iter()
                .filter(|f| f.status == FileStatus::Waiting)
                .map(|f| f.id)
                .collect();
            ids
        };

        if waiting.is_empty() {
            self.listener.on_notice("no files need uploading");
            return Ok(Vec::new());
        }

        tracing::info!("🚀 Starting upload batch of {} file(s)", waiting.len());
        let policy = self.fetch_policy().await?;
        let jobs = self.dispatch_uploads(&waiting);
        let results = self.await_all(&policy, jobs).await;
        Ok(self.report_result(results))
    }

    async fn fetch_policy(&self) -> UploadResult<UploadPolicy> {
        match self.policy.fetch().await {
            Ok(policy) => Ok(policy),
            Err(failure) => {
                tracing::error!("❌ Upload policy unavailable: {}", failure.reason);
                self.listener.on_policy_failed(&failure);
                Err(UploadError::PolicyFailed(failure))
            }
        }
    }

    fn dispatch_uploads(&self, ids: &[FileId]) -> Vec<Job> {
        let mut keys = KeyGenerator::new(self.config.prefix_path.clone());
        let mut staging = self.staging();
        let mut jobs = Vec::with_capacity(ids.len());

        for (position, id) in ids.iter().enumerate() {
            // Removed from the list while the policy was being fetched
            let Ok(file) = staging.file_mut(*id) else {
                tracing::debug!("File {} left the list before dispatch", id);
                continue;
            };
            if let Err(e) = file.transition(FileStatus::Uploading) {
                tracing::warn!("Skipping {}: {}", file.display_name, e);
                continue;
            }
            let key = keys.next_key(&file.display_name);
            file.generated_key = Some(key.clone());
            jobs.push(Job {
                position,
                id: *id,
                path: file.path.clone(),
                name: file.display_name.clone(),
                content_type: file.content_type.clone(),
                key,
            });
        }
        jobs
    }

    async fn await_all(&self, policy: &UploadPolicy, jobs: Vec<Job>) -> Vec<UploadedObject> {
        let limit = match self.config.max_concurrency {
            0 => jobs.len().max(1),
            n => n,
        };
        let mut batch = BatchState::new(jobs.len());
        let store: &dyn ObjectStore = &*self.store;

        let mut outcomes = futures::stream::iter(jobs)
            .map(|job| async move {
                let outcome = upload_one(store, policy, &job).await;
                (job, outcome)
            })
            .buffer_unordered(limit);

        let mut completed = None;
        while let Some((job, outcome)) = outcomes.next().await {
            let status = match outcome {
                Ok(()) => {
                    batch.record_success(
                        job.position,
                        UploadedObject {
                            name: job.name.clone(),
                            content_type: job.content_type.clone(),
                            url: store.object_url(&job.key),
                        },
                    );
                    FileStatus::Succeeded
                }
                Err(e) => {
                    tracing::error!("❌ Failed to upload {}: {}", job.name, e);
                    batch.record_failure();
                    FileStatus::Failed
                }
            };

            if let Ok(file) = self.staging().file_mut(job.id) {
                if let Err(e) = file.transition(status) {
                    tracing::warn!("Status update for {} skipped: {}", job.name, e);
                }
            }

            if let Some(results) = batch.take_if_complete() {
                completed = Some(results);
            }
        }

        if batch.failed > 0 {
            tracing::warn!("⚠️  {} file(s) in the batch failed to upload", batch.failed);
        }
        completed.unwrap_or_default()
    }

    /// Unstages matching files and drops them from the selection snapshot
    fn forget(&self, matches: impl Fn(&PendingFile) -> bool) {
        let mut staging = self.staging();
        let paths: Vec<PathBuf> = staging
            .files
            .iter()
            .filter(|f| matches(*f))
            .map(|f| f.path.clone())
            .collect();
        staging.files.retain(|f| !matches(f));
        for path in &paths {
            staging.snapshot.remove(path);
        }
    }

    fn report_result(&self, results: Vec<UploadedObject>) -> Vec<UploadedObject> {
        if !self.config.multiple {
            self.forget(|f| f.status == FileStatus::Failed);
            self.staging().files.clear();
        }
        tracing::info!("✅ Upload batch finished: {} object(s) stored", results.len());
        self.listener.on_all_uploaded(&results);
        results
    }
}

async fn upload_one(store: &dyn ObjectStore, policy: &UploadPolicy, job: &Job) -> UploadResult<()> {
    let data = tokio::fs::read(&job.path).await?;
    tracing::debug!("Uploading {} as {} ({} bytes)", job.name, job.key, data.len());
    store
        .post_object(
            &job.key,
            policy,
            FilePayload {
                name: job.name.clone(),
                content_type: job.content_type.clone(),
                data: Bytes::from(data),
            },
        )
        .await
}

use async_trait::async_trait;
use mockito::Server;
use oss_uploader::models::UploadPolicy;
use oss_uploader::services::storage::{FilePayload, ObjectStore};
use oss_uploader::{UploadError, UploadListener, Uploader, UploaderConfig};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

struct Quiet;

impl UploadListener for Quiet {}

/// Records every key and holds each upload until released
struct GatedStore {
    gate: Notify,
    keys: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStore for GatedStore {
    async fn post_object(
        &self,
        key: &str,
        policy: &UploadPolicy,
        file: FilePayload,
    ) -> Result<(), UploadError> {
        assert_eq!(policy.access_id, "AK");
        assert!(!file.data.is_empty());
        self.gate.notified().await;
        self.keys.lock().unwrap().push(key.to_string());
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://b1.r1.aliyuncs.com/{key}")
    }
}

#[tokio::test]
async fn test_second_batch_rejected_while_first_runs() {
    let mut server = Server::new_async().await;
    let _policy = server
        .mock("GET", "/policy")
        .with_status(200)
        .with_body(json!({"data": {"accessid": "AK", "signature": "S", "policy": "P"}}).to_string())
        .create_async()
        .await;

    let store = Arc::new(GatedStore {
        gate: Notify::new(),
        keys: Mutex::new(Vec::new()),
    });
    let config = UploaderConfig {
        bucket: "b1".to_string(),
        region: "r1".to_string(),
        policy_url: format!("{}/policy", server.url()),
        multiple: true,
        max_concurrency: 1,
        ..Default::default()
    };
    let uploader =
        Uploader::with_store(config, Arc::new(Quiet), reqwest::Client::new(), store.clone()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let names = ["same.txt", "same.txt", "same.txt"];
    let subdirs: Vec<_> = (0..names.len())
        .map(|i| {
            let sub = dir.path().join(i.to_string());
            std::fs::create_dir(&sub).unwrap();
            let path = sub.join(names[i]);
            std::fs::write(&path, "payload").unwrap();
            path
        })
        .collect();
    uploader.choose(subdirs.as_slice()).await.unwrap();

    let first = uploader.start();
    let second = async {
        while !uploader.is_uploading() {
            tokio::task::yield_now().await;
        }
        let rejected = uploader.start().await;
        assert!(matches!(rejected, Err(UploadError::BatchInProgress)));
        assert!(matches!(uploader.close(), Err(UploadError::BatchInProgress)));
        while store.keys.lock().unwrap().len() < names.len() {
            store.gate.notify_one();
            tokio::task::yield_now().await;
        }
    };
    let (results, ()) = tokio::join!(first, second);

    let results = results.unwrap();
    assert_eq!(results.len(), 3);
    assert!(!uploader.is_uploading());

    let keys = store.keys.lock().unwrap();
    let unique: HashSet<_> = keys.iter().collect();
    assert_eq!(unique.len(), 3);
    assert!(keys.iter().all(|k| k.ends_with("-same.txt")));
    for result in &results {
        assert!(result.url.starts_with("https://b1.r1.aliyuncs.com/"));
    }
}

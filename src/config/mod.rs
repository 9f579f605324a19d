use crate::error::ConfigError;
use crate::utils::validation::FileKind;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::path::Path;

/// PostObject form fields the storage client fills in itself
pub const RESERVED_FORM_FIELDS: &[&str] = &[
    "key",
    "policy",
    "OSSAccessKeyId",
    "signature",
    "success_action_status",
    "file",
];

/// Names of the policy response fields that carry the signed policy.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResponseFields {
    /// Object holding the triple; empty means the response root
    pub data: String,
    pub policy: String,
    pub access_id: String,
    pub signature: String,
    /// Optional expiry, unix seconds
    pub expire: String,
}

impl Default for ResponseFields {
    fn default() -> Self {
        Self {
            data: "data".to_string(),
            policy: "policy".to_string(),
            access_id: "accessid".to_string(),
            signature: "signature".to_string(),
            expire: "expire".to_string(),
        }
    }
}

impl ResponseFields {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("policy field", &self.policy),
            ("access id field", &self.access_id),
            ("signature field", &self.signature),
        ];
        let mut seen = HashSet::new();
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
            if !seen.insert(value.as_str()) {
                return Err(ConfigError::DuplicateField(value.clone()));
            }
        }
        if !self.expire.is_empty() && seen.contains(self.expire.as_str()) {
            return Err(ConfigError::DuplicateField(self.expire.clone()));
        }
        Ok(())
    }
}

/// Upload widget configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    /// "http" or "https" (default: "https")
    pub scheme: String,
    pub bucket: String,
    /// Storage region, e.g. "oss-cn-hangzhou"
    pub region: String,
    /// Provider domain appended after the region (default: "aliyuncs.com")
    pub provider_host: String,
    /// Full endpoint override; bypasses the bucket/region host
    pub endpoint: Option<String>,

    /// Accepted kind: "file", "images", "video" or "audio" (default: "file")
    pub file_type: String,
    /// Optional `|`-separated extension allow-list, e.g. "png|jpg"
    pub file_exts: Option<String>,

    pub policy_url: String,
    /// "GET" or "POST" (default: "GET")
    pub policy_method: String,
    pub policy_data: BTreeMap<String, String>,
    pub policy_headers: BTreeMap<String, String>,
    pub response_fields: ResponseFields,
    /// Status field checked on the policy response; empty disables the check
    pub code_field: String,
    pub code_status: String,

    pub prefix_path: String,
    pub dialog_title: String,
    pub multiple: bool,
    /// Extra form fields sent with every storage POST
    pub extra_fields: BTreeMap<String, String>,
    /// Upper bound on simultaneous uploads; 0 means unbounded
    pub max_concurrency: usize,
    pub timeout_secs: u64,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            bucket: String::new(),
            region: String::new(),
            provider_host: "aliyuncs.com".to_string(),
            endpoint: None,
            file_type: "file".to_string(),
            file_exts: None,
            policy_url: String::new(),
            policy_method: "GET".to_string(),
            policy_data: BTreeMap::new(),
            policy_headers: BTreeMap::new(),
            response_fields: ResponseFields::default(),
            code_field: String::new(),
            code_status: "0".to_string(),
            prefix_path: String::new(),
            dialog_title: "Upload files to Aliyun OSS".to_string(),
            multiple: false,
            extra_fields: BTreeMap::new(),
            max_concurrency: 0,
            timeout_secs: 60,
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn json_map(key: &str) -> Option<BTreeMap<String, String>> {
    let raw = non_empty(key)?;
    match serde_json::from_str(&raw) {
        Ok(map) => Some(map),
        Err(e) => {
            tracing::warn!("Ignoring {}: not a JSON object of strings ({})", key, e);
            None
        }
    }
}

impl UploaderConfig {
    /// Load configuration from environment variables.
    ///
    /// Blank values fall back to defaults, except `OSS_DATA_FIELD` (blank reads the
    /// triple from the response root) and `OSS_EXPIRE_FIELD` (blank disables the expiry check).
    pub fn from_env() -> Self {
        let default = Self::default();
        let fields = ResponseFields::default();

        Self {
            scheme: non_empty("OSS_SCHEME").unwrap_or(default.scheme),
            bucket: non_empty("OSS_BUCKET").unwrap_or_default(),
            region: non_empty("OSS_REGION").unwrap_or_default(),
            provider_host: non_empty("OSS_PROVIDER_HOST").unwrap_or(default.provider_host),
            endpoint: non_empty("OSS_ENDPOINT"),
            file_type: non_empty("OSS_FILE_TYPE").unwrap_or(default.file_type),
            file_exts: non_empty("OSS_FILE_EXTS"),
            policy_url: non_empty("OSS_POLICY_URL").unwrap_or_default(),
            policy_method: non_empty("OSS_POLICY_METHOD").unwrap_or(default.policy_method),
            policy_data: json_map("OSS_POLICY_DATA").unwrap_or_default(),
            policy_headers: json_map("OSS_POLICY_HEADERS").unwrap_or_default(),
            response_fields: ResponseFields {
                data: env::var("OSS_DATA_FIELD").unwrap_or(fields.data),
                policy: non_empty("OSS_POLICY_FIELD").unwrap_or(fields.policy),
                access_id: non_empty("OSS_ACCESSID_FIELD").unwrap_or(fields.access_id),
                signature: non_empty("OSS_SIGNATURE_FIELD").unwrap_or(fields.signature),
                expire: env::var("OSS_EXPIRE_FIELD").unwrap_or(fields.expire),
            },
            code_field: non_empty("OSS_CODE_FIELD").unwrap_or_default(),
            code_status: non_empty("OSS_CODE_STATUS").unwrap_or(default.code_status),
            prefix_path: non_empty("OSS_PREFIX_PATH").unwrap_or_default(),
            dialog_title: non_empty("OSS_DIALOG_TITLE").unwrap_or(default.dialog_title),
            multiple: env::var("OSS_MULTIPLE")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.multiple),
            extra_fields: json_map("OSS_EXTRA_FIELDS").unwrap_or_default(),
            max_concurrency: non_empty("OSS_MAX_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_concurrency),
            timeout_secs: non_empty("OSS_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.timeout_secs),
        }
    }

    /// Load configuration from a JSON file; missing keys take their defaults
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheme != "http" && self.scheme != "https" {
            return Err(ConfigError::Invalid {
                field: "scheme",
                value: self.scheme.clone(),
            });
        }
        if self.endpoint.is_none() {
            if self.bucket.trim().is_empty() {
                return Err(ConfigError::Missing("bucket"));
            }
            if self.region.trim().is_empty() {
                return Err(ConfigError::Missing("region"));
            }
        }
        if self.policy_url.trim().is_empty() {
            return Err(ConfigError::Missing("policy url"));
        }
        if !matches!(self.policy_method.to_uppercase().as_str(), "GET" | "POST") {
            return Err(ConfigError::Invalid {
                field: "policy method",
                value: self.policy_method.clone(),
            });
        }
        if let Some(name) = self
            .extra_fields
            .keys()
            .find(|name| RESERVED_FORM_FIELDS.iter().any(|r| r.eq_ignore_ascii_case(name)))
        {
            return Err(ConfigError::ReservedField(name.clone()));
        }
        self.file_kind()?;
        self.response_fields.validate()
    }

    pub fn file_kind(&self) -> Result<FileKind, ConfigError> {
        self.file_type.parse().map_err(|_| ConfigError::Invalid {
            field: "file type",
            value: self.file_type.clone(),
        })
    }

    /// `{scheme}://{bucket}.{region}.{provider_host}` unless overridden
    pub fn storage_endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!(
                "{}://{}.{}.{}",
                self.scheme, self.bucket, self.region, self.provider_host
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> UploaderConfig {
        UploaderConfig {
            bucket: "b1".to_string(),
            region: "r1".to_string(),
            policy_url: "http://localhost/policy".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = UploaderConfig::default();
        assert_eq!(config.scheme, "https");
        assert_eq!(config.policy_method, "GET");
        assert_eq!(config.code_status, "0");
        assert!(config.code_field.is_empty());
        assert!(!config.multiple);
    }

    #[test]
    fn test_storage_endpoint() {
        assert_eq!(valid().storage_endpoint(), "https://b1.r1.aliyuncs.com");

        let config = UploaderConfig {
            endpoint: Some("http://127.0.0.1:9000/".to_string()),
            ..valid()
        };
        assert_eq!(config.storage_endpoint(), "http://127.0.0.1:9000");
    }

    #[test]
    fn test_validate_required_fields() {
        assert!(valid().validate().is_ok());

        let config = UploaderConfig {
            bucket: String::new(),
            ..valid()
        };
        assert_eq!(config.validate(), Err(ConfigError::Missing("bucket")));

        let config = UploaderConfig {
            policy_url: " ".to_string(),
            ..valid()
        };
        assert_eq!(config.validate(), Err(ConfigError::Missing("policy url")));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = UploaderConfig {
            scheme: "ftp".to_string(),
            ..valid()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "scheme", .. })));

        let config = UploaderConfig {
            policy_method: "PATCH".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = UploaderConfig {
            file_type: "documents".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_response_fields_must_be_distinct() {
        let mut config = valid();
        config.response_fields.signature = "policy".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateField("policy".to_string()))
        );

        let mut config = valid();
        config.response_fields.access_id = String::new();
        assert_eq!(config.validate(), Err(ConfigError::Missing("access id field")));
    }

    #[test]
    fn test_from_json_with_partial_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oss.json");
        std::fs::write(
            &path,
            r#"{"bucket": "b1", "region": "r1", "policy_url": "http://x/p", "multiple": true,
                "response_fields": {"access_id": "OSSAccessKeyId"}}"#,
        )
        .unwrap();

        let config = UploaderConfig::from_file(&path).unwrap();
        assert!(config.multiple);
        assert_eq!(config.scheme, "https");
        assert_eq!(config.response_fields.access_id, "OSSAccessKeyId");
        assert_eq!(config.response_fields.policy, "policy");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_extra_fields_cannot_shadow_policy_fields() {
        let mut config = valid();
        config
            .extra_fields
            .insert("x-oss-meta-source".to_string(), "cli".to_string());
        assert!(config.validate().is_ok());

        for reserved in ["key", "Signature", "file"] {
            let mut config = valid();
            config
                .extra_fields
                .insert(reserved.to_string(), "x".to_string());
            assert_eq!(
                config.validate(),
                Err(ConfigError::ReservedField(reserved.to_string()))
            );
        }
    }

    // Only test in the crate touching OSS_* variables
    #[test]
    fn test_from_env() {
        const VARS: &[&str] = &[
            "OSS_SCHEME",
            "OSS_BUCKET",
            "OSS_REGION",
            "OSS_PROVIDER_HOST",
            "OSS_ENDPOINT",
            "OSS_FILE_TYPE",
            "OSS_FILE_EXTS",
            "OSS_POLICY_URL",
            "OSS_POLICY_METHOD",
            "OSS_POLICY_DATA",
            "OSS_POLICY_HEADERS",
            "OSS_DATA_FIELD",
            "OSS_POLICY_FIELD",
            "OSS_ACCESSID_FIELD",
            "OSS_SIGNATURE_FIELD",
            "OSS_EXPIRE_FIELD",
            "OSS_CODE_FIELD",
            "OSS_CODE_STATUS",
            "OSS_PREFIX_PATH",
            "OSS_DIALOG_TITLE",
            "OSS_MULTIPLE",
            "OSS_EXTRA_FIELDS",
            "OSS_MAX_CONCURRENCY",
            "OSS_TIMEOUT_SECS",
        ];
        for var in VARS {
            unsafe { env::remove_var(var) };
        }

        let config = UploaderConfig::from_env();
        assert_eq!(config.scheme, "https");
        assert_eq!(config.provider_host, "aliyuncs.com");
        assert_eq!(config.policy_method, "GET");
        assert_eq!(config.response_fields, ResponseFields::default());
        assert_eq!(config.timeout_secs, 60);
        assert!(!config.multiple);
        assert!(config.endpoint.is_none());

        unsafe {
            env::set_var("OSS_SCHEME", "");
            env::set_var("OSS_POLICY_METHOD", "  ");
            env::set_var("OSS_BUCKET", "b1");
            env::set_var("OSS_REGION", "oss-cn-hangzhou");
            env::set_var("OSS_POLICY_URL", "http://localhost/policy");
            env::set_var("OSS_MULTIPLE", "TRUE");
            env::set_var("OSS_POLICY_HEADERS", r#"{"x-token": "secret"}"#);
            env::set_var("OSS_EXTRA_FIELDS", "not json");
            env::set_var("OSS_MAX_CONCURRENCY", "4");
            env::set_var("OSS_TIMEOUT_SECS", "soon");
            env::set_var("OSS_ACCESSID_FIELD", "");
            env::set_var("OSS_DATA_FIELD", "");
            env::set_var("OSS_EXPIRE_FIELD", "");
        }
        let config = UploaderConfig::from_env();
        for var in VARS {
            unsafe { env::remove_var(var) };
        }

        assert_eq!(config.scheme, "https");
        assert_eq!(config.policy_method, "GET");
        assert_eq!(config.storage_endpoint(), "https://b1.oss-cn-hangzhou.aliyuncs.com");
        assert!(config.multiple);
        assert_eq!(config.policy_headers.get("x-token").map(String::as_str), Some("secret"));
        assert!(config.extra_fields.is_empty());
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.response_fields.access_id, "accessid");
        // Blank data and expire fields mean "response root" and "no expiry"
        assert_eq!(config.response_fields.data, "");
        assert_eq!(config.response_fields.expire, "");
        assert!(config.validate().is_ok());
    }
}

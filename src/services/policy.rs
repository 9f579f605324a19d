use crate::config::{ResponseFields, UploaderConfig};
use crate::error::PolicyError;
use crate::models::{PolicyFailure, UploadPolicy};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

impl ResponseFields {
    /// Reads the policy triple out of a policy endpoint response
    pub fn map(&self, response: &Value) -> Result<UploadPolicy, PolicyError> {
        let data = if self.data.is_empty() {
            response
        } else {
            response
                .get(&self.data)
                .filter(|v| v.is_object())
                .ok_or_else(|| PolicyError::MissingField(self.data.clone()))?
        };

        let text = |field: &str| -> Result<String, PolicyError> {
            data.get(field)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| PolicyError::MissingField(field.to_string()))
        };

        let expires_at = if self.expire.is_empty() {
            None
        } else {
            data.get(&self.expire).and_then(parse_expiry)
        };

        Ok(UploadPolicy {
            access_id: text(&self.access_id)?,
            signature: text(&self.signature)?,
            policy: text(&self.policy)?,
            expires_at,
        })
    }
}

fn parse_expiry(value: &Value) -> Option<DateTime<Utc>> {
    let secs = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    match secs {
        Some(secs) => DateTime::from_timestamp(secs, 0),
        None => {
            tracing::warn!("Ignoring unreadable policy expiry: {}", value);
            None
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Loose equality between a response status value and the configured expectation
pub fn status_matches(actual: &Value, expected: &str) -> bool {
    let actual = value_text(actual);
    let expected = expected.trim();
    if actual == expected {
        return true;
    }
    match (actual.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Fetches a signed upload policy from the application's policy endpoint
pub struct PolicyClient {
    http: reqwest::Client,
    url: String,
    method: reqwest::Method,
    data: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    fields: ResponseFields,
    code_field: String,
    code_status: String,
}

impl PolicyClient {
    pub fn new(http: reqwest::Client, config: &UploaderConfig) -> Self {
        let method = if config.policy_method.eq_ignore_ascii_case("POST") {
            reqwest::Method::POST
        } else {
            reqwest::Method::GET
        };
        Self {
            http,
            url: config.policy_url.clone(),
            method,
            data: config.policy_data.clone(),
            headers: config.policy_headers.clone(),
            fields: config.response_fields.clone(),
            code_field: config.code_field.clone(),
            code_status: config.code_status.clone(),
        }
    }

    /// One request, no retry. Any problem comes back as the raw answer plus a reason.
    pub async fn fetch(&self) -> Result<UploadPolicy, PolicyFailure> {
        let (status, body) = self.request().await.map_err(|e| PolicyFailure {
            status: None,
            body: String::new(),
            reason: e.to_string(),
        })?;

        self.accept(status, &body, Utc::now())
            .map_err(|e| PolicyFailure {
                status: Some(status),
                body,
                reason: e.to_string(),
            })
    }

    async fn request(&self) -> Result<(u16, String), PolicyError> {
        let mut request = self.http.request(self.method.clone(), &self.url);
        request = if self.method == reqwest::Method::GET {
            request.query(&self.data)
        } else {
            request.form(&self.data)
        };
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        tracing::debug!("Requesting upload policy: {} {}", self.method, self.url);
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }

    /// Interprets a policy response
    pub fn accept(
        &self,
        status: u16,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<UploadPolicy, PolicyError> {
        if !(200..300).contains(&status) {
            return Err(PolicyError::Status(status));
        }

        let value: Value = serde_json::from_str(body).map_err(|_| PolicyError::NotJson)?;
        if !value.is_object() {
            return Err(PolicyError::NotJson);
        }

        if !self.code_field.is_empty() {
            let actual = value.get(&self.code_field).unwrap_or(&Value::Null);
            if !status_matches(actual, &self.code_status) {
                return Err(PolicyError::Rejected {
                    field: self.code_field.clone(),
                    expected: self.code_status.clone(),
                    actual: value_text(actual),
                });
            }
        }

        let policy = self.fields.map(&value)?;
        if let Some(at) = policy.expires_at {
            if policy.is_expired(now) {
                return Err(PolicyError::Expired(at));
            }
        }
        Ok(policy)
    }
}

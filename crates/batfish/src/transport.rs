//! HTTP transport to the coordinator.
//!
//! Two API surfaces share one connection pool: the original work-manager
//! service (multipart forms, `[status, payload]` envelopes) and the v2 JSON
//! API (header-authenticated). All calls run under a shared retry policy;
//! the initial connectivity check uses a fail-fast variant so an unreachable
//! coordinator errors in seconds rather than minutes.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::multipart;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::work::{TaskStatus, WorkBackend, WorkItem, WorkStatus};
use crate::{
    CLIENT_VERSION, DEFAULT_HOST, DEFAULT_PORT_V1, DEFAULT_PORT_V2, SERVICE_BASE_V1,
    SERVICE_BASE_V2,
};

/// Envelope status marker for a successful work-manager call.
const SVC_SUCCESS: &str = "success";

/// HTTP statuses that trigger a retry with backoff.
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

const HEADER_API_KEY: &str = "X-Batfish-Apikey";
const HEADER_VERSION: &str = "X-Batfish-Version";

/// API key used when the caller does not supply one.
pub const DEFAULT_API_KEY: &str = "00000000000000000000000000000000";

/// Connection retry policy: exponential backoff between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// The shared policy for all steady-state calls: up to 10 attempts,
    /// 0.8s initial backoff doubling per attempt, capped at 120s.
    pub fn standard() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(800),
            max_backoff: Duration::from_secs(120),
        }
    }

    /// Far fewer retries, for the initial connectivity check.
    pub fn fail_fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(800),
            max_backoff: Duration::from_secs(2),
        }
    }

    /// Backoff to sleep after `completed_attempts` failed attempts.
    pub fn backoff(&self, completed_attempts: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(1 << completed_attempts.min(20))
            .min(self.max_backoff)
    }
}

/// Coordinator connection settings. Read once at construction, immutable
/// thereafter.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub host: String,
    pub port_v1: u16,
    pub port_v2: u16,
    pub ssl: bool,
    pub verify_ssl_certs: bool,
    pub api_key: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            host: DEFAULT_HOST.to_string(),
            port_v1: DEFAULT_PORT_V1,
            port_v2: DEFAULT_PORT_V2,
            ssl: false,
            verify_ssl_certs: true,
            api_key: DEFAULT_API_KEY.to_string(),
        }
    }
}

fn service_urls(config: &CoordinatorConfig) -> (String, String) {
    let scheme = if config.ssl { "https" } else { "http" };
    (
        format!(
            "{}://{}:{}{}",
            scheme, config.host, config.port_v1, SERVICE_BASE_V1
        ),
        format!(
            "{}://{}:{}{}",
            scheme, config.host, config.port_v2, SERVICE_BASE_V2
        ),
    )
}

/// HTTP client for both coordinator API surfaces.
///
/// Owns the connection pool; clones share it. No global state.
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    base_v1: String,
    base_v2: String,
    api_key: String,
    retry: RetryPolicy,
}

impl Transport {
    pub fn new(config: &CoordinatorConfig) -> Result<Transport> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_ssl_certs)
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;
        let (base_v1, base_v2) = service_urls(config);
        Ok(Transport {
            client,
            base_v1,
            base_v2,
            api_key: config.api_key.clone(),
            retry: RetryPolicy::standard(),
        })
    }

    /// Sends a request until it returns a non-retryable response or the
    /// policy is exhausted. Retries on connect/timeout failures and on
    /// HTTP 429/500/502/503/504.
    async fn request_with_retry<F>(
        &self,
        policy: &RetryPolicy,
        build: F,
    ) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_error = String::new();
        for attempt in 0..policy.max_attempts {
            if attempt > 0 {
                let delay = policy.backoff(attempt - 1);
                debug!(
                    "retrying request (attempt {}/{}) after {:?}: {}",
                    attempt + 1,
                    policy.max_attempts,
                    delay,
                    last_error
                );
                tokio::time::sleep(delay).await;
            }
            match build().send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if RETRYABLE_STATUSES.contains(&status) {
                        last_error = format!("HTTP {}", status);
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) if err.is_connect() || err.is_timeout() => {
                    last_error = err.to_string();
                    continue;
                }
                Err(err) => return Err(Error::Connection(err.to_string())),
            }
        }
        Err(Error::Connection(format!(
            "giving up after {} attempts: {}",
            policy.max_attempts, last_error
        )))
    }

    /// One work-manager call: posts a multipart form and unwraps the
    /// `[status, payload]` envelope.
    async fn v1_post<F>(&self, endpoint: &str, form: F) -> Result<Value>
    where
        F: Fn() -> multipart::Form,
    {
        let url = format!("{}/{}", self.base_v1, endpoint);
        let response = self
            .request_with_retry(&self.retry, || self.client.post(&url).multipart(form()))
            .await?;
        if !response.status().is_success() {
            return Err(Error::Submission(format!(
                "{} returned HTTP {}",
                endpoint,
                response.status()
            )));
        }
        let envelope: (String, Value) = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("{} envelope: {}", endpoint, e)))?;
        if envelope.0 != SVC_SUCCESS {
            return Err(Error::Submission(format!(
                "{} failed: {}",
                endpoint, envelope.1
            )));
        }
        Ok(envelope.1)
    }

    /// Fetches the backend's question templates, keyed by name.
    pub async fn get_question_templates(&self) -> Result<HashMap<String, Value>> {
        let api_key = self.api_key.clone();
        let payload = self
            .v1_post("getquestiontemplates", || {
                multipart::Form::new().text("apikey", api_key.clone())
            })
            .await?;
        let list = payload
            .get("questionlist")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                Error::Submission("getquestiontemplates response has no questionlist".to_string())
            })?;
        let mut templates = HashMap::new();
        for (name, template) in list {
            // templates may arrive JSON-encoded
            let template = match template.as_str() {
                Some(encoded) => serde_json::from_str(encoded).map_err(|e| {
                    Error::Deserialization(format!("question template {}: {}", name, e))
                })?,
                None => template.clone(),
            };
            templates.insert(name.clone(), template);
        }
        Ok(templates)
    }

    /// Uploads a zipped snapshot under the fixed `zipfile` form field.
    pub async fn upload_snapshot(
        &self,
        network: &str,
        snapshot: &str,
        zip_bytes: Vec<u8>,
    ) -> Result<()> {
        let api_key = self.api_key.clone();
        let network = network.to_string();
        let snapshot = snapshot.to_string();
        self.v1_post("uploadsnapshot", || {
            multipart::Form::new()
                .text("apikey", api_key.clone())
                .text("networkname", network.clone())
                .text("snapshotname", snapshot.clone())
                .part(
                    "zipfile",
                    multipart::Part::bytes(zip_bytes.clone()).file_name("snapshot.zip"),
                )
        })
        .await?;
        Ok(())
    }

    fn v2_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_v2, path))
            .header(HEADER_API_KEY, &self.api_key)
            .header(HEADER_VERSION, CLIENT_VERSION)
    }

    async fn v2_expect_success(
        response: reqwest::Response,
        path: &str,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Submission(format!(
            "{} returned HTTP {}: {}",
            path, status, body
        )))
    }

    pub async fn v2_get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .request_with_retry(&self.retry, || self.v2_request(reqwest::Method::GET, path))
            .await?;
        Self::v2_expect_success(response, path)
            .await?
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("{}: {}", path, e)))
    }

    pub async fn v2_post<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let response = self
            .request_with_retry(&self.retry, || {
                self.v2_request(reqwest::Method::POST, path).json(body)
            })
            .await?;
        Self::v2_expect_success(response, path).await?;
        Ok(())
    }

    pub async fn v2_put<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let response = self
            .request_with_retry(&self.retry, || {
                self.v2_request(reqwest::Method::PUT, path).json(body)
            })
            .await?;
        Self::v2_expect_success(response, path).await?;
        Ok(())
    }

    pub async fn v2_delete(&self, path: &str) -> Result<()> {
        let response = self
            .request_with_retry(&self.retry, || {
                self.v2_request(reqwest::Method::DELETE, path)
            })
            .await?;
        Self::v2_expect_success(response, path).await?;
        Ok(())
    }

    /// Initial connectivity and version check, under the fail-fast policy.
    pub async fn check_version(&self) -> Result<String> {
        let response = self
            .request_with_retry(&RetryPolicy::fail_fast(), || {
                self.v2_request(reqwest::Method::GET, "/version")
            })
            .await?;
        let value: Value = Self::v2_expect_success(response, "/version")
            .await?
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("/version: {}", e)))?;
        Ok(value
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }
}

#[async_trait]
impl WorkBackend for Transport {
    async fn queue_work(&self, item: &WorkItem) -> Result<()> {
        let encoded = serde_json::to_string(item)?;
        let api_key = self.api_key.clone();
        self.v1_post("queuework", || {
            multipart::Form::new()
                .text("apikey", api_key.clone())
                .text("workitem", encoded.clone())
                .text("version", CLIENT_VERSION)
        })
        .await?;
        Ok(())
    }

    async fn work_status(&self, work_id: &str) -> Result<(WorkStatus, TaskStatus)> {
        let api_key = self.api_key.clone();
        let work_id_owned = work_id.to_string();
        let payload = self
            .v1_post("getworkstatus", || {
                multipart::Form::new()
                    .text("apikey", api_key.clone())
                    .text("workid", work_id_owned.clone())
            })
            .await?;
        let status = payload
            .get("workstatus")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Submission("getworkstatus response has no workstatus".to_string())
            })?
            .parse::<WorkStatus>()?;
        let encoded_task = payload
            .get("taskstatus")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Submission("getworkstatus response has no taskstatus".to_string())
            })?;
        Ok((status, TaskStatus::parse(encoded_task)?))
    }

    async fn get_object(
        &self,
        network: &str,
        snapshot: Option<&str>,
        key: &str,
    ) -> Result<String> {
        let url = format!("{}/getobject", self.base_v1);
        let api_key = self.api_key.clone();
        let network = network.to_string();
        let snapshot = snapshot.map(String::from);
        let key = key.to_string();
        let response = self
            .request_with_retry(&self.retry, || {
                let mut form = multipart::Form::new()
                    .text("apikey", api_key.clone())
                    .text("networkname", network.clone())
                    .text("objectname", key.clone());
                if let Some(snapshot) = &snapshot {
                    form = form.text("snapshotname", snapshot.clone());
                }
                self.client.post(&url).multipart(form)
            })
            .await?;
        if !response.status().is_success() {
            return Err(Error::Submission(format!(
                "getobject {} returned HTTP {}",
                key,
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| Error::Deserialization(format!("getobject {}: {}", key, e)))
    }

    async fn kill_work(&self, work_id: &str) -> Result<()> {
        let api_key = self.api_key.clone();
        let work_id_owned = work_id.to_string();
        self.v1_post("killwork", || {
            multipart::Form::new()
                .text("apikey", api_key.clone())
                .text("workid", work_id_owned.clone())
        })
        .await?;
        Ok(())
    }
}

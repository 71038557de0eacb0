use log::{debug, info, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::auth::Credentials;
use crate::config::HttpConfig;
use crate::error::{BridgeError, Result};

use super::types::{
    parse_artifact_version, ArtifactsResponse, BuildRecord, BuildTypeSummary, BuildTypesResponse,
    QueueBuildBody,
};

const REST_PREFIX: &str = "httpAuth/app/rest/";
const APPLICATION_JSON: &str = "application/json";

/// Stateless TeamCity REST client. Every call is a single authenticated
/// request/response; nothing is cached between calls.
pub struct TeamCityClient {
    client: Client,
    base_url: Url,
    credentials: Credentials,
    max_retries: u32,
    retry_delay: Duration,
}

impl TeamCityClient {
    /// # Errors
    ///
    /// Returns a configuration error if the server URL does not parse or the
    /// HTTP client cannot be built.
    pub fn new(credentials: Credentials, http: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("teamcity-buildbot/", env!("CARGO_PKG_VERSION")))
            .timeout(http.timeout())
            .build()
            .map_err(|e| BridgeError::Config(format!("Failed to create HTTP client: {e}")))?;

        let mut base_url = Url::parse(&credentials.url)
            .map_err(|e| BridgeError::Config(format!("Invalid TeamCity URL: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            credentials,
            max_retries: http.max_retries,
            retry_delay: http.retry_delay(),
        })
    }

    fn rest_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(REST_PREFIX)
            .and_then(|rest| rest.join(path))
            .map_err(|e| BridgeError::Config(format!("Invalid TeamCity endpoint {path}: {e}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.credentials
            .apply(self.client.request(method, url))
            .header(ACCEPT, APPLICATION_JSON)
            .header(CONTENT_TYPE, APPLICATION_JSON)
    }

    /// GET with bounded retry on connection failures, timeouts, 429 and 5xx.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let mut attempt = 0;
        loop {
            debug!("GET {url}");
            let response = match self.request(Method::GET, url.clone()).send().await {
                Ok(resp) => resp,
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Network error ({e}), retrying {url} ({attempt}/{})...",
                        self.max_retries
                    );
                    tokio::time::sleep(self.retry_delay.saturating_mul(attempt)).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if (status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error())
                && attempt < self.max_retries
            {
                attempt += 1;
                warn!(
                    "TeamCity returned {status}, retrying {url} ({attempt}/{})...",
                    self.max_retries
                );
                tokio::time::sleep(self.retry_delay.saturating_mul(attempt)).await;
                continue;
            }

            return Self::read_json(response).await;
        }
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(BridgeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| BridgeError::Api {
            status: status.as_u16(),
            message: format!("Malformed response body: {e}"),
        })
    }

    /// Queues a build of `config_id` on `branch`.
    ///
    /// Never retried, so a flaky network cannot queue the same build twice.
    pub async fn queue_build(
        &self,
        config_id: &str,
        branch: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<BuildRecord> {
        if config_id.trim().is_empty() {
            return Err(BridgeError::InvalidState(
                "build configuration id is empty".to_string(),
            ));
        }

        let url = self.rest_url("buildQueue")?;
        let body = QueueBuildBody::new(config_id, branch, params);
        let response = self.request(Method::POST, url).json(&body).send().await?;
        let record: BuildRecord = Self::read_json(response).await?;

        info!(
            "Queued {} on {branch} as {} ({})",
            config_id, record.id, record.href
        );
        Ok(record)
    }

    /// Re-fetches a build through the locator the server handed out.
    pub async fn get_build_by_locator(&self, href: &str) -> Result<BuildRecord> {
        let url = self
            .base_url
            .join(href)
            .map_err(|e| BridgeError::Parse(format!("Invalid build locator {href}: {e}")))?;
        self.get_json(url).await
    }

    pub async fn get_build_by_task_id(&self, task_id: &str) -> Result<BuildRecord> {
        if task_id.is_empty() || !task_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BridgeError::Parse(format!(
                "Task id must be numeric, got '{task_id}'"
            )));
        }
        let url = self.rest_url(&format!("buildQueue/taskId:{task_id}"))?;
        self.get_json(url).await
    }

    /// All build configurations, sorted by id.
    pub async fn list_build_types(&self) -> Result<Vec<BuildTypeSummary>> {
        let url = self.rest_url("buildTypes")?;
        let response: BuildTypesResponse = self.get_json(url).await?;

        let mut build_types = response.build_types;
        build_types.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(build_types)
    }

    /// Version token of the first artifact named `<name>.v<version>.zip`.
    pub async fn get_artifact_version(&self, build_id: i64) -> Result<String> {
        let url = self.rest_url(&format!("builds/id:{build_id}/artifacts/children"))?;
        let response: ArtifactsResponse = self.get_json(url).await?;

        response
            .file
            .iter()
            .find_map(|file| parse_artifact_version(&file.name))
            .ok_or_else(|| {
                BridgeError::NotFound(format!("No versioned artifact for build {build_id}"))
            })
    }

    pub async fn latest_successful_build(&self, build_type: &str) -> Result<BuildRecord> {
        validate_build_type(build_type)?;
        let url = self.rest_url(&format!(
            "buildTypes/id:{build_type}/builds/running:false,status:success"
        ))?;
        self.get_json(url).await
    }

    /// Artifact version of the newest successful build of `build_type`.
    pub async fn latest_artifact_version(&self, build_type: &str) -> Result<String> {
        let build = self.latest_successful_build(build_type).await?;
        self.get_artifact_version(build.id).await
    }
}

fn validate_build_type(build_type: &str) -> Result<()> {
    let valid = !build_type.is_empty()
        && build_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BridgeError::Parse(format!(
            "Invalid build configuration id '{build_type}'"
        )))
    }
}

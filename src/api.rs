use crate::config::Config;
use crate::error::SyncError;
use crate::models::{EntityId, Snapshot};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE};
use std::future::Future;
use url::Url;

/// Operator decision on a pending join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

/// The server the console reconciles against.
pub trait ConsoleApi: Send + Sync + 'static {
    fn fetch_status(&self) -> impl Future<Output = Result<Snapshot, SyncError>> + Send;

    /// Any non-2xx answer is a failure; the body is not inspected.
    fn decide(
        &self,
        id: EntityId,
        decision: Decision,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    fn mark_intruders_read(&self) -> impl Future<Output = Result<(), SyncError>> + Send;
}

pub struct HttpConsoleApi {
    client: reqwest::Client,
    base_url: Url,
    network_id: u64,
}

impl HttpConsoleApi {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &config.csrf_token {
            headers.insert("X-CSRFToken", HeaderValue::from_str(token)?);
        }
        if let Some(session) = &config.session_cookie {
            headers.insert(COOKIE, HeaderValue::from_str(&format!("sessionid={}", session))?);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            network_id: config.network_id,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
        self.base_url
            .join(path)
            .map_err(|e| SyncError::Network(format!("bad endpoint {}: {}", path, e)))
    }

    pub fn status_url(&self) -> Result<Url, SyncError> {
        self.endpoint(&format!("/n/live/api/network/{}/status/", self.network_id))
    }

    pub fn decision_url(&self, id: EntityId, decision: Decision) -> Result<Url, SyncError> {
        self.endpoint(&format!("/n/live/api/join-request/{}/{}/", id, decision.as_str()))
    }
}

impl ConsoleApi for HttpConsoleApi {
    async fn fetch_status(&self) -> Result<Snapshot, SyncError> {
        let url = self.status_url()?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Network(format!("status endpoint answered {}", status)));
        }
        let body = response.bytes().await?;
        Snapshot::from_slice(&body)
    }

    async fn decide(&self, id: EntityId, decision: Decision) -> Result<(), SyncError> {
        let action_error = |reason: String| SyncError::Action {
            action: decision.as_str(),
            id,
            reason,
        };
        let url = self.decision_url(id, decision)?;
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| action_error(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(action_error(format!("server answered {}", status)))
        }
    }

    async fn mark_intruders_read(&self) -> Result<(), SyncError> {
        let url = self.endpoint("/n/live/api/mark-intruders-read/")?;
        self.client.post(url).body("{}").send().await?;
        Ok(())
    }
}

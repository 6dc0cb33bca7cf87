use crate::domain::models::{CompletedCycle, Task};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct SyncTasksResponse {
    pub ok: bool,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub synced: usize,
}

#[async_trait]
pub trait TaskSyncClient: Send + Sync {
    async fn sync_tasks(&self, tasks: &[Task]) -> Result<SyncTasksResponse, InfraError>;

    async fn report_cycle(&self, cycle: &CompletedCycle) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTaskSyncClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, serde::Serialize)]
struct SyncTasksRequest<'a> {
    tasks: &'a [Task],
}

impl ReqwestTaskSyncClient {
    pub fn new(api_url: &str) -> Result<Self, InfraError> {
        let trimmed = api_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(InfraError::InvalidConfig("apiUrl must not be empty".to_string()));
        }
        let base_url = Url::parse(&format!("{trimmed}/"))
            .map_err(|error| InfraError::InvalidConfig(format!("invalid apiUrl '{api_url}': {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(format!(
                "apiUrl '{api_url}' cannot be a base"
            )));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| InfraError::Remote(format!("failed building http client: {error}")))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, InfraError> {
        self.base_url
            .join(path)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid endpoint '{path}': {error}")))
    }

    fn http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("sync api error: http {}", status.as_u16())
        } else {
            format!("sync api error: http {}; body={body}", status.as_u16())
        };
        InfraError::Remote(message)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, InfraError>
    where
        B: serde::Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|error| InfraError::Remote(format!("network error calling {path}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Remote(format!("failed reading {path} response: {error}")))?;

        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|error| {
            InfraError::Remote(format!("invalid {path} payload: {error}; body={body}"))
        })
    }
}

#[async_trait]
impl TaskSyncClient for ReqwestTaskSyncClient {
    async fn sync_tasks(&self, tasks: &[Task]) -> Result<SyncTasksResponse, InfraError> {
        self.post_json("tasks/sync", &SyncTasksRequest { tasks }).await
    }

    async fn report_cycle(&self, cycle: &CompletedCycle) -> Result<(), InfraError> {
        let _: serde_json::Value = self.post_json("cycles", cycle).await?;
        Ok(())
    }
}

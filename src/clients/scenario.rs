//! Hub scenario execution over the web API.

use crate::error::HubError;
use async_trait::async_trait;
use tracing::info;

/// The scenario-execution boundary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScenarioService: Send + Sync {
    /// Run the scenario registered under `name`.
    async fn run(&self, name: String) -> Result<(), HubError>;
}

/// Forwards scenario runs to the hub's HTTP API.
pub struct HttpScenarioService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpScenarioService {
    /// Service posting to `base_url` (e.g. `http://localhost:8080`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ScenarioService for HttpScenarioService {
    async fn run(&self, name: String) -> Result<(), HubError> {
        let url = format!("{}/api/scenarios/{name}/run", self.base_url);
        let response = self.http.post(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(HubError::NotFound(format!("сценарий «{name}»")));
        }
        response.error_for_status()?;
        info!(scenario = %name, "scenario started");
        Ok(())
    }
}

//! Continuous log injection into a log-emitter app

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use shared::TestConfig;

use crate::error::HarnessResult;
use crate::runtime::supervisor::WorkUnit;

/// Pause between two injected messages.
pub const INJECTION_INTERVAL: Duration = Duration::from_secs(3);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Asks a log-emitter app to print `message` once per iteration.
#[derive(Debug, Clone)]
pub struct LogInjector {
    client: Client,
    url: String,
}

impl LogInjector {
    /// Injector targeting `http://<app>.<domain>/log/<message>`.
    pub fn new(config: &TestConfig, app_name: &str, message: &str) -> HarnessResult<Self> {
        let base_url = format!("http://{}", config.app_host(app_name));
        Self::with_base_url(&base_url, message, config.skip_cert_verify)
    }

    pub fn with_base_url(base_url: &str, message: &str, skip_cert_verify: bool) -> HarnessResult<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(skip_cert_verify)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/log/{}", base_url.trim_end_matches('/'), message),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send a single injection request.
    pub async fn inject(&self) -> HarnessResult<StatusCode> {
        let response = self.client.get(&self.url).send().await?;
        Ok(response.status())
    }
}

#[async_trait]
impl WorkUnit for LogInjector {
    async fn run_once(&self, _iteration: u64) -> Result<(), String> {
        match self.inject().await {
            Ok(StatusCode::OK) => Ok(()),
            Ok(status) => Err(format!("GET {} returned {}", self.url, status)),
            Err(e) => Err(format!("GET {} failed: {}", self.url, e)),
        }
    }
}

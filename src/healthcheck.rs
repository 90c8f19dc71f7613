//! Liveness ping sent after every run

use crate::config::HealthcheckConfig;
use reqwest::Client;
use std::time::Duration;

/// Outcome reported to the liveness endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingStatus {
    Success,
    Fail,
}

impl PingStatus {
    fn as_str(&self) -> &'static str {
        match self {
            PingStatus::Success => "success",
            PingStatus::Fail => "fail",
        }
    }
}

/// Posts run outcomes to a healthchecks-style ping URL
#[derive(Debug, Clone)]
pub struct Healthcheck {
    ping_url: Option<String>,
    client: Client,
}

impl Healthcheck {
    pub fn new(config: &HealthcheckConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build healthcheck client, using defaults: {}", e);
                Client::new()
            });

        Self {
            ping_url: config.ping_url.clone(),
            client,
        }
    }

    /// URL pinged for `status`, `/fail` appended on failure
    pub fn url_for(&self, status: PingStatus) -> Option<String> {
        let base = self.ping_url.as_deref()?.trim_end_matches('/');
        Some(match status {
            PingStatus::Success => base.to_string(),
            PingStatus::Fail => format!("{}/fail", base),
        })
    }

    /// Sends the ping; failures are logged and never returned
    pub async fn ping(&self, status: PingStatus) {
        let Some(url) = self.url_for(status) else {
            tracing::info!("No healthcheck ping URL configured, skipping ping");
            return;
        };

        match self.client.post(&url).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!("Healthcheck pinged {}", status.as_str());
            }
            Ok(response) => {
                tracing::warn!(
                    "Healthcheck ping {} returned HTTP {}",
                    status.as_str(),
                    response.status()
                );
            }
            Err(e) => {
                tracing::error!("Failed to ping healthcheck: {}", e);
            }
        }
    }
}

//! Configuration for the provisioner.
//!
//! Library callers build an [`ArmClient`](crate::ArmClient) with
//! [`ProvisionerConfig::from_env`] and
//! [`ArmClient::from_config`](crate::ArmClient::from_config). The `provision`
//! binary reads the same variables through its flags and fills in a
//! [`ProvisionerConfig::new`] instead.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::arm::{PollPolicy, DEFAULT_ENDPOINT};

pub use crate::arm::{
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_POLL_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT_SECS,
};

/// Provisioner configuration.
#[derive(Clone)]
pub struct ProvisionerConfig {
    /// ARM endpoint.
    pub endpoint: String,
    /// Subscription ID.
    pub subscription_id: String,
    /// Bearer token for ARM. Not refreshed.
    pub access_token: String,
    /// Interval between polls.
    pub poll_interval: Duration,
    /// Overall limit for one long-running operation.
    pub poll_timeout: Option<Duration>,
    /// Retries for a transient poll failure.
    pub poll_max_retries: u32,
    /// HTTP request timeout.
    pub request_timeout: Duration,
}

impl fmt::Debug for ProvisionerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionerConfig")
            .field("endpoint", &self.endpoint)
            .field("subscription_id", &self.subscription_id)
            .field("access_token", &"[REDACTED]")
            .field("poll_interval", &self.poll_interval)
            .field("poll_timeout", &self.poll_timeout)
            .field("poll_max_retries", &self.poll_max_retries)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ProvisionerConfig {
    /// Configuration with defaults for everything but credentials.
    pub fn new(subscription_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            subscription_id: subscription_id.into(),
            access_token: access_token.into(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            poll_timeout: None,
            poll_max_retries: DEFAULT_POLL_MAX_RETRIES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Required Environment Variables
    /// - `AZURE_SUBSCRIPTION_ID`: target subscription
    /// - `AZURE_ACCESS_TOKEN`: ARM bearer token
    ///
    /// # Optional Environment Variables
    /// - `ARM_ENDPOINT`: ARM base URL (default: `https://management.azure.com`)
    /// - `ARM_POLL_INTERVAL_SECS`: poll interval (default: 15)
    /// - `ARM_POLL_TIMEOUT_SECS`: per-operation limit (default: none)
    /// - `ARM_POLL_MAX_RETRIES`: transient poll retries (default: 5)
    /// - `ARM_REQUEST_TIMEOUT_SECS`: HTTP timeout (default: 30)
    ///
    /// # Errors
    /// Returns error if a required variable is missing or `ARM_ENDPOINT` is
    /// not a valid URL.
    pub fn from_env() -> Result<Self> {
        let subscription_id = std::env::var("AZURE_SUBSCRIPTION_ID")
            .context("AZURE_SUBSCRIPTION_ID environment variable not set")?;

        let access_token = std::env::var("AZURE_ACCESS_TOKEN")
            .context("AZURE_ACCESS_TOKEN environment variable not set")?;

        let mut config = Self::new(subscription_id, access_token);

        if let Ok(endpoint) = std::env::var("ARM_ENDPOINT") {
            config = config.with_endpoint(&endpoint)?;
        }

        config.poll_interval = Duration::from_secs(
            env_number("ARM_POLL_INTERVAL_SECS").unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        );
        config.poll_timeout = env_number("ARM_POLL_TIMEOUT_SECS").map(Duration::from_secs);
        config.poll_max_retries = std::env::var("ARM_POLL_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_POLL_MAX_RETRIES);
        config.request_timeout = Duration::from_secs(
            env_number("ARM_REQUEST_TIMEOUT_SECS").unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );

        Ok(config)
    }

    /// Set the ARM endpoint after checking it parses as a URL.
    ///
    /// # Errors
    /// Returns error if `endpoint` is not an absolute URL.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self> {
        let url = url::Url::parse(endpoint)
            .with_context(|| format!("invalid ARM endpoint: {endpoint}"))?;
        self.endpoint = url.as_str().trim_end_matches('/').to_string();
        Ok(self)
    }

    /// Polling policy derived from this configuration.
    #[must_use]
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.poll_interval,
            timeout: self.poll_timeout,
            max_retries: self.poll_max_retries,
            ..PollPolicy::default()
        }
    }
}

fn env_number(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

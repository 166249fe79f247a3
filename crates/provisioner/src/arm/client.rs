//! Azure Resource Manager REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::models::{
    CreateVmRequest, ErrorResponse, NetworkInterface, OperationStatus, PublicIpAddress,
    ResourceState, Subnet, VirtualMachine,
};
use super::{retry_transient, ArmApi, ArmError, PollPolicy, Poller};
use crate::config::ProvisionerConfig;

/// Public Azure cloud ARM endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

/// Default timeout for API requests, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Azure API version for Network.
pub const NETWORK_API_VERSION: &str = "2023-09-01";

/// Azure API version for Compute.
pub const COMPUTE_API_VERSION: &str = "2023-09-01";

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";
const CORRELATION_HEADER: &str = "x-ms-correlation-request-id";

/// How a submitted operation reports progress.
#[derive(Debug, Clone)]
enum Monitor {
    /// Poll the `Azure-AsyncOperation` status URL.
    AsyncOperation(String),
    /// Poll the `Location` URL until it stops answering 202.
    Location(String),
    /// Poll the resource itself for a terminal provisioning state.
    Resource,
}

/// Raw response of a successful request.
struct Fetched {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

/// ARM client for one subscription.
///
/// Each client carries its own correlation ID, sent with every request so
/// that all calls made for one provisioning run can be traced together.
#[derive(Clone)]
pub struct ArmClient {
    /// HTTP client.
    client: Client,
    /// ARM endpoint without trailing slash.
    endpoint: String,
    /// Subscription ID.
    subscription_id: String,
    /// Bearer token.
    access_token: String,
    /// Correlation request ID.
    correlation_id: String,
    /// Long-running operation polling.
    poll: PollPolicy,
}

impl ArmClient {
    /// Create a client against the public Azure endpoint.
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(
        subscription_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, ArmError> {
        Self::build(
            subscription_id.into(),
            access_token.into(),
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Create a client from configuration.
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn from_config(config: &ProvisionerConfig) -> Result<Self, ArmError> {
        let client = Self::build(
            config.subscription_id.clone(),
            config.access_token.clone(),
            config.request_timeout,
        )?;
        Ok(client
            .with_endpoint(&config.endpoint)
            .with_poll_policy(config.poll_policy()))
    }

    fn build(
        subscription_id: String,
        access_token: String,
        timeout: Duration,
    ) -> Result<Self, ArmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ArmError::Http)?;

        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            subscription_id,
            access_token,
            correlation_id: Uuid::new_v4().to_string(),
            poll: PollPolicy::default(),
        })
    }

    /// Use a different ARM endpoint (sovereign clouds, tests).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    /// Override the long-running operation polling policy.
    #[must_use]
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Correlation ID sent with every request.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// URL of a resource in this subscription.
    fn resource_url(&self, resource_group: &str, provider_path: &str, api_version: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/{}?api-version={}",
            self.endpoint, self.subscription_id, resource_group, provider_path, api_version
        )
    }

    /// Add auth and correlation headers.
    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header(CORRELATION_HEADER, &self.correlation_id)
    }

    /// Make an authenticated GET request and return the raw response.
    async fn fetch(&self, url: &str) -> Result<Fetched, ArmError> {
        debug!(url = %url, "GET request");

        let response = self.authorized(self.client.get(url)).send().await?;
        Self::read(response).await
    }

    /// Make an authenticated GET request.
    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ArmError> {
        let fetched = self.fetch(url).await?;
        parse_body(&fetched.body)
    }

    /// Submit a create-or-update and return a poller for its completion.
    async fn begin_put<T, B>(
        &self,
        url: String,
        operation: String,
        body: &B,
    ) -> Result<Poller<T>, ArmError>
    where
        T: DeserializeOwned + Send + 'static,
        B: Serialize + Sync,
    {
        debug!(url = %url, operation = %operation, "PUT request");

        let response = self
            .authorized(self.client.put(&url))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;
        let fetched = Self::read(response).await?;

        let monitor = if let Some(status_url) = header(&fetched.headers, ASYNC_OPERATION_HEADER) {
            Monitor::AsyncOperation(status_url)
        } else if fetched.status == StatusCode::ACCEPTED {
            header(&fetched.headers, LOCATION.as_str()).map_or(Monitor::Resource, Monitor::Location)
        } else {
            Monitor::Resource
        };

        if matches!(monitor, Monitor::Resource) && fetched.status != StatusCode::ACCEPTED {
            match provisioning_state(&fetched.body).as_deref().map(Terminal::of) {
                Some(Some(Terminal::Succeeded)) | None => {
                    return Ok(Poller::done(operation, parse_body(&fetched.body)));
                }
                Some(Some(Terminal::Failed(state))) => {
                    let err = ArmError::OperationFailed {
                        operation: operation.clone(),
                        status: state,
                        code: None,
                        message: "provisioning did not succeed".into(),
                    };
                    return Ok(Poller::done(operation, Err(err)));
                }
                Some(None) => {}
            }
        }

        debug!(operation = %operation, ?monitor, "Operation accepted, polling for completion");

        let retry_after = retry_after(&fetched.headers);
        let client = self.clone();
        let label = operation.clone();
        Ok(Poller::new(operation, self.poll.timeout, async move {
            client
                .poll_to_completion(url, label, monitor, retry_after)
                .await
        }))
    }

    /// Poll a submitted operation until it is terminal, then return the
    /// resource.
    async fn poll_to_completion<T: DeserializeOwned>(
        self,
        resource_url: String,
        operation: String,
        monitor: Monitor,
        mut delay: Option<Duration>,
    ) -> Result<T, ArmError> {
        let this = &self;
        loop {
            tokio::time::sleep(delay.unwrap_or(self.poll.interval)).await;

            let target = match &monitor {
                Monitor::AsyncOperation(url) | Monitor::Location(url) => url.as_str(),
                Monitor::Resource => resource_url.as_str(),
            };
            let fetched = retry_transient(&self.poll, &operation, move || this.fetch(target)).await?;
            delay = retry_after(&fetched.headers);

            match &monitor {
                Monitor::AsyncOperation(_) => {
                    let status: OperationStatus = parse_body(&fetched.body)?;
                    match Terminal::of(&status.status) {
                        Some(Terminal::Succeeded) => break,
                        Some(Terminal::Failed(state)) => {
                            let detail = status.error.unwrap_or_default();
                            return Err(ArmError::OperationFailed {
                                operation,
                                status: state,
                                code: detail.code,
                                message: detail.message.unwrap_or_default(),
                            });
                        }
                        None => debug!(operation = %operation, status = %status.status, "Operation in progress"),
                    }
                }
                Monitor::Location(_) => {
                    if fetched.status != StatusCode::ACCEPTED {
                        break;
                    }
                    debug!(operation = %operation, "Operation in progress");
                }
                Monitor::Resource => match provisioning_state(&fetched.body).as_deref().map(Terminal::of) {
                    Some(Some(Terminal::Succeeded)) | None => return parse_body(&fetched.body),
                    Some(Some(Terminal::Failed(state))) => {
                        return Err(ArmError::OperationFailed {
                            operation,
                            status: state,
                            code: None,
                            message: "provisioning did not succeed".into(),
                        });
                    }
                    Some(None) => debug!(operation = %operation, "Resource still provisioning"),
                },
            }
        }

        let url = resource_url.as_str();
        let fetched = retry_transient(&self.poll, &operation, move || this.fetch(url)).await?;
        parse_body(&fetched.body)
    }

    /// Turn a response into [`Fetched`] or a classified error.
    async fn read(response: reqwest::Response) -> Result<Fetched, ArmError> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        if status.is_success() {
            Ok(Fetched {
                status,
                headers,
                body,
            })
        } else {
            Err(api_error(status, body))
        }
    }
}

/// Terminal provisioning/operation states.
enum Terminal {
    Succeeded,
    Failed(String),
}

impl Terminal {
    fn of(state: &str) -> Option<Self> {
        if state.eq_ignore_ascii_case("Succeeded") {
            Some(Self::Succeeded)
        } else if state.eq_ignore_ascii_case("Failed") || state.eq_ignore_ascii_case("Canceled") {
            Some(Self::Failed(state.to_string()))
        } else {
            None
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ArmError> {
    serde_json::from_str(body).map_err(|e| {
        warn!(error = %e, body = %body, "Failed to parse response");
        ArmError::Serialization(e)
    })
}

fn provisioning_state(body: &str) -> Option<String> {
    serde_json::from_str::<ResourceState>(body)
        .ok()
        .and_then(|r| r.properties)
        .and_then(|p| p.provisioning_state)
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header(headers, RETRY_AFTER.as_str())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Map an error status and body to [`ArmError`].
fn api_error(status: StatusCode, body: String) -> ArmError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return ArmError::Auth(body);
    }
    let detail = serde_json::from_str::<ErrorResponse>(&body)
        .map(|r| r.error)
        .unwrap_or_default();
    ArmError::Api {
        status: status.as_u16(),
        code: detail.code,
        message: detail.message.unwrap_or(body),
    }
}

#[async_trait]
impl ArmApi for ArmClient {
    async fn get_subnet(
        &self,
        resource_group: &str,
        virtual_network: &str,
        subnet: &str,
    ) -> Result<Subnet, ArmError> {
        let url = self.resource_url(
            resource_group,
            &format!("Microsoft.Network/virtualNetworks/{virtual_network}/subnets/{subnet}"),
            NETWORK_API_VERSION,
        );
        self.get(&url).await
    }

    async fn get_public_ip(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<PublicIpAddress, ArmError> {
        let url = self.resource_url(
            resource_group,
            &format!("Microsoft.Network/publicIPAddresses/{name}"),
            NETWORK_API_VERSION,
        );
        self.get(&url).await
    }

    async fn begin_create_public_ip(
        &self,
        resource_group: &str,
        name: &str,
        body: &PublicIpAddress,
    ) -> Result<Poller<PublicIpAddress>, ArmError> {
        let url = self.resource_url(
            resource_group,
            &format!("Microsoft.Network/publicIPAddresses/{name}"),
            NETWORK_API_VERSION,
        );
        self.begin_put(url, format!("create public IP {name}"), body)
            .await
    }

    async fn get_network_interface(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<NetworkInterface, ArmError> {
        let url = self.resource_url(
            resource_group,
            &format!("Microsoft.Network/networkInterfaces/{name}"),
            NETWORK_API_VERSION,
        );
        self.get(&url).await
    }

    async fn begin_create_network_interface(
        &self,
        resource_group: &str,
        name: &str,
        body: &NetworkInterface,
    ) -> Result<Poller<NetworkInterface>, ArmError> {
        let url = self.resource_url(
            resource_group,
            &format!("Microsoft.Network/networkInterfaces/{name}"),
            NETWORK_API_VERSION,
        );
        self.begin_put(url, format!("create network interface {name}"), body)
            .await
    }

    async fn begin_create_virtual_machine(
        &self,
        resource_group: &str,
        name: &str,
        body: &CreateVmRequest,
    ) -> Result<Poller<VirtualMachine>, ArmError> {
        let url = self.resource_url(
            resource_group,
            &format!("Microsoft.Compute/virtualMachines/{name}"),
            COMPUTE_API_VERSION,
        );
        self.begin_put(url, format!("create virtual machine {name}"), body)
            .await
    }
}

//! Azure Resource Manager API surface used by the provisioner.

mod client;
mod error;
pub mod models;
mod poller;

use async_trait::async_trait;

pub use client::{
    ArmClient, COMPUTE_API_VERSION, DEFAULT_ENDPOINT, DEFAULT_REQUEST_TIMEOUT_SECS,
    NETWORK_API_VERSION,
};
pub use error::ArmError;
pub use poller::{
    retry_transient, PollPolicy, Poller, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_POLL_MAX_RETRIES,
};

use models::{CreateVmRequest, NetworkInterface, PublicIpAddress, Subnet, VirtualMachine};

/// Resource operations the provisioner needs.
///
/// `get_*` calls are plain request/response. `begin_*` calls submit a
/// create-or-update and return a [`Poller`] for the long-running operation;
/// an error from `begin_*` means the request was never accepted.
#[async_trait]
pub trait ArmApi: Send + Sync {
    /// Get a subnet of a virtual network.
    async fn get_subnet(
        &self,
        resource_group: &str,
        virtual_network: &str,
        subnet: &str,
    ) -> Result<Subnet, ArmError>;

    /// Get a public IP address.
    async fn get_public_ip(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<PublicIpAddress, ArmError>;

    /// Submit creation of a public IP address.
    async fn begin_create_public_ip(
        &self,
        resource_group: &str,
        name: &str,
        body: &PublicIpAddress,
    ) -> Result<Poller<PublicIpAddress>, ArmError>;

    /// Get a network interface.
    async fn get_network_interface(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<NetworkInterface, ArmError>;

    /// Submit creation of a network interface.
    async fn begin_create_network_interface(
        &self,
        resource_group: &str,
        name: &str,
        body: &NetworkInterface,
    ) -> Result<Poller<NetworkInterface>, ArmError>;

    /// Submit creation of a virtual machine.
    async fn begin_create_virtual_machine(
        &self,
        resource_group: &str,
        name: &str,
        body: &CreateVmRequest,
    ) -> Result<Poller<VirtualMachine>, ArmError>;
}

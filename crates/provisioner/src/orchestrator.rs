//! VM create-and-wait orchestration.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::address::resolve_addresses;
use crate::arm::models::{
    CreateStorageProfile, CreateVmProperties, CreateVmRequest, HardwareProfile, ImageReference,
    ManagedDisk, NetworkInterfaceReference, NetworkInterfaceReferenceProperties, NetworkProfile,
    OsDisk, OsProfile, VirtualMachine,
};
use crate::arm::ArmApi;
use crate::error::ProvisionError;
use crate::network::resolve_network_interface;
use crate::request::{CreationRequest, OsDiskType};

/// Provisioning state reported when the provider omits it.
pub const UNKNOWN_PROVISIONING_STATE: &str = "Unknown";

/// Outcome of a successful VM creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationResult {
    /// VM resource ID.
    pub id: String,
    /// VM name.
    pub name: String,
    /// Provisioning state.
    pub provisioning_state: String,
    /// Location.
    pub location: String,
    /// VM size.
    pub size: String,
    /// Public IP, empty if unknown.
    #[serde(rename = "publicIP")]
    pub public_ip: String,
    /// Private IP, empty if unknown.
    #[serde(rename = "privateIP")]
    pub private_ip: String,
    /// Admin username.
    pub admin_username: String,
}

/// Orchestration phase, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Submitting,
    Polling,
    Succeeded,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitting => write!(f, "submitting"),
            Self::Polling => write!(f, "polling"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Creates virtual machines through an [`ArmApi`].
///
/// Holds no state between calls; each [`create_vm`](Self::create_vm) runs
/// its remote calls strictly in sequence.
#[derive(Clone)]
pub struct Provisioner {
    api: Arc<dyn ArmApi>,
}

impl Provisioner {
    /// Create a provisioner.
    pub fn new(api: Arc<dyn ArmApi>) -> Self {
        Self { api }
    }

    /// Create a VM and wait for the provider to finish.
    ///
    /// Address lookup after creation is best effort: failures are logged and
    /// the result carries empty addresses.
    ///
    /// # Errors
    /// Returns a validation error before any remote call, a dependency error
    /// from network resolution, [`ProvisionError::SubmissionFailed`] if the
    /// create is rejected, [`ProvisionError::ProvisioningFailed`] if it fails
    /// or is cancelled while polling, or
    /// [`ProvisionError::InvalidProviderResponse`] if the created VM lacks
    /// an ID or name.
    pub async fn create_vm(
        &self,
        request: &CreationRequest,
        cancel: &CancellationToken,
    ) -> Result<CreationResult, ProvisionError> {
        let span = info_span!("create_vm", vm = %request.name, resource_group = %request.resource_group);
        self.run(request, cancel).instrument(span).await
    }

    async fn run(
        &self,
        request: &CreationRequest,
        cancel: &CancellationToken,
    ) -> Result<CreationResult, ProvisionError> {
        request.validate()?;
        let disk_type = request.os_disk_type()?;

        let nic_id = resolve_network_interface(self.api.as_ref(), request, cancel).await?;
        let body = build_vm_request(request, &nic_id, disk_type);

        info!(phase = %Phase::Submitting, size = %request.size, location = %request.location, "Creating virtual machine");
        let poller = self
            .api
            .begin_create_virtual_machine(&request.resource_group, &request.name, &body)
            .await
            .map_err(|source| {
                warn!(phase = %Phase::Failed, error = %source, "Virtual machine submission rejected");
                ProvisionError::SubmissionFailed {
                    name: request.name.clone(),
                    source,
                }
            })?;

        info!(phase = %Phase::Polling, operation = %poller.operation(), "Waiting for virtual machine");
        let vm = poller.wait(cancel).await.map_err(|source| {
            warn!(phase = %Phase::Failed, error = %source, "Virtual machine provisioning failed");
            ProvisionError::ProvisioningFailed {
                name: request.name.clone(),
                source,
            }
        })?;

        let mut result = creation_result(&vm, &request.admin_username)?;

        match resolve_addresses(self.api.as_ref(), &vm).await {
            Ok(addresses) => {
                result.private_ip = addresses.private_ip.unwrap_or_default();
                result.public_ip = addresses.public_ip.unwrap_or_default();
            }
            Err(e) => {
                warn!(error = %e, "Failed to resolve VM addresses, returning without them");
            }
        }

        info!(
            phase = %Phase::Succeeded,
            id = %result.id,
            provisioning_state = %result.provisioning_state,
            private_ip = %result.private_ip,
            public_ip = %result.public_ip,
            "Virtual machine created"
        );
        Ok(result)
    }
}

/// Assemble the ARM create payload.
fn build_vm_request(request: &CreationRequest, nic_id: &str, disk_type: OsDiskType) -> CreateVmRequest {
    let custom_data = request
        .custom_data
        .as_ref()
        .map(|data| base64::engine::general_purpose::STANDARD.encode(data));

    CreateVmRequest {
        location: request.location.clone(),
        tags: request.tags.clone(),
        properties: CreateVmProperties {
            hardware_profile: HardwareProfile {
                vm_size: Some(request.size.clone()),
            },
            storage_profile: CreateStorageProfile {
                image_reference: ImageReference {
                    publisher: request.image.publisher.clone(),
                    offer: request.image.offer.clone(),
                    sku: request.image.sku.clone(),
                    version: request.image.version.clone(),
                },
                os_disk: OsDisk {
                    create_option: "FromImage".to_string(),
                    managed_disk: ManagedDisk {
                        storage_account_type: disk_type.as_str().to_string(),
                    },
                },
            },
            os_profile: OsProfile {
                computer_name: request.name.clone(),
                admin_username: request.admin_username.clone(),
                admin_password: request.admin_password.clone(),
                custom_data,
            },
            network_profile: NetworkProfile {
                network_interfaces: vec![NetworkInterfaceReference {
                    id: Some(nic_id.to_string()),
                    properties: Some(NetworkInterfaceReferenceProperties {
                        primary: Some(true),
                    }),
                }],
            },
        },
    }
}

/// Extract the result fields from a created VM.
fn creation_result(vm: &VirtualMachine, admin_username: &str) -> Result<CreationResult, ProvisionError> {
    let id = vm
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProvisionError::InvalidProviderResponse("created VM has no resource ID".into()))?;
    let name = vm
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ProvisionError::InvalidProviderResponse(format!("created VM {id} has no name")))?;

    let properties = vm.properties.as_ref();
    let provisioning_state = properties
        .and_then(|p| p.provisioning_state.clone())
        .unwrap_or_else(|| UNKNOWN_PROVISIONING_STATE.to_string());
    let size = properties
        .and_then(|p| p.hardware_profile.as_ref())
        .and_then(|h| h.vm_size.clone())
        .unwrap_or_default();

    debug!(id = %id, provisioning_state = %provisioning_state, "Virtual machine provisioned");

    Ok(CreationResult {
        id,
        name,
        provisioning_state,
        location: vm.location.clone().unwrap_or_default(),
        size,
        public_ip: String::new(),
        private_ip: String::new(),
        admin_username: admin_username.to_string(),
    })
}

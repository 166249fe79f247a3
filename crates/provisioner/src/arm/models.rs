//! Azure Resource Manager request and response models.
//!
//! Network and public IP types are used in both directions (create payload
//! and GET response), so every field is optional and skipped when unset.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Common types
// ============================================================================

/// Reference to another resource by ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubResource {
    /// Resource ID.
    pub id: String,
}

impl SubResource {
    /// Reference `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// ARM error envelope (`{"error": {...}}`).
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error details.
    pub error: ErrorDetail,
}

/// ARM error details.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorDetail {
    /// Error code (e.g. `ResourceNotFound`).
    #[serde(default)]
    pub code: Option<String>,
    /// Human readable message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of an `Azure-AsyncOperation` status resource.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationStatus {
    /// `InProgress`, `Succeeded`, `Failed` or `Canceled`.
    pub status: String,
    /// Error details when failed.
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

/// Minimal view of any resource, used to read its provisioning state while
/// polling.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceState {
    /// Properties.
    #[serde(default)]
    pub properties: Option<ResourceStateProperties>,
}

/// Provisioning state holder.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStateProperties {
    /// Provisioning state.
    #[serde(default)]
    pub provisioning_state: Option<String>,
}

/// Resource SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sku {
    /// SKU name (e.g. `Standard`).
    pub name: String,
}

// ============================================================================
// Network types
// ============================================================================

/// Subnet within a virtual network.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    /// Resource ID.
    #[serde(default)]
    pub id: Option<String>,
    /// Name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Network interface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    /// Resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Tags.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    /// Properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<NetworkInterfaceProperties>,
}

/// Network interface properties.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceProperties {
    /// IP configurations.
    #[serde(default)]
    pub ip_configurations: Vec<IpConfiguration>,
    /// Provisioning state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

/// IP configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpConfiguration {
    /// Name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IpConfigurationProperties>,
}

/// IP configuration properties.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpConfigurationProperties {
    /// Private IP address.
    #[serde(
        rename = "privateIPAddress",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub private_ip_address: Option<String>,
    /// `Dynamic` or `Static`.
    #[serde(
        rename = "privateIPAllocationMethod",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub private_ip_allocation_method: Option<String>,
    /// Subnet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<SubResource>,
    /// Public IP address.
    #[serde(
        rename = "publicIPAddress",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub public_ip_address: Option<SubResource>,
    /// Primary configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
}

/// Public IP address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIpAddress {
    /// Resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Tags.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    /// SKU.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    /// Properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<PublicIpAddressProperties>,
}

/// Public IP address properties.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicIpAddressProperties {
    /// `Static` or `Dynamic`.
    #[serde(
        rename = "publicIPAllocationMethod",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub allocation_method: Option<String>,
    /// `IPv4` or `IPv6`.
    #[serde(
        rename = "publicIPAddressVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub address_version: Option<String>,
    /// Assigned address.
    #[serde(rename = "ipAddress", default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Provisioning state.
    #[serde(
        rename = "provisioningState",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub provisioning_state: Option<String>,
}

// ============================================================================
// Virtual machine types
// ============================================================================

/// Virtual machine as returned by ARM.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachine {
    /// Resource ID.
    #[serde(default)]
    pub id: Option<String>,
    /// VM name.
    #[serde(default)]
    pub name: Option<String>,
    /// Location.
    #[serde(default)]
    pub location: Option<String>,
    /// VM properties.
    #[serde(default)]
    pub properties: Option<VirtualMachineProperties>,
}

/// Virtual machine properties.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineProperties {
    /// Provisioning state.
    #[serde(default)]
    pub provisioning_state: Option<String>,
    /// Hardware profile.
    #[serde(default)]
    pub hardware_profile: Option<HardwareProfile>,
    /// Network profile.
    #[serde(default)]
    pub network_profile: Option<NetworkProfile>,
}

/// Hardware profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    /// VM size.
    #[serde(default)]
    pub vm_size: Option<String>,
}

/// Image reference.
#[derive(Debug, Clone, Serialize)]
pub struct ImageReference {
    /// Publisher.
    pub publisher: String,
    /// Offer.
    pub offer: String,
    /// SKU.
    pub sku: String,
    /// Version.
    pub version: String,
}

/// OS disk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    /// Create option (`FromImage`).
    pub create_option: String,
    /// Managed disk.
    pub managed_disk: ManagedDisk,
}

/// Managed disk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedDisk {
    /// Storage account type.
    pub storage_account_type: String,
}

/// OS profile.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OsProfile {
    /// Computer name.
    pub computer_name: String,
    /// Admin username.
    pub admin_username: String,
    /// Admin password.
    pub admin_password: String,
    /// Custom data (cloud-init, base64 encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<String>,
}

impl std::fmt::Debug for OsProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsProfile")
            .field("computer_name", &self.computer_name)
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"[REDACTED]")
            .field("custom_data", &self.custom_data.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Network profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    /// Network interfaces.
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterfaceReference>,
}

impl NetworkProfile {
    /// The primary interface, or the first one if none is flagged.
    #[must_use]
    pub fn primary_interface(&self) -> Option<&NetworkInterfaceReference> {
        self.network_interfaces
            .iter()
            .find(|nic| {
                nic.properties
                    .as_ref()
                    .and_then(|p| p.primary)
                    .unwrap_or(false)
            })
            .or_else(|| self.network_interfaces.first())
    }
}

/// Network interface reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInterfaceReference {
    /// Network interface ID.
    #[serde(default)]
    pub id: Option<String>,
    /// Properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<NetworkInterfaceReferenceProperties>,
}

/// Network interface reference properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceReferenceProperties {
    /// Primary.
    #[serde(default)]
    pub primary: Option<bool>,
}

/// Create VM request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVmRequest {
    /// Location.
    pub location: String,
    /// Tags.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    /// Properties.
    pub properties: CreateVmProperties,
}

/// Create VM properties.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVmProperties {
    /// Hardware profile.
    pub hardware_profile: HardwareProfile,
    /// Storage profile.
    pub storage_profile: CreateStorageProfile,
    /// OS profile.
    pub os_profile: OsProfile,
    /// Network profile.
    pub network_profile: NetworkProfile,
}

/// Create storage profile.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStorageProfile {
    /// Image reference.
    pub image_reference: ImageReference,
    /// OS disk.
    pub os_disk: OsDisk,
}

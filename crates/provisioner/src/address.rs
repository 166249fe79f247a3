//! Address lookup for a created VM.

use tracing::debug;

use crate::arm::models::VirtualMachine;
use crate::arm::ArmApi;
use crate::error::ProvisionError;
use crate::resource_id::ResourceId;

/// Addresses of a VM's primary network interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Addresses {
    /// Private IP of the first IP configuration.
    pub private_ip: Option<String>,
    /// Public IP attached to that configuration.
    pub public_ip: Option<String>,
}

/// Look up the private and public address of `vm`'s primary NIC.
///
/// A VM without a network profile or NIC reference yields empty addresses.
///
/// # Errors
/// Returns an error if a NIC or public IP ID cannot be parsed or fetched.
pub async fn resolve_addresses(
    api: &dyn ArmApi,
    vm: &VirtualMachine,
) -> Result<Addresses, ProvisionError> {
    let Some(nic_ref) = vm
        .properties
        .as_ref()
        .and_then(|p| p.network_profile.as_ref())
        .and_then(|n| n.primary_interface())
        .and_then(|nic| nic.id.as_deref())
    else {
        debug!("VM has no primary network interface, skipping address lookup");
        return Ok(Addresses::default());
    };

    let nic_id = ResourceId::parse(nic_ref, Some("networkInterfaces"))?;
    let nic = api
        .get_network_interface(nic_id.resource_group(), &nic_id.name)
        .await
        .map_err(|source| ProvisionError::AddressLookupFailed {
            resource: format!("network interface {}", nic_id.name),
            source,
        })?;

    let Some(config) = nic
        .properties
        .and_then(|p| p.ip_configurations.into_iter().next())
        .and_then(|c| c.properties)
    else {
        return Ok(Addresses::default());
    };

    let mut addresses = Addresses {
        private_ip: config.private_ip_address,
        public_ip: None,
    };

    if let Some(pip_ref) = config.public_ip_address {
        let pip_id = ResourceId::parse(&pip_ref.id, Some("publicIPAddresses"))?;
        let pip = api
            .get_public_ip(pip_id.resource_group(), &pip_id.name)
            .await
            .map_err(|source| ProvisionError::AddressLookupFailed {
                resource: format!("public IP {}", pip_id.name),
                source,
            })?;
        addresses.public_ip = pip.properties.and_then(|p| p.ip_address);
    }

    debug!(
        private_ip = addresses.private_ip.as_deref().unwrap_or(""),
        public_ip = addresses.public_ip.as_deref().unwrap_or(""),
        "Resolved VM addresses"
    );
    Ok(addresses)
}

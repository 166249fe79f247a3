//! Network interface resolution for a new VM.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::arm::models::{
    IpConfiguration, IpConfigurationProperties, NetworkInterface, NetworkInterfaceProperties,
    SubResource,
};
use crate::arm::ArmApi;
use crate::error::ProvisionError;
use crate::public_ip::ensure_public_ip;
use crate::request::{CreationRequest, NetworkPlacement};

/// Name of the NIC created for VM `vm_name`.
#[must_use]
pub fn network_interface_name(vm_name: &str) -> String {
    format!("{vm_name}-nic")
}

/// Return the ID of the network interface the VM should use.
///
/// An explicit NIC ID is returned unchanged without any remote call.
/// Otherwise a new NIC named `<vm>-nic` is created in the requested subnet
/// on every call; an existing NIC with that name is not looked up.
///
/// # Errors
/// Returns a placement validation error, a subnet resolution error, any
/// error from [`ensure_public_ip`], or
/// [`ProvisionError::NetworkInterfaceCreateFailed`] /
/// [`ProvisionError::NetworkInterfaceMissingId`].
pub async fn resolve_network_interface(
    api: &dyn ArmApi,
    request: &CreationRequest,
    cancel: &CancellationToken,
) -> Result<String, ProvisionError> {
    let (virtual_network, subnet, public_ip) = match request.placement()? {
        NetworkPlacement::ExistingInterface(id) => {
            if request
                .public_ip_name
                .as_deref()
                .is_some_and(|p| !p.trim().is_empty())
            {
                warn!(
                    vm = %request.name,
                    "Ignoring public IP name because an existing network interface was given"
                );
            }
            debug!(vm = %request.name, network_interface = %id, "Using existing network interface");
            return Ok(id);
        }
        NetworkPlacement::NewInterface {
            virtual_network,
            subnet,
            public_ip,
        } => (virtual_network, subnet, public_ip),
    };

    let rg = request.resource_group.as_str();

    let subnet_id = api
        .get_subnet(rg, &virtual_network, &subnet)
        .await
        .map_err(|source| ProvisionError::SubnetResolutionFailed {
            virtual_network: virtual_network.clone(),
            subnet: subnet.clone(),
            source,
        })?
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProvisionError::SubnetMissingId {
            virtual_network: virtual_network.clone(),
            subnet: subnet.clone(),
        })?;
    debug!(subnet = %subnet, id = %subnet_id, "Resolved subnet");

    let public_ip_id = match public_ip {
        Some(name) => Some(
            ensure_public_ip(api, rg, &request.location, &name, &request.tags, cancel).await?,
        ),
        None => None,
    };

    let nic_name = network_interface_name(&request.name);
    info!(
        network_interface = %nic_name,
        subnet = %subnet,
        public_ip = public_ip_id.as_deref().unwrap_or("none"),
        "Creating network interface"
    );

    let body = NetworkInterface {
        location: Some(request.location.clone()),
        tags: request.tags.clone(),
        properties: Some(NetworkInterfaceProperties {
            ip_configurations: vec![IpConfiguration {
                name: Some("ipconfig1".to_string()),
                properties: Some(IpConfigurationProperties {
                    private_ip_allocation_method: Some("Dynamic".to_string()),
                    subnet: Some(SubResource::new(subnet_id)),
                    public_ip_address: public_ip_id.map(SubResource::new),
                    primary: Some(true),
                    ..IpConfigurationProperties::default()
                }),
            }],
            provisioning_state: None,
        }),
        ..NetworkInterface::default()
    };

    let create_failed = |source| ProvisionError::NetworkInterfaceCreateFailed {
        name: nic_name.clone(),
        source,
    };
    let created = api
        .begin_create_network_interface(rg, &nic_name, &body)
        .await
        .map_err(create_failed)?
        .wait(cancel)
        .await
        .map_err(create_failed)?;

    let id = created
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProvisionError::NetworkInterfaceMissingId {
            name: nic_name.clone(),
        })?;
    info!(network_interface = %nic_name, id = %id, "Network interface created");
    Ok(id)
}

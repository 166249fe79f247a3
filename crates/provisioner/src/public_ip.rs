//! Ensure-or-create for public IP addresses.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::arm::models::{PublicIpAddress, PublicIpAddressProperties, Sku};
use crate::arm::ArmApi;
use crate::error::ProvisionError;

/// SKU for created public IPs.
const PUBLIC_IP_SKU: &str = "Standard";

/// Return the ID of public IP `name`, creating it if it does not exist.
///
/// Only a confirmed "not found" leads to creation; any other lookup error is
/// returned. Two concurrent callers can both see "not found" and both
/// submit a create for the same name. The provider then either rejects one
/// with a conflict or applies both as the same create-or-update.
///
/// # Errors
/// Returns [`ProvisionError::PublicIpLookupFailed`] or
/// [`ProvisionError::PublicIpCreateFailed`].
pub async fn ensure_public_ip(
    api: &dyn ArmApi,
    resource_group: &str,
    location: &str,
    name: &str,
    tags: &HashMap<String, String>,
    cancel: &CancellationToken,
) -> Result<String, ProvisionError> {
    match api.get_public_ip(resource_group, name).await {
        Ok(existing) => {
            let id = existing.id.filter(|id| !id.is_empty()).ok_or_else(|| {
                ProvisionError::InvalidProviderResponse(format!("public IP {name} has no resource ID"))
            })?;
            debug!(public_ip = %name, id = %id, "Using existing public IP");
            return Ok(id);
        }
        Err(e) if e.is_not_found() => {
            debug!(public_ip = %name, "Public IP not found, creating");
        }
        Err(source) => {
            return Err(ProvisionError::PublicIpLookupFailed {
                name: name.to_string(),
                source,
            });
        }
    }

    info!(public_ip = %name, resource_group = %resource_group, location = %location, "Creating public IP");

    let body = PublicIpAddress {
        location: Some(location.to_string()),
        tags: tags.clone(),
        sku: Some(Sku {
            name: PUBLIC_IP_SKU.to_string(),
        }),
        properties: Some(PublicIpAddressProperties {
            allocation_method: Some("Static".to_string()),
            address_version: Some("IPv4".to_string()),
            ..PublicIpAddressProperties::default()
        }),
        ..PublicIpAddress::default()
    };

    let create_failed = |source| ProvisionError::PublicIpCreateFailed {
        name: name.to_string(),
        source,
    };
    let created = api
        .begin_create_public_ip(resource_group, name, &body)
        .await
        .map_err(create_failed)?
        .wait(cancel)
        .await
        .map_err(create_failed)?;

    let id = created.id.filter(|id| !id.is_empty()).ok_or_else(|| {
        ProvisionError::InvalidProviderResponse(format!("created public IP {name} has no resource ID"))
    })?;
    info!(public_ip = %name, id = %id, "Public IP created");
    Ok(id)
}

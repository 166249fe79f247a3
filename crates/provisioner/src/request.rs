//! VM creation request and its validation.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProvisionError;

/// Marketplace image reference.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageReference {
    /// Publisher.
    #[serde(default)]
    pub publisher: String,
    /// Offer.
    #[serde(default)]
    pub offer: String,
    /// SKU.
    #[serde(default)]
    pub sku: String,
    /// Version.
    #[serde(default)]
    pub version: String,
}

impl From<(&str, &str, &str, &str)> for ImageReference {
    fn from((publisher, offer, sku, version): (&str, &str, &str, &str)) -> Self {
        Self {
            publisher: publisher.to_string(),
            offer: offer.to_string(),
            sku: sku.to_string(),
            version: version.to_string(),
        }
    }
}

impl FromStr for ImageReference {
    type Err = String;

    /// Accepts a well-known alias (`ubuntu-22.04`) or a
    /// `publisher:offer:sku:version` URN.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(image) = images::by_alias(s) {
            return Ok(image.into());
        }
        match s.split(':').collect::<Vec<_>>().as_slice() {
            [publisher, offer, sku, version] => Ok((*publisher, *offer, *sku, *version).into()),
            _ => Err(format!(
                "unknown image {s:?}: expected one of {} or publisher:offer:sku:version",
                images::ALIASES.join(", ")
            )),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.publisher, self.offer, self.sku, self.version
        )
    }
}

/// Common Azure VM images.
pub mod images {
    /// Ubuntu 20.04 LTS.
    pub const UBUNTU_20_04: (&str, &str, &str, &str) = (
        "Canonical",
        "0001-com-ubuntu-server-focal",
        "20_04-lts-gen2",
        "latest",
    );
    /// Ubuntu 22.04 LTS.
    pub const UBUNTU_22_04: (&str, &str, &str, &str) = (
        "Canonical",
        "0001-com-ubuntu-server-jammy",
        "22_04-lts-gen2",
        "latest",
    );
    /// Ubuntu 24.04 LTS.
    pub const UBUNTU_24_04: (&str, &str, &str, &str) =
        ("Canonical", "ubuntu-24_04-lts", "server", "latest");
    /// Debian 12.
    pub const DEBIAN_12: (&str, &str, &str, &str) = ("Debian", "debian-12", "12", "latest");
    /// Windows Server 2022 Datacenter.
    pub const WINDOWS_SERVER_2022: (&str, &str, &str, &str) = (
        "MicrosoftWindowsServer",
        "WindowsServer",
        "2022-datacenter-azure-edition",
        "latest",
    );

    /// Accepted aliases, in the order shown to users.
    pub const ALIASES: [&str; 5] = [
        "ubuntu-20.04",
        "ubuntu-22.04",
        "ubuntu-24.04",
        "debian-12",
        "windows-2022",
    ];

    /// Look up an image by alias (case-insensitive).
    #[must_use]
    pub fn by_alias(alias: &str) -> Option<(&'static str, &'static str, &'static str, &'static str)> {
        match alias.to_lowercase().as_str() {
            "ubuntu-20.04" => Some(UBUNTU_20_04),
            "ubuntu-22.04" => Some(UBUNTU_22_04),
            "ubuntu-24.04" => Some(UBUNTU_24_04),
            "debian-12" => Some(DEBIAN_12),
            "windows-2022" => Some(WINDOWS_SERVER_2022),
            _ => None,
        }
    }
}

/// Managed disk tier for the OS disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OsDiskType {
    /// Standard HDD.
    StandardHdd,
    /// Standard SSD.
    #[default]
    StandardSsd,
    /// Premium SSD.
    PremiumSsd,
}

impl OsDiskType {
    /// ARM storage account type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StandardHdd => "Standard_LRS",
            Self::StandardSsd => "StandardSSD_LRS",
            Self::PremiumSsd => "Premium_LRS",
        }
    }
}

impl FromStr for OsDiskType {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::StandardHdd, Self::StandardSsd, Self::PremiumSsd]
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProvisionError::UnsupportedDiskType(s.to_string()))
    }
}

impl fmt::Display for OsDiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the VM's primary network interface comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkPlacement {
    /// Attach an existing NIC, used verbatim.
    ExistingInterface(String),
    /// Create a NIC in `subnet` of `virtual_network`, optionally with a public IP.
    NewInterface {
        virtual_network: String,
        subnet: String,
        public_ip: Option<String>,
    },
}

/// Request to create one virtual machine.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationRequest {
    /// Target resource group.
    #[serde(default)]
    pub resource_group: String,
    /// VM name, also used as computer name.
    #[serde(default)]
    pub name: String,
    /// Azure region.
    #[serde(default)]
    pub location: String,
    /// VM size (e.g. `Standard_B1s`).
    #[serde(default)]
    pub size: String,
    /// Admin username.
    #[serde(default)]
    pub admin_username: String,
    /// Admin password.
    #[serde(default)]
    pub admin_password: String,
    /// Existing NIC resource ID. Takes priority over vnet/subnet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_interface_id: Option<String>,
    /// Virtual network for a new NIC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_network_name: Option<String>,
    /// Subnet for a new NIC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_name: Option<String>,
    /// Public IP to attach to a new NIC, created if absent.
    #[serde(
        default,
        rename = "publicIPName",
        alias = "publicIpName",
        skip_serializing_if = "Option::is_none"
    )]
    pub public_ip_name: Option<String>,
    /// OS disk tier; defaults to `StandardSSD_LRS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_disk_type: Option<String>,
    /// Cloud-init custom data, plain text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<String>,
    /// Image reference.
    #[serde(default)]
    pub image: ImageReference,
    /// Tags applied to every created resource.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
}

impl fmt::Debug for CreationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreationRequest")
            .field("resource_group", &self.resource_group)
            .field("name", &self.name)
            .field("location", &self.location)
            .field("size", &self.size)
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"[REDACTED]")
            .field("network_interface_id", &self.network_interface_id)
            .field("virtual_network_name", &self.virtual_network_name)
            .field("subnet_name", &self.subnet_name)
            .field("public_ip_name", &self.public_ip_name)
            .field("os_disk_type", &self.os_disk_type)
            .field(
                "custom_data",
                &self.custom_data.as_ref().map(|d| format!("<{} bytes>", d.len())),
            )
            .field("image", &self.image)
            .field("tags", &self.tags)
            .finish()
    }
}

impl CreationRequest {
    /// Check the request without touching the network.
    ///
    /// Returns the resolved network placement on success.
    ///
    /// # Errors
    /// Returns [`ProvisionError::MissingField`] naming the first empty
    /// required field, [`ProvisionError::AmbiguousNetworkPlacement`] if no
    /// placement mode is complete, or [`ProvisionError::UnsupportedDiskType`].
    pub fn validate(&self) -> Result<NetworkPlacement, ProvisionError> {
        let required = [
            ("resourceGroup", &self.resource_group),
            ("name", &self.name),
            ("location", &self.location),
            ("size", &self.size),
            ("adminUsername", &self.admin_username),
            ("adminPassword", &self.admin_password),
            ("image.publisher", &self.image.publisher),
            ("image.offer", &self.image.offer),
            ("image.sku", &self.image.sku),
            ("image.version", &self.image.version),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ProvisionError::MissingField(*field));
        }

        let placement = self.placement()?;
        self.os_disk_type()?;
        Ok(placement)
    }

    /// Network placement mode. An explicit NIC always wins.
    ///
    /// # Errors
    /// Returns [`ProvisionError::AmbiguousNetworkPlacement`] if neither a NIC
    /// nor both of virtual network and subnet are given.
    pub fn placement(&self) -> Result<NetworkPlacement, ProvisionError> {
        if let Some(nic) = self
            .network_interface_id
            .as_ref()
            .filter(|v| !v.trim().is_empty())
        {
            return Ok(NetworkPlacement::ExistingInterface(nic.clone()));
        }

        match (
            non_blank(self.virtual_network_name.as_ref()),
            non_blank(self.subnet_name.as_ref()),
        ) {
            (Some(vnet), Some(subnet)) => Ok(NetworkPlacement::NewInterface {
                virtual_network: vnet.to_string(),
                subnet: subnet.to_string(),
                public_ip: non_blank(self.public_ip_name.as_ref()).map(str::to_string),
            }),
            (Some(_), None) => Err(ProvisionError::AmbiguousNetworkPlacement(
                "virtualNetworkName given without subnetName".into(),
            )),
            (None, Some(_)) => Err(ProvisionError::AmbiguousNetworkPlacement(
                "subnetName given without virtualNetworkName".into(),
            )),
            (None, None) => Err(ProvisionError::AmbiguousNetworkPlacement(
                "either networkInterfaceId or virtualNetworkName and subnetName is required".into(),
            )),
        }
    }

    /// OS disk tier, defaulting to Standard SSD when unset.
    ///
    /// # Errors
    /// Returns [`ProvisionError::UnsupportedDiskType`] for unknown tiers.
    pub fn os_disk_type(&self) -> Result<OsDiskType, ProvisionError> {
        non_blank(self.os_disk_type.as_ref()).map_or(Ok(OsDiskType::default()), str::parse::<OsDiskType>)
    }
}

/// Validate a request. See [`CreationRequest::validate`].
///
/// # Errors
/// Same as [`CreationRequest::validate`].
pub fn validate(request: &CreationRequest) -> Result<NetworkPlacement, ProvisionError> {
    request.validate()
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

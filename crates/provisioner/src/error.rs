//! Error taxonomy for VM provisioning.

use std::fmt;

use thiserror::Error;

use crate::arm::ArmError;
use crate::resource_id::ResourceIdError;

/// Broad class of a [`ProvisionError`], used by callers to decide what is
/// safe to retry and by the CLI to choose an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request rejected before any remote call.
    Validation,
    /// Subnet, public IP or NIC could not be resolved or created.
    DependencyResolution,
    /// The VM create operation was never accepted.
    Submission,
    /// The VM create operation was accepted and then failed.
    Provisioning,
    /// Provider or caller data could not be interpreted.
    ContractViolation,
    /// The caller cancelled an in-flight wait.
    Cancelled,
}

impl ErrorKind {
    /// Process exit code for this kind.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Validation => 2,
            Self::DependencyResolution => 3,
            Self::Submission => 4,
            Self::Provisioning => 5,
            Self::ContractViolation => 6,
            Self::Cancelled => 130,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::DependencyResolution => write!(f, "dependency resolution"),
            Self::Submission => write!(f, "submission"),
            Self::Provisioning => write!(f, "provisioning"),
            Self::ContractViolation => write!(f, "contract violation"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Errors returned by the provisioning orchestrator.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A required request field is empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// OS disk tier is not one of the supported storage account types.
    #[error("unsupported OS disk type: {0:?}")]
    UnsupportedDiskType(String),

    /// Neither an explicit NIC nor a complete (vnet, subnet) pair was given.
    #[error("ambiguous network placement: {0}")]
    AmbiguousNetworkPlacement(String),

    #[error("failed to resolve subnet {subnet} in virtual network {virtual_network}: {source}")]
    SubnetResolutionFailed {
        virtual_network: String,
        subnet: String,
        #[source]
        source: ArmError,
    },

    #[error("subnet {subnet} in virtual network {virtual_network} has no resource ID")]
    SubnetMissingId {
        virtual_network: String,
        subnet: String,
    },

    #[error("failed to look up public IP {name}: {source}")]
    PublicIpLookupFailed {
        name: String,
        #[source]
        source: ArmError,
    },

    #[error("failed to create public IP {name}: {source}")]
    PublicIpCreateFailed {
        name: String,
        #[source]
        source: ArmError,
    },

    #[error("failed to create network interface {name}: {source}")]
    NetworkInterfaceCreateFailed {
        name: String,
        #[source]
        source: ArmError,
    },

    #[error("network interface {name} has no resource ID")]
    NetworkInterfaceMissingId { name: String },

    /// The VM create request was rejected.
    #[error("failed to submit virtual machine {name}: {source}")]
    SubmissionFailed {
        name: String,
        #[source]
        source: ArmError,
    },

    /// The VM create operation failed while polling.
    #[error("virtual machine {name} failed to provision: {source}")]
    ProvisioningFailed {
        name: String,
        #[source]
        source: ArmError,
    },

    /// The provider reported success but returned an unusable resource.
    #[error("invalid provider response: {0}")]
    InvalidProviderResponse(String),

    /// An address lookup after creation failed.
    #[error("failed to look up {resource}: {source}")]
    AddressLookupFailed {
        resource: String,
        #[source]
        source: ArmError,
    },

    #[error(transparent)]
    ResourceId(#[from] ResourceIdError),
}

impl ProvisionError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField(_)
            | Self::UnsupportedDiskType(_)
            | Self::AmbiguousNetworkPlacement(_) => ErrorKind::Validation,
            Self::SubnetResolutionFailed { source, .. }
            | Self::PublicIpLookupFailed { source, .. }
            | Self::PublicIpCreateFailed { source, .. }
            | Self::NetworkInterfaceCreateFailed { source, .. }
                if source.is_cancelled() =>
            {
                ErrorKind::Cancelled
            }
            Self::ProvisioningFailed { source, .. } if source.is_cancelled() => {
                ErrorKind::Cancelled
            }
            Self::SubnetResolutionFailed { .. }
            | Self::SubnetMissingId { .. }
            | Self::PublicIpLookupFailed { .. }
            | Self::PublicIpCreateFailed { .. }
            | Self::NetworkInterfaceCreateFailed { .. }
            | Self::NetworkInterfaceMissingId { .. } => ErrorKind::DependencyResolution,
            Self::SubmissionFailed { .. } => ErrorKind::Submission,
            Self::ProvisioningFailed { .. } => ErrorKind::Provisioning,
            Self::InvalidProviderResponse(_)
            | Self::AddressLookupFailed { .. }
            | Self::ResourceId(_) => ErrorKind::ContractViolation,
        }
    }
}

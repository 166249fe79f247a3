//! Azure virtual machine provisioning for CTO Platform.
//!
//! Turns a small declarative [`CreationRequest`] into a running VM:
//!
//! 1. **Validate** the request before any remote call
//! 2. **Resolve the network interface** - use an explicit NIC, or create one
//!    in a subnet, ensuring its public IP exists first
//! 3. **Create the VM** and poll the long-running operation to completion
//! 4. **Resolve addresses** of the primary NIC (best effort)
//!
//! All remote calls go through the [`ArmApi`] trait; [`ArmClient`] is the
//! Azure Resource Manager REST implementation.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cto_provisioner::{
//!     ArmClient, CancellationToken, CreationRequest, Provisioner, ProvisionerConfig,
//! };
//!
//! # async fn run(request: CreationRequest) -> anyhow::Result<()> {
//! let config = ProvisionerConfig::from_env()?;
//! let client = ArmClient::from_config(&config)?;
//! let result = Provisioner::new(Arc::new(client))
//!     .create_vm(&request, &CancellationToken::new())
//!     .await?;
//! println!("{}", result.id);
//! # Ok(())
//! # }
//! ```
//!
//! Nothing created along the way is rolled back on a later failure. A NIC or
//! public IP created before a failed VM submission stays in the resource
//! group, and a retry creates a new NIC.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod address;
pub mod arm;
pub mod config;
pub mod error;
pub mod network;
pub mod orchestrator;
pub mod public_ip;
pub mod request;
pub mod resource_id;

#[cfg(test)]
mod test_support;

pub use address::{resolve_addresses, Addresses};
pub use arm::{ArmApi, ArmClient, ArmError, PollPolicy, Poller};
pub use config::ProvisionerConfig;
pub use error::{ErrorKind, ProvisionError};
pub use network::resolve_network_interface;
pub use orchestrator::{CreationResult, Provisioner};
pub use public_ip::ensure_public_ip;
pub use request::{validate, CreationRequest, ImageReference, NetworkPlacement, OsDiskType};
pub use resource_id::{ResourceId, ResourceIdError};
pub use tokio_util::sync::CancellationToken;

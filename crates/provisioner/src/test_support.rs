//! In-memory [`ArmApi`] used by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::arm::models::{
    CreateVmRequest, HardwareProfile, IpConfiguration, IpConfigurationProperties,
    NetworkInterface, NetworkInterfaceProperties, PublicIpAddress, PublicIpAddressProperties,
    SubResource, Subnet, VirtualMachine, VirtualMachineProperties,
};
use crate::arm::{ArmApi, ArmError, Poller};

pub const SUBSCRIPTION: &str = "sub-1";

pub fn subnet_id(rg: &str, vnet: &str, subnet: &str) -> String {
    format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/{rg}/providers/Microsoft.Network/virtualNetworks/{vnet}/subnets/{subnet}")
}

pub fn nic_id(rg: &str, name: &str) -> String {
    format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/{rg}/providers/Microsoft.Network/networkInterfaces/{name}")
}

pub fn pip_id(rg: &str, name: &str) -> String {
    format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/{rg}/providers/Microsoft.Network/publicIPAddresses/{name}")
}

pub fn vm_id(rg: &str, name: &str) -> String {
    format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/{rg}/providers/Microsoft.Compute/virtualMachines/{name}")
}

pub fn not_found(name: &str) -> ArmError {
    ArmError::Api {
        status: 404,
        code: Some("ResourceNotFound".into()),
        message: format!("The Resource '{name}' was not found."),
    }
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetSubnet(String),
    GetPublicIp(String),
    CreatePublicIp(String),
    GetNetworkInterface(String),
    CreateNetworkInterface(String),
    CreateVirtualMachine(String),
}

impl Call {
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            Self::CreatePublicIp(_) | Self::CreateNetworkInterface(_) | Self::CreateVirtualMachine(_)
        )
    }
}

/// Scripted outcome of a `begin_*` call.
pub enum Lro<T> {
    /// Submission rejected.
    Rejected(ArmError),
    /// Submission accepted; the poller yields this.
    Completed(Result<T, ArmError>),
}

/// Records calls and answers from scripted queues, falling back to
/// plausible successful defaults.
#[derive(Default)]
pub struct FakeArm {
    calls: Mutex<Vec<Call>>,
    pub subnets: Mutex<VecDeque<Result<Subnet, ArmError>>>,
    pub public_ips: Mutex<VecDeque<Result<PublicIpAddress, ArmError>>>,
    pub public_ip_creates: Mutex<VecDeque<Lro<PublicIpAddress>>>,
    pub network_interfaces: Mutex<VecDeque<Result<NetworkInterface, ArmError>>>,
    pub network_interface_creates: Mutex<VecDeque<Lro<NetworkInterface>>>,
    pub vm_creates: Mutex<VecDeque<Lro<VirtualMachine>>>,
    pub nic_bodies: Mutex<Vec<NetworkInterface>>,
    pub pip_bodies: Mutex<Vec<PublicIpAddress>>,
    pub vm_bodies: Mutex<Vec<CreateVmRequest>>,
}

impl FakeArm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn creates(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_create).collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn pop<T>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
        queue.lock().unwrap().pop_front()
    }

    fn lro<T: Send + 'static>(
        queue: &Mutex<VecDeque<Lro<T>>>,
        operation: String,
        default: impl FnOnce() -> T,
    ) -> Result<Poller<T>, ArmError> {
        match Self::pop(queue) {
            Some(Lro::Rejected(e)) => Err(e),
            Some(Lro::Completed(result)) => Ok(Poller::done(operation, result)),
            None => Ok(Poller::done(operation, Ok(default()))),
        }
    }
}

/// Network interface with one IP configuration.
pub fn network_interface(
    id: Option<String>,
    private_ip: Option<&str>,
    public_ip_id: Option<String>,
) -> NetworkInterface {
    NetworkInterface {
        id,
        properties: Some(NetworkInterfaceProperties {
            ip_configurations: vec![IpConfiguration {
                name: Some("ipconfig1".into()),
                properties: Some(IpConfigurationProperties {
                    private_ip_address: private_ip.map(str::to_string),
                    public_ip_address: public_ip_id.map(SubResource::new),
                    ..IpConfigurationProperties::default()
                }),
            }],
            provisioning_state: Some("Succeeded".into()),
        }),
        ..NetworkInterface::default()
    }
}

/// Public IP with an assigned address.
pub fn public_ip(id: Option<String>, address: Option<&str>) -> PublicIpAddress {
    PublicIpAddress {
        id,
        properties: Some(PublicIpAddressProperties {
            ip_address: address.map(str::to_string),
            ..PublicIpAddressProperties::default()
        }),
        ..PublicIpAddress::default()
    }
}

#[async_trait]
impl ArmApi for FakeArm {
    async fn get_subnet(
        &self,
        resource_group: &str,
        virtual_network: &str,
        subnet: &str,
    ) -> Result<Subnet, ArmError> {
        self.record(Call::GetSubnet(format!("{virtual_network}/{subnet}")));
        Self::pop(&self.subnets).unwrap_or_else(|| {
            Ok(Subnet {
                id: Some(subnet_id(resource_group, virtual_network, subnet)),
                name: Some(subnet.to_string()),
            })
        })
    }

    async fn get_public_ip(
        &self,
        _resource_group: &str,
        name: &str,
    ) -> Result<PublicIpAddress, ArmError> {
        self.record(Call::GetPublicIp(name.to_string()));
        Self::pop(&self.public_ips).unwrap_or_else(|| Err(not_found(name)))
    }

    async fn begin_create_public_ip(
        &self,
        resource_group: &str,
        name: &str,
        body: &PublicIpAddress,
    ) -> Result<Poller<PublicIpAddress>, ArmError> {
        self.record(Call::CreatePublicIp(name.to_string()));
        self.pip_bodies.lock().unwrap().push(body.clone());
        Self::lro(&self.public_ip_creates, format!("create public IP {name}"), || {
            public_ip(Some(pip_id(resource_group, name)), Some("20.1.2.3"))
        })
    }

    async fn get_network_interface(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<NetworkInterface, ArmError> {
        self.record(Call::GetNetworkInterface(name.to_string()));
        Self::pop(&self.network_interfaces).unwrap_or_else(|| {
            Ok(network_interface(
                Some(nic_id(resource_group, name)),
                Some("10.0.0.4"),
                None,
            ))
        })
    }

    async fn begin_create_network_interface(
        &self,
        resource_group: &str,
        name: &str,
        body: &NetworkInterface,
    ) -> Result<Poller<NetworkInterface>, ArmError> {
        self.record(Call::CreateNetworkInterface(name.to_string()));
        self.nic_bodies.lock().unwrap().push(body.clone());
        let mut created = body.clone();
        created.id = Some(nic_id(resource_group, name));
        Self::lro(
            &self.network_interface_creates,
            format!("create network interface {name}"),
            move || created,
        )
    }

    async fn begin_create_virtual_machine(
        &self,
        resource_group: &str,
        name: &str,
        body: &CreateVmRequest,
    ) -> Result<Poller<VirtualMachine>, ArmError> {
        self.record(Call::CreateVirtualMachine(name.to_string()));
        self.vm_bodies.lock().unwrap().push(body.clone());
        let created = VirtualMachine {
            id: Some(vm_id(resource_group, name)),
            name: Some(name.to_string()),
            location: Some(body.location.clone()),
            properties: Some(VirtualMachineProperties {
                provisioning_state: Some("Succeeded".into()),
                hardware_profile: Some(HardwareProfile {
                    vm_size: body.properties.hardware_profile.vm_size.clone(),
                }),
                network_profile: Some(body.properties.network_profile.clone()),
            }),
        };
        Self::lro(
            &self.vm_creates,
            format!("create virtual machine {name}"),
            move || created,
        )
    }
}

//! End-to-end provisioning against a mock Azure Resource Manager.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use cto_provisioner::request::images;
use cto_provisioner::{
    ArmClient, CancellationToken, CreationRequest, ErrorKind, PollPolicy, ProvisionError,
    Provisioner,
};

const SUB: &str = "sub-1";
const TOKEN: &str = "test-token";

fn base(rg: &str) -> String {
    format!("/subscriptions/{SUB}/resourceGroups/{rg}/providers")
}

fn vm_path() -> String {
    format!("{}/Microsoft.Compute/virtualMachines/vm1", base("rg1"))
}

fn nic_path(name: &str) -> String {
    format!("{}/Microsoft.Network/networkInterfaces/{name}", base("rg1"))
}

fn pip_path() -> String {
    format!("{}/Microsoft.Network/publicIPAddresses/pip1", base("rg1"))
}

fn subnet_path() -> String {
    format!(
        "{}/Microsoft.Network/virtualNetworks/vnet1/subnets/sub1",
        base("rg1")
    )
}

fn fast_policy() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(5),
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        max_retries: 3,
        ..PollPolicy::default()
    }
}

fn provisioner(server: &MockServer, policy: PollPolicy) -> Provisioner {
    let client = ArmClient::new(SUB, TOKEN)
        .unwrap()
        .with_endpoint(&server.uri())
        .with_poll_policy(policy);
    Provisioner::new(Arc::new(client))
}

fn explicit_nic_request() -> CreationRequest {
    CreationRequest {
        resource_group: "rg1".into(),
        name: "vm1".into(),
        location: "eastus".into(),
        size: "Standard_B1s".into(),
        admin_username: "azureuser".into(),
        admin_password: "S3cret!pass".into(),
        network_interface_id: Some(nic_path("nic1")),
        image: images::UBUNTU_20_04.into(),
        ..CreationRequest::default()
    }
}

fn implicit_nic_request() -> CreationRequest {
    CreationRequest {
        network_interface_id: None,
        virtual_network_name: Some("vnet1".into()),
        subnet_name: Some("sub1".into()),
        public_ip_name: Some("pip1".into()),
        ..explicit_nic_request()
    }
}

fn vm_body(state: &str, nic_id: &str) -> Value {
    json!({
        "id": vm_path(),
        "name": "vm1",
        "location": "eastus",
        "properties": {
            "provisioningState": state,
            "hardwareProfile": {"vmSize": "Standard_B1s"},
            "networkProfile": {
                "networkInterfaces": [{"id": nic_id, "properties": {"primary": true}}]
            }
        }
    })
}

fn nic_body(name: &str, private_ip: &str, public_ip_id: Option<String>) -> Value {
    let mut config = json!({"privateIPAddress": private_ip});
    if let Some(id) = public_ip_id {
        config["publicIPAddress"] = json!({"id": id});
    }
    json!({
        "id": nic_path(name),
        "name": name,
        "properties": {
            "provisioningState": "Succeeded",
            "ipConfigurations": [{"name": "ipconfig1", "properties": config}]
        }
    })
}

async fn puts(server: &MockServer) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "PUT")
        .collect()
}

/// Mount a VM create answered with an `Azure-AsyncOperation` header whose
/// status goes `InProgress` then `final_status`.
async fn mount_async_vm_create(server: &MockServer, final_status: Value) {
    let status_url = format!("{}/operations/vm-op", server.uri());
    Mock::given(method("PUT"))
        .and(path(vm_path()))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Azure-AsyncOperation", status_url.as_str())
                .set_body_json(vm_body("Creating", &nic_path("nic1"))),
        )
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/vm-op"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "InProgress"})))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/vm-op"))
        .respond_with(ResponseTemplate::new(200).set_body_json(final_status))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_explicit_nic_creates_only_vm() {
    let server = MockServer::start().await;
    mount_async_vm_create(&server, json!({"status": "Succeeded"})).await;
    Mock::given(method("GET"))
        .and(path(vm_path()))
        .and(query_param("api-version", "2023-09-01"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(vm_body("Succeeded", &nic_path("nic1"))),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(nic_path("nic1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(nic_body("nic1", "10.0.0.4", None)))
        .mount(&server)
        .await;

    let result = provisioner(&server, fast_policy())
        .create_vm(&explicit_nic_request(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.name, "vm1");
    assert_eq!(result.provisioning_state, "Succeeded");
    assert_eq!(result.size, "Standard_B1s");
    assert_eq!(result.private_ip, "10.0.0.4");
    assert_eq!(result.public_ip, "");

    let puts = puts(&server).await;
    assert_eq!(puts.len(), 1);
    let body: Value = puts[0].body_json().unwrap();
    assert_eq!(
        body["properties"]["networkProfile"]["networkInterfaces"][0]["id"],
        nic_path("nic1")
    );
    assert_eq!(
        body["properties"]["storageProfile"]["osDisk"]["managedDisk"]["storageAccountType"],
        "StandardSSD_LRS"
    );
    assert_eq!(
        body["properties"]["storageProfile"]["imageReference"]["offer"],
        "0001-com-ubuntu-server-focal"
    );
    assert!(puts[0].headers.get("x-ms-correlation-request-id").is_some());
}

#[tokio::test]
async fn test_implicit_nic_creates_public_ip_nic_and_vm_in_order() {
    let server = MockServer::start().await;
    let pip_id = pip_path();

    Mock::given(method("GET"))
        .and(path(subnet_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": subnet_path(), "name": "sub1"})),
        )
        .mount(&server)
        .await;

    // First lookup misses, the address lookup afterwards finds it.
    Mock::given(method("GET"))
        .and(path(pip_path()))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": "ResourceNotFound", "message": "The Resource 'pip1' was not found."}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(pip_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": pip_id,
            "properties": {"ipAddress": "20.1.2.3", "provisioningState": "Succeeded"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(pip_path()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": pip_id,
            "properties": {"provisioningState": "Succeeded"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    // NIC create reports progress through a Location URL.
    let nic_op = format!("{}/operations/nic-op", server.uri());
    Mock::given(method("PUT"))
        .and(path(nic_path("vm1-nic")))
        .respond_with(ResponseTemplate::new(202).insert_header("Location", nic_op.as_str()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/nic-op"))
        .respond_with(ResponseTemplate::new(202))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/nic-op"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(nic_path("vm1-nic")))
        .respond_with(ResponseTemplate::new(200).set_body_json(nic_body(
            "vm1-nic",
            "10.0.0.9",
            Some(pip_path()),
        )))
        .mount(&server)
        .await;

    // VM create is polled through its own provisioning state.
    Mock::given(method("PUT"))
        .and(path(vm_path()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(vm_body("Creating", &nic_path("vm1-nic"))),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(vm_path()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(vm_body("Succeeded", &nic_path("vm1-nic"))),
        )
        .mount(&server)
        .await;

    let result = provisioner(&server, fast_policy())
        .create_vm(&implicit_nic_request(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.provisioning_state, "Succeeded");
    assert_eq!(result.private_ip, "10.0.0.9");
    assert_eq!(result.public_ip, "20.1.2.3");

    let puts = puts(&server).await;
    let order: Vec<&str> = puts.iter().map(|r| r.url.path()).collect();
    assert_eq!(order, vec![pip_path(), nic_path("vm1-nic"), vm_path()]);

    let pip: Value = puts[0].body_json().unwrap();
    assert_eq!(pip["sku"]["name"], "Standard");
    assert_eq!(pip["properties"]["publicIPAllocationMethod"], "Static");
    assert_eq!(pip["properties"]["publicIPAddressVersion"], "IPv4");

    let nic: Value = puts[1].body_json().unwrap();
    let config = &nic["properties"]["ipConfigurations"][0]["properties"];
    assert_eq!(config["subnet"]["id"], subnet_path());
    assert_eq!(config["publicIPAddress"]["id"], pip_path());
    assert_eq!(config["privateIPAllocationMethod"], "Dynamic");
}

#[tokio::test]
async fn test_public_ip_lookup_error_is_not_treated_as_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(subnet_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": subnet_path()})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(pip_path()))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let err = provisioner(&server, fast_policy())
        .create_vm(&implicit_nic_request(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::PublicIpLookupFailed { .. }));
    assert_eq!(err.kind(), ErrorKind::DependencyResolution);
    assert!(puts(&server).await.is_empty());
}

#[tokio::test]
async fn test_submission_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(vm_path()))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": "InvalidParameter", "message": "The value of parameter vmSize is invalid."}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = provisioner(&server, fast_policy())
        .create_vm(&explicit_nic_request(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Submission);
    assert!(err.to_string().contains("vmSize is invalid"));
}

#[tokio::test]
async fn test_operation_failure_is_provisioning_error() {
    let server = MockServer::start().await;
    mount_async_vm_create(
        &server,
        json!({
            "status": "Failed",
            "error": {"code": "AllocationFailed", "message": "No capacity in eastus."}
        }),
    )
    .await;

    let err = provisioner(&server, fast_policy())
        .create_vm(&explicit_nic_request(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Provisioning);
    assert!(err.to_string().contains("No capacity"));
}

#[tokio::test]
async fn test_transient_poll_error_is_retried() {
    let server = MockServer::start().await;
    let status_url = format!("{}/operations/vm-op", server.uri());
    Mock::given(method("PUT"))
        .and(path(vm_path()))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Azure-AsyncOperation", status_url.as_str())
                .insert_header("Retry-After", "0"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/vm-op"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/vm-op"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Succeeded"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(vm_path()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(vm_body("Succeeded", &nic_path("nic1"))),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(nic_path("nic1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(nic_body("nic1", "10.0.0.4", None)))
        .mount(&server)
        .await;

    let result = provisioner(&server, fast_policy())
        .create_vm(&explicit_nic_request(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.provisioning_state, "Succeeded");
}

#[tokio::test]
async fn test_retry_after_overrides_poll_interval() {
    let server = MockServer::start().await;
    let status_url = format!("{}/operations/vm-op", server.uri());
    Mock::given(method("PUT"))
        .and(path(vm_path()))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Azure-AsyncOperation", status_url.as_str())
                .insert_header("Retry-After", "0"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/vm-op"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Retry-After", "0")
                .set_body_json(json!({"status": "InProgress"})),
        )
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/vm-op"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Succeeded"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(vm_path()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(vm_body("Succeeded", &nic_path("nic1"))),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(nic_path("nic1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(nic_body("nic1", "10.0.0.4", None)))
        .mount(&server)
        .await;

    // Without Retry-After every poll would wait a minute.
    let policy = PollPolicy {
        interval: Duration::from_secs(60),
        ..fast_policy()
    };
    let provisioner = provisioner(&server, policy);
    let request = explicit_nic_request();
    let cancel = CancellationToken::new();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        provisioner.create_vm(&request, &cancel),
    )
    .await
    .expect("Retry-After should shorten the poll delay")
    .unwrap();
    assert_eq!(result.provisioning_state, "Succeeded");
}

#[tokio::test]
async fn test_address_lookup_failure_is_degraded_not_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(vm_path()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(vm_body("Succeeded", &nic_path("nic1"))),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(nic_path("nic1")))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = provisioner(&server, fast_policy())
        .create_vm(&explicit_nic_request(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.id, vm_path());
    assert_eq!(result.provisioning_state, "Succeeded");
    assert_eq!(result.private_ip, "");
    assert_eq!(result.public_ip, "");
}

#[tokio::test]
async fn test_cancel_stops_polling() {
    let server = MockServer::start().await;
    let status_url = format!("{}/operations/vm-op", server.uri());
    Mock::given(method("PUT"))
        .and(path(vm_path()))
        .respond_with(
            ResponseTemplate::new(201).insert_header("Azure-AsyncOperation", status_url.as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/vm-op"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "InProgress"})))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = provisioner(&server, fast_policy())
        .create_vm(&explicit_nic_request(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[tokio::test]
async fn test_poll_timeout() {
    let server = MockServer::start().await;
    let status_url = format!("{}/operations/vm-op", server.uri());
    Mock::given(method("PUT"))
        .and(path(vm_path()))
        .respond_with(
            ResponseTemplate::new(201).insert_header("Azure-AsyncOperation", status_url.as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/vm-op"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "InProgress"})))
        .mount(&server)
        .await;

    let policy = PollPolicy {
        timeout: Some(Duration::from_millis(50)),
        ..fast_policy()
    };
    let err = provisioner(&server, policy)
        .create_vm(&explicit_nic_request(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::ProvisioningFailed {
            source: cto_provisioner::ArmError::Timeout { .. },
            ..
        }
    ));
}

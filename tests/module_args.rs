//! End-to-end module runs against the mock compute client.
//!
//! Run with:
//!   cargo test --test module_args

#![cfg(feature = "mock")]

use azure_image_capture::module;
use azure_image_capture::{CaptureError, ComputeProvider, Environment, ModuleParams};
use serde_json::{json, Value};
use std::io::Write;
use tempfile::NamedTempFile;

fn args_file(args: Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create args file");
    write!(file, "{}", args).expect("Failed to write args file");
    file
}

fn full_args() -> Value {
    json!({
        "subscription_id": "cbbdaed0-fea9-4693-bf0c-d446ac93c030",
        "client_id": "d1a6b8e4-0000-0000-0000-000000000000",
        "client_secret": "not-a-real-secret",
        "tenant_id": "contoso.onmicrosoft.com",
        "resource_group_name": "dev-ops-cle",
        "vm_name": "MyUbuntuVM",
        "destination_container": "copiedvhds",
        "vhd_prefix": "golden",
        "wait": false,
        "_ansible_check_mode": false,
        "_ansible_module_name": "azure_image_capture"
    })
}

async fn run_file(file: &NamedTempFile, env: &Environment) -> Value {
    azure_image_capture::init();

    let params = ModuleParams::from_file(file.path())
        .await
        .expect("Failed to read args file");
    let response = module::run(ComputeProvider::Mock, &params, env).await;
    serde_json::to_value(response).expect("Failed to serialize response")
}

#[tokio::test]
async fn test_capture_from_args_file() {
    let file = args_file(full_args());
    let result = run_file(&file, &Environment::default()).await;

    assert_eq!(result["changed"], true);
    assert!(result.get("failed").is_none());
    assert_eq!(
        result["msg"],
        "Successfully captured image to container:copiedvhds"
    );

    let uri = result["vhd_uri"].as_str().unwrap();
    assert!(uri.contains("/copiedvhds/golden-osDisk."), "{}", uri);
}

#[tokio::test]
async fn test_templated_wait_string() {
    let mut args = full_args();
    args["wait"] = json!("True");
    let file = args_file(args);

    let params = ModuleParams::from_file(file.path())
        .await
        .expect("Failed to read args file");
    assert!(params.wait);

    let result = run_file(&file, &Environment::default()).await;
    assert_eq!(result["changed"], true, "{}", result["msg"]);
}

#[tokio::test]
async fn test_environment_fills_missing_arguments() {
    let file = args_file(json!({
        "resource_group_name": "dev-ops-cle",
        "vm_name": "MyUbuntuVM"
    }));
    let env = Environment::from_pairs([
        ("AZURE_SUBSCRIPTION_ID", "cbbdaed0-fea9-4693-bf0c-d446ac93c030"),
        ("AZURE_CLIENT_ID", "client"),
        ("AZURE_CLIENT_SECRET", "secret"),
        ("AZURE_DOMAIN", "contoso.onmicrosoft.com"),
        ("DESTINATION_CONTAINER", "fromenv"),
    ]);

    let result = run_file(&file, &env).await;

    assert_eq!(result["changed"], true, "{}", result["msg"]);
    assert_eq!(
        result["msg"],
        "Successfully captured image to container:fromenv"
    );
    assert!(result["vhd_uri"]
        .as_str()
        .unwrap()
        .contains("/fromenv/vm-osdisk-osDisk."));
}

#[tokio::test]
async fn test_missing_credentials_fail() {
    let mut args = full_args();
    args.as_object_mut().unwrap().remove("client_secret");
    let file = args_file(args);

    let result = run_file(&file, &Environment::default()).await;

    assert_eq!(result["changed"], false);
    assert_eq!(result["failed"], true);
    assert!(result.get("vhd_uri").is_none());
    assert!(result["msg"].as_str().unwrap().contains("client_secret"));
}

#[tokio::test]
async fn test_missing_container_fails() {
    let mut args = full_args();
    args.as_object_mut().unwrap().remove("destination_container");
    let file = args_file(args);

    let result = run_file(&file, &Environment::default()).await;

    assert_eq!(result["failed"], true);
    assert!(result["msg"]
        .as_str()
        .unwrap()
        .contains("destination_container"));
}

#[tokio::test]
async fn test_unsafe_vm_name_fails() {
    let mut args = full_args();
    args["vm_name"] = json!("../other-vm");
    let file = args_file(args);

    let result = run_file(&file, &Environment::default()).await;

    assert_eq!(result["failed"], true);
    assert!(result["msg"].as_str().unwrap().contains("vm_name"));
}

#[tokio::test]
async fn test_malformed_args_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();

    let result = ModuleParams::from_file(file.path()).await;
    assert!(matches!(result, Err(CaptureError::Json(_))));
}

#[tokio::test]
async fn test_missing_args_file() {
    let result = ModuleParams::from_file("/nonexistent/args.json").await;
    assert!(matches!(result, Err(CaptureError::Io(_))));
}

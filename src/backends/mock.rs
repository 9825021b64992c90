//! Mock compute client for testing.
//!
//! This client keeps everything in memory, records each call it receives and
//! supports per-step error injection to simulate remote failures.

use crate::*;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// A call received by the [`MockComputeClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `authenticate()`
    Authenticate,
    /// A step was submitted
    Submit(CaptureStep),
    /// A step was waited on
    Wait(CaptureStep),
}

/// Mock compute client for testing.
///
/// # Example
///
/// ```
/// use azure_image_capture::backends::mock::{MockCall, MockComputeClient};
/// use azure_image_capture::{CaptureError, CaptureStep, ConnectionDescriptor, ImageCapture};
///
/// #[tokio::main]
/// async fn main() {
///     let mut client = MockComputeClient::new();
///     client.generalize_error = Some(CaptureError::Transport("reset".to_string()));
///     let calls = client.calls();
///
///     let descriptor = ConnectionDescriptor {
///         resource_group_name: Some("rg".to_string()),
///         vm_name: Some("vm".to_string()),
///         destination_container: Some("images".to_string()),
///         ..Default::default()
///     };
///
///     let mut capture = ImageCapture::new(Box::new(client));
///     let err = capture.capture_image(&descriptor).await.unwrap_err();
///
///     assert_eq!(err.step(), Some(CaptureStep::Generalize));
///     assert!(!calls.lock().unwrap().contains(&MockCall::Submit(CaptureStep::Capture)));
/// }
/// ```
pub struct MockComputeClient {
    calls: Arc<Mutex<Vec<MockCall>>>,

    /// Payload returned when the capture operation is waited on. When unset,
    /// a well-formed capture result is built from the request.
    pub capture_payload: Option<Value>,

    /// Error to return from `authenticate()`
    pub auth_error: Option<CaptureError>,
    /// Error to return from `deallocate()`
    pub deallocate_error: Option<CaptureError>,
    /// Error to return from `generalize()`
    pub generalize_error: Option<CaptureError>,
    /// Error to return from `capture()`
    pub capture_error: Option<CaptureError>,
    /// Error to return from `wait()`
    pub wait_error: Option<CaptureError>,
}

impl MockComputeClient {
    /// Creates a new mock client that succeeds on every call.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            capture_payload: None,
            auth_error: None,
            deallocate_error: None,
            generalize_error: None,
            capture_error: None,
            wait_error: None,
        }
    }

    /// Sets the payload the capture operation completes with.
    pub fn with_capture_payload(mut self, payload: Value) -> Self {
        self.capture_payload = Some(payload);
        self
    }

    /// Shared handle on the recorded calls.
    ///
    /// Grab it before handing the client to a sequencer.
    pub fn calls(&self) -> Arc<Mutex<Vec<MockCall>>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: MockCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    fn injected(err: &Option<CaptureError>) -> Result<()> {
        match err {
            Some(err) => Err(replay(err)),
            None => Ok(()),
        }
    }
}

impl Default for MockComputeClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Rebuilds an injected error so each call returns its own copy, keeping
/// the variant where it carries only plain data.
fn replay(err: &CaptureError) -> CaptureError {
    match err {
        CaptureError::MissingCredentials(fields) => CaptureError::MissingCredentials(fields.clone()),
        CaptureError::MissingParameter(field) => CaptureError::MissingParameter(*field),
        CaptureError::InvalidParameter { field, reason } => CaptureError::InvalidParameter {
            field: *field,
            reason: reason.clone(),
        },
        CaptureError::MissingDependency(msg) => CaptureError::MissingDependency(msg.clone()),
        CaptureError::Authentication(msg) => CaptureError::Authentication(msg.clone()),
        CaptureError::RemoteOperation { step, source } => CaptureError::remote(*step, replay(source)),
        CaptureError::Extraction(msg) => CaptureError::Extraction(msg.clone()),
        CaptureError::Http {
            status,
            code,
            message,
        } => CaptureError::Http {
            status: *status,
            code: code.clone(),
            message: message.clone(),
        },
        CaptureError::OperationFailed { status, message } => CaptureError::OperationFailed {
            status: status.clone(),
            message: message.clone(),
        },
        CaptureError::Timeout(after) => CaptureError::Timeout(*after),
        CaptureError::Transport(msg) => CaptureError::Transport(msg.clone()),
        other => CaptureError::Other(anyhow::anyhow!("{}", other)),
    }
}

/// Builds a capture result shaped like the compute API's output template.
pub fn capture_output(uri: &str) -> Value {
    json!({
        "$schema": "http://schema.management.azure.com/schemas/2014-04-01-preview/VM_IP.json",
        "contentVersion": "1.0.0.0",
        "resources": [{
            "name": "[parameters('vmName')]",
            "type": "Microsoft.Compute/virtualMachines",
            "properties": {
                "storageProfile": {
                    "osDisk": {
                        "osType": "Linux",
                        "name": "osDisk",
                        "createOption": "FromImage",
                        "image": { "uri": uri },
                        "caching": "ReadWrite"
                    }
                }
            }
        }]
    })
}

#[async_trait]
impl ComputeClient for MockComputeClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn authenticate(&mut self) -> Result<()> {
        self.record(MockCall::Authenticate);
        Self::injected(&self.auth_error)
    }

    async fn deallocate(&self, _target: &VmTarget) -> Result<PendingOperation> {
        self.record(MockCall::Submit(CaptureStep::Deallocate));
        Self::injected(&self.deallocate_error)?;
        Ok(PendingOperation::completed(CaptureStep::Deallocate, None))
    }

    async fn generalize(&self, _target: &VmTarget) -> Result<PendingOperation> {
        self.record(MockCall::Submit(CaptureStep::Generalize));
        Self::injected(&self.generalize_error)?;
        Ok(PendingOperation::completed(CaptureStep::Generalize, None))
    }

    async fn capture(
        &self,
        _target: &VmTarget,
        request: &CaptureRequest,
    ) -> Result<PendingOperation> {
        self.record(MockCall::Submit(CaptureStep::Capture));
        Self::injected(&self.capture_error)?;

        let payload = self.capture_payload.clone().unwrap_or_else(|| {
            capture_output(&format!(
                "https://mockstorage.blob.core.windows.net/system/Microsoft.Compute/Images/{}/{}-osDisk.{}.vhd",
                request.destination_container_name,
                request.vhd_prefix,
                uuid::Uuid::new_v4()
            ))
        });

        Ok(PendingOperation {
            step: CaptureStep::Capture,
            async_operation_url: Some("mock://operations/capture".to_string()),
            location_url: None,
            body: Some(payload),
        })
    }

    async fn wait(&self, operation: PendingOperation) -> Result<Option<Value>> {
        self.record(MockCall::Wait(operation.step));
        Self::injected(&self.wait_error)?;
        Ok(operation.body)
    }
}

/// Registers the mock client with the factory.
pub fn register() {
    crate::factory::register_client("mock", |_descriptor| {
        Ok(Box::new(MockComputeClient::new()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> VmTarget {
        VmTarget::new("dev-ops-cle", "MyUbuntuVM")
    }

    #[tokio::test]
    async fn test_mock_records_calls() {
        let mut client = MockComputeClient::new();
        let calls = client.calls();

        client.authenticate().await.unwrap();
        let op = client.deallocate(&target()).await.unwrap();
        client.wait(op).await.unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                MockCall::Authenticate,
                MockCall::Submit(CaptureStep::Deallocate),
                MockCall::Wait(CaptureStep::Deallocate),
            ]
        );
    }

    #[tokio::test]
    async fn test_default_capture_payload_uses_request() {
        let client = MockComputeClient::new();
        let request = CaptureRequest::new("MyUbuntuVM", "copiedvhds", "vm-osdisk", true);

        let op = client.capture(&target(), &request).await.unwrap();
        assert!(op.is_tracked());

        let payload = client.wait(op).await.unwrap().unwrap();
        let uri = payload
            .pointer("/resources/0/properties/storageProfile/osDisk/image/uri")
            .and_then(Value::as_str)
            .unwrap();
        assert!(uri.contains("/Images/copiedvhds/vm-osdisk-osDisk."));
        assert!(uri.ends_with(".vhd"));
    }

    #[tokio::test]
    async fn test_error_injection() {
        let mut client = MockComputeClient::new();
        client.auth_error = Some(CaptureError::Authentication("bad secret".to_string()));
        client.deallocate_error = Some(CaptureError::Transport("reset".to_string()));

        let auth = client.authenticate().await.unwrap_err();
        assert!(matches!(auth, CaptureError::Authentication(ref msg) if msg == "bad secret"));

        let deallocate = client.deallocate(&target()).await.unwrap_err();
        assert!(matches!(deallocate, CaptureError::Transport(ref msg) if msg == "reset"));

        // Injected errors are returned on every call
        assert!(client.deallocate(&target()).await.is_err());

        assert!(client.generalize(&target()).await.is_ok());
    }

    #[tokio::test]
    async fn test_custom_payload() {
        let client = MockComputeClient::new().with_capture_payload(json!({ "resources": [] }));
        let request = CaptureRequest::new("vm", "images", "vm-osdisk", true);

        let op = client.capture(&target(), &request).await.unwrap();
        assert_eq!(op.body, Some(json!({ "resources": [] })));
    }
}

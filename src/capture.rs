//! Capture sequencer: deallocate, generalize and capture a VM, then pull the
//! image URI out of the capture result.

use crate::{
    CaptureError, CapturePlan, CaptureRequest, CaptureResult, CaptureStep, ComputeClient,
    ConnectionDescriptor, PendingOperation, Result, VmTarget, WaitPolicy,
};
use serde_json::Value;
use tracing::{debug, info, instrument};

/// Path of the image URI inside the capture result.
const IMAGE_URI_PATH: [PathSegment; 7] = [
    PathSegment::Key("resources"),
    PathSegment::Index(0),
    PathSegment::Key("properties"),
    PathSegment::Key("storageProfile"),
    PathSegment::Key("osDisk"),
    PathSegment::Key("image"),
    PathSegment::Key("uri"),
];

#[derive(Debug, Clone, Copy)]
enum PathSegment {
    Key(&'static str),
    Index(usize),
}

/// Drives one capture through an injected [`ComputeClient`].
///
/// The sequencer owns its client for the duration of a capture and is not
/// meant to be shared between concurrent captures of the same VM.
pub struct ImageCapture {
    client: Box<dyn ComputeClient>,
    plan: CapturePlan,
}

impl ImageCapture {
    /// Creates a sequencer using the default [`CapturePlan`].
    pub fn new(client: Box<dyn ComputeClient>) -> Self {
        Self {
            client,
            plan: CapturePlan::default(),
        }
    }

    /// Replaces the per-step wait policies.
    pub fn with_plan(mut self, plan: CapturePlan) -> Self {
        self.plan = plan;
        self
    }

    /// Authenticates, runs every step of the plan in order and extracts the
    /// image URI from the capture result.
    ///
    /// The capture always overwrites existing VHDs with the same name.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::MissingParameter`]: descriptor lacks the VM, group or container
    /// - [`CaptureError::Authentication`]: no token could be obtained; nothing was submitted
    /// - [`CaptureError::RemoteOperation`]: a step failed; later steps were not attempted
    /// - [`CaptureError::Extraction`]: the capture result has no image URI
    #[instrument(skip_all, fields(provider = self.client.name()))]
    pub async fn capture_image(&mut self, descriptor: &ConnectionDescriptor) -> Result<CaptureResult> {
        let target = VmTarget::from_descriptor(descriptor)?;
        let request = CaptureRequest::from_descriptor(descriptor, true)?;

        self.client.authenticate().await.map_err(|e| match e {
            CaptureError::Authentication(_) => e,
            other => CaptureError::Authentication(other.to_string()),
        })?;
        debug!("authenticated against the management endpoint");

        let mut payload = None;
        for (step, policy) in self.plan.stages() {
            info!(%step, vm = %target.vm_name, group = %target.resource_group, "submitting");
            let operation = self
                .submit(step, &target, &request)
                .await
                .map_err(|e| CaptureError::remote(step, e))?;

            let output = match policy {
                WaitPolicy::Wait => {
                    let output = self
                        .client
                        .wait(operation)
                        .await
                        .map_err(|e| CaptureError::remote(step, e))?;
                    info!(%step, "completed");
                    output
                }
                WaitPolicy::NoWait => {
                    debug!(%step, "not waiting for completion");
                    operation.body
                }
            };

            if step == CaptureStep::Capture {
                payload = output;
            }
        }

        let payload = payload
            .ok_or_else(|| CaptureError::Extraction("capture returned no result".to_string()))?;
        let vhd_uri = extract_image_uri(&payload)?;
        info!(%vhd_uri, "image captured");

        Ok(CaptureResult { vhd_uri })
    }

    async fn submit(
        &self,
        step: CaptureStep,
        target: &VmTarget,
        request: &CaptureRequest,
    ) -> Result<PendingOperation> {
        match step {
            CaptureStep::Deallocate => self.client.deallocate(target).await,
            CaptureStep::Generalize => self.client.generalize(target).await,
            CaptureStep::Capture => self.client.capture(target, request).await,
        }
    }
}

/// Extracts `resources[0].properties.storageProfile.osDisk.image.uri` from a
/// capture result.
///
/// # Errors
///
/// Returns [`CaptureError::Extraction`] naming the first segment of the path
/// that is missing or has the wrong type.
///
/// # Example
///
/// ```
/// use azure_image_capture::capture::extract_image_uri;
/// use serde_json::json;
///
/// let result = json!({
///     "resources": [{
///         "properties": { "storageProfile": { "osDisk": { "image": { "uri": "http://example/img.vhd" } } } }
///     }]
/// });
/// assert_eq!(extract_image_uri(&result).unwrap(), "http://example/img.vhd");
///
/// assert!(extract_image_uri(&json!({ "resources": [] })).is_err());
/// ```
pub fn extract_image_uri(result: &Value) -> Result<String> {
    let mut current = result;
    let mut walked = String::new();

    for segment in IMAGE_URI_PATH {
        let next = match segment {
            PathSegment::Key(key) => {
                if !walked.is_empty() {
                    walked.push('.');
                }
                walked.push_str(key);
                current.get(key)
            }
            PathSegment::Index(index) => {
                walked.push_str(&format!("[{}]", index));
                current.as_array().and_then(|items| items.get(index))
            }
        };

        current = next.ok_or_else(|| CaptureError::Extraction(format!("missing {}", walked)))?;
    }

    match current.as_str() {
        Some(uri) if !uri.is_empty() => Ok(uri.to_string()),
        Some(_) => Err(CaptureError::Extraction(format!("{} is empty", walked))),
        None => Err(CaptureError::Extraction(format!("{} is not a string", walked))),
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::backends::mock::{capture_output, MockCall, MockComputeClient};
    use assert_matches::assert_matches;
    use serde_json::json;

    fn descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor {
            subscription_id: Some("00000000-0000-0000-0000-000000000000".to_string()),
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            client_secret: Some("secret".to_string()),
            resource_group_name: Some("dev-ops-cle".to_string()),
            vm_name: Some("MyUbuntuVM".to_string()),
            destination_container: Some("copiedvhds".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_returns_uri_from_payload() {
        let client = MockComputeClient::new()
            .with_capture_payload(capture_output("http://example/img.vhd"));

        let mut capture = ImageCapture::new(Box::new(client));
        let result = capture.capture_image(&descriptor()).await.unwrap();

        assert_eq!(result.vhd_uri, "http://example/img.vhd");
    }

    #[tokio::test]
    async fn test_call_order_and_wait_policy() {
        let client = MockComputeClient::new();
        let calls = client.calls();

        let mut capture = ImageCapture::new(Box::new(client));
        capture.capture_image(&descriptor()).await.unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                MockCall::Authenticate,
                MockCall::Submit(CaptureStep::Deallocate),
                MockCall::Wait(CaptureStep::Deallocate),
                MockCall::Submit(CaptureStep::Generalize),
                MockCall::Submit(CaptureStep::Capture),
                MockCall::Wait(CaptureStep::Capture),
            ]
        );
    }

    #[tokio::test]
    async fn test_plan_can_wait_on_generalize() {
        let client = MockComputeClient::new();
        let calls = client.calls();

        let plan = CapturePlan::default().with_policy(CaptureStep::Generalize, WaitPolicy::Wait);
        let mut capture = ImageCapture::new(Box::new(client)).with_plan(plan);
        capture.capture_image(&descriptor()).await.unwrap();

        assert!(calls
            .lock()
            .unwrap()
            .contains(&MockCall::Wait(CaptureStep::Generalize)));
    }

    #[tokio::test]
    async fn test_missing_storage_profile_is_extraction_error() {
        let client = MockComputeClient::new().with_capture_payload(json!({
            "resources": [{ "properties": { "hardwareProfile": {} } }]
        }));

        let mut capture = ImageCapture::new(Box::new(client));
        let err = capture.capture_image(&descriptor()).await.unwrap_err();

        assert_matches!(err, CaptureError::Extraction(ref msg) if msg.contains("storageProfile"));
    }

    #[tokio::test]
    async fn test_generalize_failure_stops_sequence() {
        let mut client = MockComputeClient::new();
        client.generalize_error = Some(CaptureError::Http {
            status: 409,
            code: Some("OperationNotAllowed".to_string()),
            message: "VM must be deallocated".to_string(),
        });
        let calls = client.calls();

        let mut capture = ImageCapture::new(Box::new(client));
        let err = capture.capture_image(&descriptor()).await.unwrap_err();

        assert_eq!(err.step(), Some(CaptureStep::Generalize));
        assert_matches!(
            err,
            CaptureError::RemoteOperation { ref source, .. }
                if matches!(**source, CaptureError::Http { status: 409, .. })
        );
        let calls = calls.lock().unwrap();
        assert!(!calls.contains(&MockCall::Submit(CaptureStep::Capture)));
    }

    #[tokio::test]
    async fn test_wait_failure_names_step() {
        let mut client = MockComputeClient::new();
        client.wait_error = Some(CaptureError::OperationFailed {
            status: "Failed".to_string(),
            message: "disk busy".to_string(),
        });

        let mut capture = ImageCapture::new(Box::new(client));
        let err = capture.capture_image(&descriptor()).await.unwrap_err();

        assert_eq!(err.step(), Some(CaptureStep::Deallocate));
        assert!(err.to_string().contains("disk busy"));
    }

    #[tokio::test]
    async fn test_authentication_failure_submits_nothing() {
        let mut client = MockComputeClient::new();
        client.auth_error = Some(CaptureError::Authentication("invalid client secret".to_string()));
        let calls = client.calls();

        let mut capture = ImageCapture::new(Box::new(client));
        let err = capture.capture_image(&descriptor()).await.unwrap_err();

        assert_eq!(err.to_string(), "authentication failed: invalid client secret");
        assert_eq!(*calls.lock().unwrap(), vec![MockCall::Authenticate]);
    }

    #[test]
    fn test_extraction_messages() {
        assert_matches!(
            extract_image_uri(&json!({})),
            Err(CaptureError::Extraction(msg)) if msg == "missing resources"
        );
        assert_matches!(
            extract_image_uri(&json!({ "resources": [] })),
            Err(CaptureError::Extraction(msg)) if msg == "missing resources[0]"
        );
        assert_matches!(
            extract_image_uri(&capture_output("")),
            Err(CaptureError::Extraction(msg)) if msg.ends_with("is empty")
        );

        let mut numeric = capture_output("x");
        numeric["resources"][0]["properties"]["storageProfile"]["osDisk"]["image"]["uri"] = json!(7);
        assert_matches!(
            extract_image_uri(&numeric),
            Err(CaptureError::Extraction(msg)) if msg.ends_with("is not a string")
        );
    }
}

//! Ansible module surface.
//!
//! Turns module parameters into a capture and the outcome into the result
//! object the automation host expects.

use crate::{
    config, factory, ComputeClient, ComputeProvider, ConnectionDescriptor, Environment,
    ImageCapture, ModuleParams, Result,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

/// Result object printed for the automation host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleResponse {
    /// Whether the module changed anything
    pub changed: bool,

    /// Set on failure only
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,

    /// Human readable outcome
    pub msg: String,

    /// URI of the captured VHD, on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vhd_uri: Option<String>,
}

impl ModuleResponse {
    /// A successful capture into `container`.
    pub fn captured(container: &str, vhd_uri: String) -> Self {
        Self {
            changed: true,
            failed: false,
            msg: format!("Successfully captured image to container:{}", container),
            vhd_uri: Some(vhd_uri),
        }
    }

    /// A failed run.
    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            changed: false,
            failed: true,
            msg: msg.into(),
            vhd_uri: None,
        }
    }

    /// Renders the response as the single JSON line printed on stdout.
    ///
    /// Always produces valid JSON, falling back to a failure object if the
    /// response itself cannot be serialized.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            json!({
                "changed": false,
                "failed": true,
                "msg": format!("failed to serialize module result: {}", e),
            })
            .to_string()
        })
    }
}

/// Runs the module against `provider`.
///
/// The provider is checked before any configuration is looked at; then the
/// parameters are resolved against `env`, validated, and the capture is
/// executed. Every error ends up as a failure response.
///
/// [`crate::init`] must have been called.
pub async fn run(provider: ComputeProvider, params: &ModuleParams, env: &Environment) -> ModuleResponse {
    let outcome = match factory::ensure_available(provider) {
        Ok(()) => execute(params, env, |descriptor| factory::new_client(provider, descriptor)).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(response) => response,
        Err(e) => {
            error!("{}", e);
            ModuleResponse::failure(e.to_string())
        }
    }
}

/// Resolves and validates the parameters, then captures with the client
/// built by `connect`. `connect` is only called once validation passed.
async fn execute<F>(params: &ModuleParams, env: &Environment, connect: F) -> Result<ModuleResponse>
where
    F: FnOnce(&ConnectionDescriptor) -> Result<Box<dyn ComputeClient>>,
{
    let descriptor = config::resolve(params, env);
    debug!(?descriptor, wait = params.wait, "resolved parameters");
    config::validate(&descriptor)?;

    let client = connect(&descriptor)?;
    let result = ImageCapture::new(client).capture_image(&descriptor).await?;

    let container = descriptor.destination_container.as_deref().unwrap_or_default();
    Ok(ModuleResponse::captured(container, result.vhd_uri))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn params() -> ModuleParams {
        ModuleParams {
            subscription_id: Some("00000000-0000-0000-0000-000000000000".to_string()),
            client_id: Some("client".to_string()),
            tenant_id: Some("tenant".to_string()),
            client_secret: Some("secret".to_string()),
            resource_group_name: Some("dev-ops-cle".to_string()),
            vm_name: Some("MyUbuntuVM".to_string()),
            destination_container: Some("copiedvhds".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_response_serialization() {
        let ok = ModuleResponse::captured("copiedvhds", "http://example/img.vhd".to_string());
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({
                "changed": true,
                "msg": "Successfully captured image to container:copiedvhds",
                "vhd_uri": "http://example/img.vhd"
            })
        );

        let failed = ModuleResponse::failure("boom");
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({ "changed": false, "failed": true, "msg": "boom" })
        );
    }

    #[test]
    fn test_json_output_escapes_message() {
        let failed = ModuleResponse::failure(r#"request failed with status code: 400 and message: "vmName" is "bad\path""#);
        let rendered: Value = serde_json::from_str(&failed.to_json()).unwrap();

        assert_eq!(rendered["failed"], true);
        assert_eq!(rendered["msg"], failed.msg.as_str());
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_run_with_mock() {
        crate::init();

        let response = run(ComputeProvider::Mock, &params(), &Environment::default()).await;

        assert!(response.changed);
        assert!(!response.failed);
        assert_eq!(response.msg, "Successfully captured image to container:copiedvhds");
        assert!(response.vhd_uri.unwrap().ends_with(".vhd"));
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_missing_secret_fails_before_capture() {
        crate::init();

        let mut params = params();
        params.client_secret = None;

        let response = run(ComputeProvider::Mock, &params, &Environment::default()).await;

        assert!(response.failed);
        assert!(!response.changed);
        assert!(response.msg.contains("missing: client_secret"));
        assert_eq!(response.vhd_uri, None);
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_missing_secret_never_reaches_client() {
        use crate::backends::mock::MockComputeClient;
        use crate::CaptureError;

        let mut params = params();
        params.client_secret = None;

        let client = MockComputeClient::new();
        let calls = client.calls();
        let mut connected = false;

        let result = execute(&params, &Environment::default(), |_| {
            connected = true;
            Ok(Box::new(client) as Box<dyn ComputeClient>)
        })
        .await;

        assert!(matches!(
            result,
            Err(CaptureError::MissingCredentials(ref missing)) if missing == &vec!["client_secret"]
        ));
        assert!(!connected);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_execute_runs_full_sequence() {
        use crate::backends::mock::{MockCall, MockComputeClient};

        let client = MockComputeClient::new();
        let calls = client.calls();

        let response = execute(&params(), &Environment::default(), |_| {
            Ok(Box::new(client) as Box<dyn ComputeClient>)
        })
        .await
        .unwrap();

        assert!(response.changed);
        assert_eq!(calls.lock().unwrap().first(), Some(&MockCall::Authenticate));
        assert_eq!(calls.lock().unwrap().len(), 6);
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_secret_from_environment() {
        crate::init();

        let mut params = params();
        params.client_secret = None;
        let env = Environment::from_pairs([("AZURE_CLIENT_SECRET", "from-env")]);

        let response = run(ComputeProvider::Mock, &params, &env).await;
        assert!(!response.failed, "{}", response.msg);
    }
}

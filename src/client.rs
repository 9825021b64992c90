//! Compute client trait definition.
//!
//! This module defines the [`ComputeClient`] trait that every compute
//! provider implements. The sequencer only talks to this trait, so the
//! provider that actually reaches the cloud is chosen by the host wiring.

use crate::{CaptureRequest, PendingOperation, Result, VmTarget};
use async_trait::async_trait;
use serde_json::Value;

/// ComputeClient issues virtual machine operations against a compute API.
///
/// All implementations must be `Send + Sync`.
///
/// # Implementations
///
/// - **Azure**: Resource Manager REST API with a service principal token
/// - **Testing**: Mock client with per-step error injection
///
/// # Example
///
/// ```no_run
/// use azure_image_capture::{factory, ComputeProvider, ConnectionDescriptor, VmTarget};
///
/// #[tokio::main]
/// async fn main() -> azure_image_capture::Result<()> {
///     azure_image_capture::init();
///
///     let descriptor = ConnectionDescriptor::default();
///     let mut client = factory::new_client(ComputeProvider::Azure, &descriptor)?;
///
///     client.authenticate().await?;
///     let target = VmTarget::new("dev-ops-cle", "MyUbuntuVM");
///     let op = client.deallocate(&target).await?;
///     client.wait(op).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ComputeClient: Send + Sync {
    /// Returns the provider name (e.g., "azure", "mock").
    fn name(&self) -> &str;

    /// Obtains credentials for the management endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Authentication`](crate::CaptureError::Authentication)
    /// if no token could be obtained.
    async fn authenticate(&mut self) -> Result<()>;

    /// Submits a deallocate request for the VM.
    async fn deallocate(&self, target: &VmTarget) -> Result<PendingOperation>;

    /// Submits a generalize request for the VM.
    async fn generalize(&self, target: &VmTarget) -> Result<PendingOperation>;

    /// Submits a capture request for the VM.
    async fn capture(&self, target: &VmTarget, request: &CaptureRequest)
        -> Result<PendingOperation>;

    /// Blocks until a submitted operation completes and returns its result
    /// payload, if the operation produces one.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::OperationFailed`](crate::CaptureError::OperationFailed):
    ///   the service reported a terminal failure
    /// - [`CaptureError::Timeout`](crate::CaptureError::Timeout):
    ///   the operation did not finish in time
    async fn wait(&self, operation: PendingOperation) -> Result<Option<Value>>;
}

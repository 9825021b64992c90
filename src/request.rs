//! Data structures exchanged with a compute client during a capture.

use crate::config::{require, ConnectionDescriptor, DEFAULT_VHD_PREFIX};
use crate::step::CaptureStep;
use crate::Result;
use serde::Serialize;
use serde_json::Value;

/// The virtual machine a capture operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmTarget {
    /// Resource group holding the VM
    pub resource_group: String,
    /// VM name
    pub vm_name: String,
}

impl VmTarget {
    /// Creates a target from explicit names.
    pub fn new(resource_group: impl Into<String>, vm_name: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            vm_name: vm_name.into(),
        }
    }

    /// Builds the target from a resolved descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::MissingParameter`](crate::CaptureError::MissingParameter)
    /// if the resource group or VM name is absent.
    pub fn from_descriptor(descriptor: &ConnectionDescriptor) -> Result<Self> {
        Ok(Self::new(
            require("resource_group_name", &descriptor.resource_group_name)?,
            require("vm_name", &descriptor.vm_name)?,
        ))
    }
}

/// Parameters of the capture call.
///
/// Serializes to the body the compute API expects:
///
/// ```
/// use azure_image_capture::CaptureRequest;
///
/// let request = CaptureRequest::new("MyUbuntuVM", "copiedvhds", "vm-osdisk", true);
/// let body = serde_json::to_value(&request).unwrap();
///
/// assert_eq!(body["destinationContainerName"], "copiedvhds");
/// assert_eq!(body["vhdPrefix"], "vm-osdisk");
/// assert_eq!(body["overwriteVhds"], true);
/// assert!(body.get("vmName").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    /// VM being captured; part of the URL, not the body
    #[serde(skip)]
    pub vm_name: String,

    /// Container receiving the VHD
    pub destination_container_name: String,

    /// Prefix of the VHD blob name
    pub vhd_prefix: String,

    /// Replace VHDs that already exist under the same name
    #[serde(rename = "overwriteVhds")]
    pub overwrite: bool,
}

impl CaptureRequest {
    /// Creates a capture request.
    pub fn new(
        vm_name: impl Into<String>,
        destination_container_name: impl Into<String>,
        vhd_prefix: impl Into<String>,
        overwrite: bool,
    ) -> Self {
        Self {
            vm_name: vm_name.into(),
            destination_container_name: destination_container_name.into(),
            vhd_prefix: vhd_prefix.into(),
            overwrite,
        }
    }

    /// Builds the request from a resolved descriptor.
    ///
    /// Falls back to [`DEFAULT_VHD_PREFIX`] when no prefix was resolved.
    pub fn from_descriptor(descriptor: &ConnectionDescriptor, overwrite: bool) -> Result<Self> {
        Ok(Self::new(
            require("vm_name", &descriptor.vm_name)?,
            require("destination_container", &descriptor.destination_container)?,
            descriptor
                .vhd_prefix
                .as_deref()
                .unwrap_or(DEFAULT_VHD_PREFIX),
            overwrite,
        ))
    }
}

/// Outcome of a successful capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureResult {
    /// URI of the captured VHD blob
    pub vhd_uri: String,
}

/// Handle to a remote operation that was accepted by the service.
///
/// Long-running operations expose a status URL (`Azure-AsyncOperation`)
/// and/or a result URL (`Location`). An operation with neither has already
/// completed and carries its result in `body`, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    /// Step that produced this operation
    pub step: CaptureStep,
    /// Status monitor URL
    pub async_operation_url: Option<String>,
    /// Final result URL
    pub location_url: Option<String>,
    /// Body of the submit response
    pub body: Option<Value>,
}

impl PendingOperation {
    /// An operation that completed synchronously.
    pub fn completed(step: CaptureStep, body: Option<Value>) -> Self {
        Self {
            step,
            async_operation_url: None,
            location_url: None,
            body,
        }
    }

    /// Returns `true` if the service gave a URL to track completion.
    pub fn is_tracked(&self) -> bool {
        self.async_operation_url.is_some() || self.location_url.is_some()
    }
}

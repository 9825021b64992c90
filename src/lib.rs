//! azure-image-capture - Capture an Azure virtual machine into a VHD image.
//!
//! The crate drives the three compute operations needed to turn a running VM
//! into a reusable image: it deallocates the VM, marks it generalized and
//! captures its OS disk into a storage container. The URI of the resulting
//! VHD is pulled out of the capture result.
//!
//! It ships as a library and as an Ansible binary module
//! (`azure_image_capture`) that reads its arguments from a JSON file and
//! prints a JSON result.
//!
//! # Features
//!
//! - **Environment fallbacks**: Every parameter can come from the module
//!   arguments or from a fixed environment variable
//! - **Long-running operations**: Deallocate and capture are polled until
//!   the service reports completion
//! - **Step-aware errors**: A failed capture tells which step broke
//! - **Pluggable clients**: The sequencer talks to a [`ComputeClient`] trait,
//!   with an Azure and an in-memory implementation
//!
//! # Quick Start
//!
//! ```no_run
//! use azure_image_capture::{config, factory, ComputeProvider, Environment, ImageCapture, ModuleParams};
//!
//! #[tokio::main]
//! async fn main() -> azure_image_capture::Result<()> {
//!     azure_image_capture::init();
//!
//!     let params = ModuleParams {
//!         resource_group_name: Some("dev-ops-cle".to_string()),
//!         vm_name: Some("MyUbuntuVM".to_string()),
//!         destination_container: Some("copiedvhds".to_string()),
//!         ..Default::default()
//!     };
//!
//!     // Credentials and subscription come from AZURE_* variables
//!     let descriptor = config::resolve(&params, &Environment::from_process());
//!     config::validate(&descriptor)?;
//!
//!     let client = factory::new_client(ComputeProvider::Azure, &descriptor)?;
//!     let result = ImageCapture::new(client).capture_image(&descriptor).await?;
//!     println!("captured {}", result.vhd_uri);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! | Provider | Feature Flag | Notes |
//! |----------|-------------|-------|
//! | Azure | `azure` (default) | Resource Manager REST API |
//! | Mock | `mock` (default) | In-memory testing client |

pub mod backends;
pub mod capture;
pub mod client;
pub mod config;
pub mod error;
pub mod factory;
pub mod module;
pub mod request;
pub mod step;
pub mod validation;

pub use capture::ImageCapture;
pub use client::ComputeClient;
pub use config::{ComputeProvider, ConnectionDescriptor, Environment, ModuleParams};
pub use error::{CaptureError, Result};
pub use module::ModuleResponse;
pub use request::{CaptureRequest, CaptureResult, PendingOperation, VmTarget};
pub use step::{CapturePlan, CaptureStep, WaitPolicy};

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the library.
///
/// This registers all compiled compute clients with the factory. It is
/// idempotent and must run before [`factory::new_client`] or
/// [`module::run`] are used.
pub fn init() {
    INIT.call_once(backends::register_all);
}

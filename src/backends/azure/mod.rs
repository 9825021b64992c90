//! Azure Resource Manager compute client.
//!
//! Talks to the management REST API directly with `reqwest`. Tokens are
//! obtained for a service principal through `azure_identity`.
//!
//! # Authentication
//!
//! The client needs a service principal:
//! - `client_id` / `AZURE_CLIENT_ID`
//! - `client_secret` / `AZURE_CLIENT_SECRET`
//! - `tenant_id` / `AZURE_TENANT_ID` (or `AZURE_DOMAIN`)
//!
//! # Configuration
//!
//! - `azure_url`: management endpoint, defaults to `https://management.azure.com`
//! - [`AzureOptions`]: API version, polling interval and wait timeout
//!
//! # Example
//!
//! ```no_run
//! use azure_image_capture::backends::azure::{AzureComputeClient, AzureOptions};
//! use azure_image_capture::{ConnectionDescriptor, ImageCapture};
//!
//! # async fn run(descriptor: ConnectionDescriptor) -> azure_image_capture::Result<()> {
//! let client = AzureComputeClient::new(&descriptor, AzureOptions::default())?;
//! let result = ImageCapture::new(Box::new(client))
//!     .capture_image(&descriptor)
//!     .await?;
//! println!("{}", result.vhd_uri);
//! # Ok(())
//! # }
//! ```

mod client;
mod credential;
mod options;
mod session;

pub use client::{AzureComputeClient, USER_AGENT};
pub use credential::{ServicePrincipalTokenProvider, StaticTokenProvider, TokenProvider};
pub use options::{AzureOptions, COMPUTE_API_VERSION, DEFAULT_AUTHORITY_HOST, DEFAULT_MANAGEMENT_ENDPOINT};
pub use session::ManagementSession;

use crate::factory;

/// Registers the Azure compute client with the factory.
pub fn register() {
    factory::register_client("azure", |descriptor| {
        Ok(Box::new(AzureComputeClient::new(
            descriptor,
            AzureOptions::default(),
        )?))
    });
}

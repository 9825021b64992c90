//! Tunables of the Azure compute client.

use std::time::Duration;

/// Public cloud management endpoint.
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Public cloud Active Directory authority.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Compute API version used for virtual machine actions.
pub const COMPUTE_API_VERSION: &str = "2017-03-30";

/// Options for [`AzureComputeClient`](super::AzureComputeClient).
///
/// ```
/// use azure_image_capture::backends::azure::AzureOptions;
/// use std::time::Duration;
///
/// let options = AzureOptions::default()
///     .with_poll_interval(Duration::from_secs(10))
///     .with_operation_timeout(Duration::from_secs(30 * 60));
/// assert_eq!(options.poll_interval, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct AzureOptions {
    /// `api-version` query parameter
    pub api_version: String,

    /// Delay between status polls when the service sends no `Retry-After`
    pub poll_interval: Duration,

    /// Upper bound on a single wait
    pub operation_timeout: Duration,

    /// Active Directory authority used for service principal tokens
    pub authority_host: String,
}

impl Default for AzureOptions {
    fn default() -> Self {
        Self {
            api_version: COMPUTE_API_VERSION.to_string(),
            poll_interval: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(3600), // 1 hour
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
        }
    }
}

impl AzureOptions {
    /// Sets the compute API version.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Sets the fallback delay between status polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets how long a single wait may take before giving up.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the Active Directory authority (sovereign clouds).
    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into();
        self
    }
}

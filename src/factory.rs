//! Compute client factory and registration system.

use crate::{CaptureError, ComputeClient, ComputeProvider, ConnectionDescriptor, Result};
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

/// Factory function type for creating compute clients.
pub type ClientFactory = fn(&ConnectionDescriptor) -> Result<Box<dyn ComputeClient>>;

static CLIENT_REGISTRY: OnceLock<RwLock<HashMap<String, ClientFactory>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, ClientFactory>> {
    CLIENT_REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers a compute client factory function.
///
/// This is called from provider modules' `register()` functions during
/// library initialization.
pub fn register_client(provider: &str, factory: ClientFactory) {
    let mut reg = registry().write().unwrap_or_else(|e| e.into_inner());
    reg.insert(provider.to_string(), factory);
}

/// Returns `true` if a client for `provider` was compiled in and registered.
pub fn is_available(provider: ComputeProvider) -> bool {
    let reg = registry().read().unwrap_or_else(|e| e.into_inner());
    reg.contains_key(&provider.to_string())
}

/// Checks that a provider is available, before any configuration is used.
///
/// # Errors
///
/// Returns [`CaptureError::MissingDependency`] with a hint to check feature
/// flags if the provider is not registered.
pub fn ensure_available(provider: ComputeProvider) -> Result<()> {
    if is_available(provider) {
        Ok(())
    } else {
        Err(missing(provider))
    }
}

/// Creates a compute client for the provider from a resolved descriptor.
///
/// # Errors
///
/// Returns an error if:
/// - Provider is not registered (missing feature flag or `init()` call)
/// - Provider factory rejects the descriptor
///
/// # Example
///
/// ```no_run
/// use azure_image_capture::{factory, ComputeProvider, ConnectionDescriptor};
///
/// azure_image_capture::init();
/// let descriptor = ConnectionDescriptor::default();
/// let client = factory::new_client(ComputeProvider::Mock, &descriptor)?;
/// assert_eq!(client.name(), "mock");
/// # Ok::<(), azure_image_capture::CaptureError>(())
/// ```
pub fn new_client(
    provider: ComputeProvider,
    descriptor: &ConnectionDescriptor,
) -> Result<Box<dyn ComputeClient>> {
    let factory = {
        let reg = registry().read().unwrap_or_else(|e| e.into_inner());
        *reg.get(&provider.to_string()).ok_or_else(|| missing(provider))?
    };

    factory(descriptor)
}

fn missing(provider: ComputeProvider) -> CaptureError {
    CaptureError::MissingDependency(format!(
        "no {} compute client in this build (did you enable the '{}' feature flag?)",
        provider, provider
    ))
}

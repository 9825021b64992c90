//! Compute client implementations.

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "azure")]
pub mod azure;

/// Registers all compiled clients with the factory.
///
/// Called from [`crate::init`].
pub fn register_all() {
    #[cfg(feature = "mock")]
    mock::register();

    #[cfg(feature = "azure")]
    azure::register();
}

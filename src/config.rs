//! Configuration resolution: module parameters with environment fallbacks.
//!
//! Every connection field is taken from the explicit module parameter when it
//! is present and non-empty, otherwise from a fixed environment variable, and
//! is left `None` when neither is set.

use crate::validation::{validate_container_name, validate_endpoint, validate_path_segment};
use crate::{CaptureError, Result};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::warn;

/// Environment variable for the management endpoint.
pub const ENV_AZURE_URL: &str = "AZURE_URL";
/// Environment variable for the VHD name prefix.
pub const ENV_VHD_PREFIX: &str = "VHD_PREFIX";
/// Environment variable for the subscription id.
pub const ENV_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
/// Environment variable for the resource group name.
pub const ENV_RESOURCE_GROUP_NAME: &str = "AZURE_RESOURCE_GROUP_NAME";
/// Environment variable for the VM name.
pub const ENV_VM_NAME: &str = "VM_NAME";
/// Environment variable for the destination container.
pub const ENV_DESTINATION_CONTAINER: &str = "DESTINATION_CONTAINER";
/// Environment variables for the tenant id, in lookup order.
pub const ENV_TENANT_ID: [&str; 2] = ["AZURE_TENANT_ID", "AZURE_DOMAIN"];
/// Environment variable for the service principal client id.
pub const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
/// Environment variable for the service principal secret.
pub const ENV_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";

/// VHD prefix used when neither the parameter nor `VHD_PREFIX` is set.
pub const DEFAULT_VHD_PREFIX: &str = "vm-osdisk";

/// Compute provider identifier.
///
/// Each variant corresponds to a client implementation registered with the
/// factory. Providers must be enabled via Cargo feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeProvider {
    /// Azure Resource Manager REST API
    Azure,
    /// In-memory client for tests
    Mock,
}

impl fmt::Display for ComputeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Azure => write!(f, "azure"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

/// Parameters handed over by the automation host.
///
/// Unknown keys (Ansible adds `_ansible_*` entries) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleParams {
    /// Azure subscription holding the VM
    pub subscription_id: Option<String>,
    /// Azure Active Directory tenant
    pub tenant_id: Option<String>,
    /// Service principal application id
    pub client_id: Option<String>,
    /// Service principal secret
    pub client_secret: Option<String>,
    /// Resource group holding the VM
    pub resource_group_name: Option<String>,
    /// VM to capture
    pub vm_name: Option<String>,
    /// Container receiving the captured VHD
    pub destination_container: Option<String>,
    /// Prefix of the captured VHD blob name
    pub vhd_prefix: Option<String>,
    /// Management endpoint override
    pub azure_url: Option<String>,
    /// Accepted for compatibility; deallocate and capture are always waited on.
    #[serde(default = "default_wait", deserialize_with = "deserialize_flag")]
    pub wait: bool,
}

fn default_wait() -> bool {
    true
}

/// Reads a boolean the way Ansible renders them: a JSON bool, a number, or
/// one of `yes/no/true/false/on/off/1/0` in any case.
///
/// `null` and unrecognized values fall back to the default.
fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Number(i64),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        None => default_wait(),
        Some(Flag::Bool(value)) => value,
        Some(Flag::Number(value)) => value != 0,
        Some(Flag::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "on" | "1" => true,
            "no" | "n" | "false" | "off" | "0" => false,
            other => {
                warn!(value = other, "unrecognized boolean, using default");
                default_wait()
            }
        },
    })
}

impl Default for ModuleParams {
    fn default() -> Self {
        Self {
            subscription_id: None,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            resource_group_name: None,
            vm_name: None,
            destination_container: None,
            vhd_prefix: None,
            azure_url: None,
            wait: default_wait(),
        }
    }
}

impl ModuleParams {
    /// Reads the JSON arguments file Ansible passes to binary modules.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read(path.as_ref()).await?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// Snapshot of the process environment.
///
/// Resolution only ever reads from a snapshot, so it stays a pure function of
/// its inputs and tests never touch the real environment.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Captures the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Builds an environment from explicit pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns a variable's value; empty values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Connection details for one capture, resolved from parameters and environment.
///
/// Immutable once built. The `Debug` output never shows the client secret.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Management endpoint override
    pub azure_url: Option<String>,
    /// Azure subscription id
    pub subscription_id: Option<String>,
    /// Azure Active Directory tenant id
    pub tenant_id: Option<String>,
    /// Service principal client id
    pub client_id: Option<String>,
    /// Service principal secret
    pub client_secret: Option<String>,
    /// Resource group holding the VM
    pub resource_group_name: Option<String>,
    /// VM to capture
    pub vm_name: Option<String>,
    /// Container receiving the VHD
    pub destination_container: Option<String>,
    /// Prefix of the VHD blob name
    pub vhd_prefix: Option<String>,
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("azure_url", &self.azure_url)
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "********"),
            )
            .field("resource_group_name", &self.resource_group_name)
            .field("vm_name", &self.vm_name)
            .field("destination_container", &self.destination_container)
            .field("vhd_prefix", &self.vhd_prefix)
            .finish()
    }
}

fn pick(explicit: Option<&String>, env: &Environment, keys: &[&str]) -> Option<String> {
    explicit
        .filter(|v| !v.is_empty())
        .cloned()
        .or_else(|| keys.iter().find_map(|k| env.get(k)).map(str::to_string))
}

/// Resolves the connection descriptor from explicit parameters and an
/// environment snapshot.
///
/// # Example
///
/// ```
/// use azure_image_capture::config::{resolve, Environment, ModuleParams};
///
/// let params = ModuleParams {
///     vm_name: Some("web-01".to_string()),
///     ..Default::default()
/// };
/// let env = Environment::from_pairs([("VM_NAME", "ignored"), ("DESTINATION_CONTAINER", "images")]);
///
/// let descriptor = resolve(&params, &env);
/// assert_eq!(descriptor.vm_name.as_deref(), Some("web-01"));
/// assert_eq!(descriptor.destination_container.as_deref(), Some("images"));
/// assert_eq!(descriptor.client_secret, None);
/// ```
pub fn resolve(explicit: &ModuleParams, env: &Environment) -> ConnectionDescriptor {
    ConnectionDescriptor {
        azure_url: pick(explicit.azure_url.as_ref(), env, &[ENV_AZURE_URL]),
        vhd_prefix: pick(explicit.vhd_prefix.as_ref(), env, &[ENV_VHD_PREFIX]),
        subscription_id: pick(explicit.subscription_id.as_ref(), env, &[ENV_SUBSCRIPTION_ID]),
        resource_group_name: pick(
            explicit.resource_group_name.as_ref(),
            env,
            &[ENV_RESOURCE_GROUP_NAME],
        ),
        vm_name: pick(explicit.vm_name.as_ref(), env, &[ENV_VM_NAME]),
        destination_container: pick(
            explicit.destination_container.as_ref(),
            env,
            &[ENV_DESTINATION_CONTAINER],
        ),
        tenant_id: pick(explicit.tenant_id.as_ref(), env, &ENV_TENANT_ID),
        client_id: pick(explicit.client_id.as_ref(), env, &[ENV_CLIENT_ID]),
        client_secret: pick(explicit.client_secret.as_ref(), env, &[ENV_CLIENT_SECRET]),
    }
}

/// Validates a resolved descriptor before any client is built.
///
/// Credentials are checked first and reported together as
/// [`CaptureError::MissingCredentials`]. The remaining required fields
/// surface as [`CaptureError::MissingParameter`], and names that end up in
/// management URLs are checked for safety.
///
/// # Errors
///
/// - [`CaptureError::MissingCredentials`]: client_id, client_secret or tenant_id absent
/// - [`CaptureError::MissingParameter`]: subscription, resource group, VM or container absent
/// - [`CaptureError::InvalidParameter`]: a present value is unusable
pub fn validate(descriptor: &ConnectionDescriptor) -> Result<()> {
    let missing: Vec<&'static str> = [
        ("client_id", &descriptor.client_id),
        ("client_secret", &descriptor.client_secret),
        ("tenant_id", &descriptor.tenant_id),
    ]
    .into_iter()
    .filter(|(_, value)| value.is_none())
    .map(|(name, _)| name)
    .collect();

    if !missing.is_empty() {
        return Err(CaptureError::MissingCredentials(missing));
    }

    let subscription_id = require("subscription_id", &descriptor.subscription_id)?;
    let resource_group = require("resource_group_name", &descriptor.resource_group_name)?;
    let vm_name = require("vm_name", &descriptor.vm_name)?;
    let container = require("destination_container", &descriptor.destination_container)?;

    validate_path_segment("subscription_id", subscription_id)?;
    validate_path_segment("resource_group_name", resource_group)?;
    validate_path_segment("vm_name", vm_name)?;
    validate_container_name(container)?;

    if let Some(prefix) = &descriptor.vhd_prefix {
        validate_path_segment("vhd_prefix", prefix)?;
    }
    if let Some(url) = &descriptor.azure_url {
        validate_endpoint(url)?;
    }

    Ok(())
}

pub(crate) fn require<'a>(field: &'static str, value: &'a Option<String>) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or(CaptureError::MissingParameter(field))
}

//! Input validation for values interpolated into management API URLs.

use crate::{CaptureError, Result};

/// Characters that would change the meaning of a URL path segment.
const URL_RESERVED_CHARS: &str = "/?#%\\";

/// Maximum allowed length for a resource name segment.
const MAX_SEGMENT_LENGTH: usize = 90;

/// Validates a value that becomes one segment of a management URL path.
///
/// This function rejects:
/// - Empty values
/// - Values longer than 90 characters (the resource group limit)
/// - Control characters
/// - Characters that would escape the segment (`/ ? # % \`)
///
/// # Errors
///
/// Returns [`CaptureError::InvalidParameter`] if validation fails.
///
/// # Example
///
/// ```
/// use azure_image_capture::validation::validate_path_segment;
///
/// assert!(validate_path_segment("vm_name", "MyUbuntuVM").is_ok());
/// assert!(validate_path_segment("resource_group_name", "dev-ops-cle").is_ok());
///
/// assert!(validate_path_segment("vm_name", "").is_err());
/// assert!(validate_path_segment("vm_name", "vm/../../other").is_err());
/// ```
pub fn validate_path_segment(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(invalid(field, "value cannot be empty".to_string()));
    }

    if value.chars().count() > MAX_SEGMENT_LENGTH {
        return Err(invalid(
            field,
            format!("value exceeds maximum length of {} characters", MAX_SEGMENT_LENGTH),
        ));
    }

    if value.chars().any(char::is_control) {
        return Err(invalid(field, "value contains control characters".to_string()));
    }

    if value.chars().any(|c| URL_RESERVED_CHARS.contains(c)) {
        return Err(invalid(
            field,
            format!("value contains reserved characters (not allowed: {})", URL_RESERVED_CHARS),
        ));
    }

    Ok(())
}

/// Validates a blob container name.
///
/// Azure requires 3 to 63 characters made of lowercase letters, digits and
/// single hyphens, starting and ending with a letter or digit.
pub fn validate_container_name(name: &str) -> Result<()> {
    const FIELD: &str = "destination_container";

    if !(3..=63).contains(&name.len()) {
        return Err(invalid(FIELD, "name must be 3 to 63 characters long".to_string()));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            FIELD,
            "name may only contain lowercase letters, digits and hyphens".to_string(),
        ));
    }

    if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
        return Err(invalid(
            FIELD,
            "hyphens must be single and surrounded by letters or digits".to_string(),
        ));
    }

    Ok(())
}

/// Validates the management endpoint override.
pub fn validate_endpoint(url: &str) -> Result<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| invalid("azure_url", "must start with http:// or https://".to_string()))?;

    if rest.trim_end_matches('/').is_empty() || rest.chars().any(char::is_whitespace) {
        return Err(invalid("azure_url", "must name a host".to_string()));
    }

    Ok(())
}

fn invalid(field: &'static str, reason: String) -> CaptureError {
    CaptureError::InvalidParameter { field, reason }
}

//! Management endpoint session.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Tokens are considered expired this long before their actual expiry.
const EXPIRY_SKEW_SECS: i64 = 120;

/// Bearer token for the management endpoint.
///
/// The token is never shown by `Debug`.
#[derive(Clone)]
pub struct ManagementSession {
    token: String,
    expires_at: DateTime<Utc>,
}

impl ManagementSession {
    /// Creates a new session.
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Gets the bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// When the token expires.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Checks if the token can still be sent.
    pub fn is_valid(&self) -> bool {
        Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS) < self.expires_at
    }
}

impl fmt::Debug for ManagementSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagementSession")
            .field("token", &"********")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

//! Token acquisition for the management endpoint.

use super::session::ManagementSession;
use crate::{CaptureError, Result};
use async_trait::async_trait;
use azure_core::auth::TokenCredential;
use azure_identity::ClientSecretCredential;
use chrono::{DateTime, Duration, Utc};

/// Source of bearer tokens for the management endpoint.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetches a token for `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Authentication`] if no token could be issued.
    async fn fetch_token(&self, scope: &str) -> Result<ManagementSession>;
}

/// Service principal credentials exchanged with Azure Active Directory.
pub struct ServicePrincipalTokenProvider {
    credential: ClientSecretCredential,
}

impl ServicePrincipalTokenProvider {
    /// Creates a provider for a client id/secret pair in a tenant.
    pub fn new(
        authority_host: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self> {
        let authority = azure_core::Url::parse(authority_host).map_err(|e| {
            CaptureError::InvalidParameter {
                field: "authority_host",
                reason: e.to_string(),
            }
        })?;

        let credential = ClientSecretCredential::new(
            azure_core::new_http_client(),
            authority,
            tenant_id.to_string(),
            client_id.to_string(),
            client_secret.to_string(),
        );

        Ok(Self { credential })
    }
}

#[async_trait]
impl TokenProvider for ServicePrincipalTokenProvider {
    async fn fetch_token(&self, scope: &str) -> Result<ManagementSession> {
        let token = self
            .credential
            .get_token(&[scope])
            .await
            .map_err(|e| CaptureError::Authentication(e.to_string()))?;

        // Azure uses time::OffsetDateTime
        let expires_at = DateTime::from_timestamp(token.expires_on.unix_timestamp(), 0)
            .unwrap_or_else(Utc::now);

        Ok(ManagementSession::new(token.token.secret(), expires_at))
    }
}

/// A token obtained out of band (e.g. `az account get-access-token`).
///
/// The token is handed out as-is and reported valid for one more hour on
/// every fetch.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Wraps an existing bearer token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch_token(&self, _scope: &str) -> Result<ManagementSession> {
        if self.token.is_empty() {
            return Err(CaptureError::Authentication("empty bearer token".to_string()));
        }
        Ok(ManagementSession::new(
            self.token.clone(),
            Utc::now() + Duration::hours(1),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_static_token() {
        let provider = StaticTokenProvider::new("bearer-123");
        let session = provider
            .fetch_token("https://management.azure.com/.default")
            .await
            .unwrap();

        assert_eq!(session.token(), "bearer-123");
        assert!(session.is_valid());
    }

    #[tokio::test]
    async fn test_empty_static_token() {
        let provider = StaticTokenProvider::new("");
        assert_matches!(
            provider.fetch_token("scope").await,
            Err(CaptureError::Authentication(_))
        );
    }

    #[test]
    fn test_bad_authority_host() {
        let result = ServicePrincipalTokenProvider::new("not a url", "tenant", "client", "secret");
        assert!(matches!(
            result,
            Err(CaptureError::InvalidParameter { field: "authority_host", .. })
        ));
    }
}

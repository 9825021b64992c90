//! Azure Resource Manager compute client.

use super::credential::{ServicePrincipalTokenProvider, TokenProvider};
use super::options::{AzureOptions, DEFAULT_MANAGEMENT_ENDPOINT};
use super::session::ManagementSession;
use crate::config::require;
use crate::validation::validate_endpoint;
use crate::{
    CaptureError, CaptureRequest, CaptureStep, ComputeClient, ConnectionDescriptor,
    PendingOperation, Result, VmTarget,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, LOCATION, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

/// User agent reported to the management API.
pub const USER_AGENT: &str = "Ansible-Image-Capture";

const ASYNC_OPERATION_HEADER: &str = "Azure-AsyncOperation";
const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    status: String,
    #[serde(default)]
    properties: Option<Value>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

impl From<reqwest::Error> for CaptureError {
    fn from(e: reqwest::Error) -> Self {
        CaptureError::Transport(e.to_string())
    }
}

/// Compute client for the Azure Resource Manager REST API.
///
/// Issues `POST .../virtualMachines/{vm}/{action}` requests and follows the
/// long-running operation headers until completion.
pub struct AzureComputeClient {
    http: reqwest::Client,
    endpoint: String,
    subscription_id: String,
    tokens: Arc<dyn TokenProvider>,
    session: Mutex<Option<ManagementSession>>,
    options: AzureOptions,
}

impl AzureComputeClient {
    /// Creates a client authenticating with the descriptor's service principal.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::MissingCredentials`]: client id, secret or tenant absent
    /// - [`CaptureError::MissingParameter`]: subscription id absent
    pub fn new(descriptor: &ConnectionDescriptor, options: AzureOptions) -> Result<Self> {
        let (client_id, client_secret, tenant_id) = match (
            &descriptor.client_id,
            &descriptor.client_secret,
            &descriptor.tenant_id,
        ) {
            (Some(id), Some(secret), Some(tenant)) => (id, secret, tenant),
            _ => {
                return Err(CaptureError::MissingCredentials(
                    [
                        ("client_id", descriptor.client_id.is_none()),
                        ("client_secret", descriptor.client_secret.is_none()),
                        ("tenant_id", descriptor.tenant_id.is_none()),
                    ]
                    .into_iter()
                    .filter(|(_, missing)| *missing)
                    .map(|(name, _)| name)
                    .collect(),
                ))
            }
        };

        let tokens = ServicePrincipalTokenProvider::new(
            &options.authority_host,
            tenant_id,
            client_id,
            client_secret,
        )?;

        Self::with_token_provider(
            descriptor
                .azure_url
                .as_deref()
                .unwrap_or(DEFAULT_MANAGEMENT_ENDPOINT),
            require("subscription_id", &descriptor.subscription_id)?,
            Arc::new(tokens),
            options,
        )
    }

    /// Creates a client with an explicit token source.
    pub fn with_token_provider(
        endpoint: &str,
        subscription_id: &str,
        tokens: Arc<dyn TokenProvider>,
        options: AzureOptions,
    ) -> Result<Self> {
        validate_endpoint(endpoint)?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CaptureError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            subscription_id: subscription_id.to_string(),
            tokens,
            session: Mutex::new(None),
            options,
        })
    }

    /// Token scope for the configured endpoint.
    fn scope(&self) -> String {
        format!("{}/.default", self.endpoint)
    }

    /// Constructs the action URL for a step.
    fn action_url(&self, target: &VmTarget, step: CaptureStep) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines/{}/{}?api-version={}",
            self.endpoint,
            self.subscription_id,
            target.resource_group,
            target.vm_name,
            step.action(),
            self.options.api_version
        )
    }

    /// Returns a valid bearer token, fetching a new one when expired.
    async fn bearer(&self) -> Result<String> {
        let mut session = self.session.lock().await;
        if let Some(current) = session.as_ref().filter(|s| s.is_valid()) {
            return Ok(current.token().to_string());
        }

        debug!("fetching management token");
        let fresh = self.tokens.fetch_token(&self.scope()).await?;
        let token = fresh.token().to_string();
        *session = Some(fresh);
        Ok(token)
    }

    async fn post(
        &self,
        step: CaptureStep,
        target: &VmTarget,
        body: Option<Value>,
    ) -> Result<PendingOperation> {
        let url = self.action_url(target, step);
        let request_id = uuid::Uuid::new_v4().to_string();
        debug!(%step, %request_id, "POST {}", url);

        let mut request = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.bearer().await?))
            .header(CLIENT_REQUEST_ID_HEADER, &request_id);
        request = match body {
            Some(body) => request.json(&body),
            None => request.header(reqwest::header::CONTENT_LENGTH, "0"),
        };

        let response = check(request.send().await?).await?;
        let async_operation_url = header_string(response.headers(), ASYNC_OPERATION_HEADER);
        let location_url = header_string(response.headers(), LOCATION.as_str());

        Ok(PendingOperation {
            step,
            async_operation_url,
            location_url,
            body: read_body(response).await?,
        })
    }

    async fn get(&self, url: &str) -> Result<Response> {
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.bearer().await?))
            .header(CLIENT_REQUEST_ID_HEADER, uuid::Uuid::new_v4().to_string())
            .send()
            .await?;
        check(response).await
    }

    /// Polls an `Azure-AsyncOperation` URL until a terminal status.
    ///
    /// Returns `properties.output` of the final status, if present.
    async fn poll_status(&self, url: &str, deadline: Instant) -> Result<Option<Value>> {
        loop {
            let response = self.get(url).await?;
            let delay = retry_after(response.headers()).unwrap_or(self.options.poll_interval);
            let status: OperationStatus = response.json().await?;

            match status.status.as_str() {
                "Succeeded" => {
                    return Ok(status
                        .properties
                        .as_ref()
                        .and_then(|p| p.get("output"))
                        .cloned())
                }
                "Failed" | "Canceled" => {
                    let message = status
                        .error
                        .map(|e| {
                            if e.code.is_empty() {
                                e.message
                            } else {
                                format!("{}: {}", e.code, e.message)
                            }
                        })
                        .unwrap_or_default();
                    return Err(CaptureError::OperationFailed {
                        status: status.status,
                        message,
                    });
                }
                other => trace!(status = other, "operation still running"),
            }

            self.pause(delay, deadline).await?;
        }
    }

    /// Polls a `Location` URL until it stops answering 202.
    async fn poll_location(&self, url: &str, deadline: Instant) -> Result<Option<Value>> {
        loop {
            let response = self.get(url).await?;
            if response.status() != StatusCode::ACCEPTED {
                return read_body(response).await;
            }

            let delay = retry_after(response.headers()).unwrap_or(self.options.poll_interval);
            self.pause(delay, deadline).await?;
        }
    }

    /// Sleeps for `delay`, or fails right away if that would overrun the
    /// deadline. `delay` comes from the server and may be arbitrarily large.
    async fn pause(&self, delay: Duration, deadline: Instant) -> Result<()> {
        let resume = Instant::now()
            .checked_add(delay)
            .filter(|at| *at <= deadline)
            .ok_or(CaptureError::Timeout(self.options.operation_timeout))?;
        tokio::time::sleep_until(resume).await;
        Ok(())
    }

    async fn follow(&self, operation: PendingOperation, deadline: Instant) -> Result<Option<Value>> {
        if let Some(url) = &operation.async_operation_url {
            if let Some(output) = self.poll_status(url, deadline).await? {
                return Ok(Some(output));
            }
        }

        if let Some(url) = &operation.location_url {
            return self.poll_location(url, deadline).await;
        }

        Ok(operation.body)
    }
}

#[async_trait]
impl ComputeClient for AzureComputeClient {
    fn name(&self) -> &str {
        "azure"
    }

    async fn authenticate(&mut self) -> Result<()> {
        let session = self
            .tokens
            .fetch_token(&self.scope())
            .await
            .map_err(|e| match e {
                CaptureError::Authentication(_) => e,
                other => CaptureError::Authentication(other.to_string()),
            })?;
        debug!(expires_at = %session.expires_at(), "authenticated");
        *self.session.get_mut() = Some(session);
        Ok(())
    }

    #[instrument(skip_all, fields(vm = %target.vm_name))]
    async fn deallocate(&self, target: &VmTarget) -> Result<PendingOperation> {
        self.post(CaptureStep::Deallocate, target, None).await
    }

    #[instrument(skip_all, fields(vm = %target.vm_name))]
    async fn generalize(&self, target: &VmTarget) -> Result<PendingOperation> {
        self.post(CaptureStep::Generalize, target, None).await
    }

    #[instrument(skip_all, fields(vm = %target.vm_name))]
    async fn capture(
        &self,
        target: &VmTarget,
        request: &CaptureRequest,
    ) -> Result<PendingOperation> {
        let body = serde_json::to_value(request)?;
        self.post(CaptureStep::Capture, target, Some(body)).await
    }

    #[instrument(skip_all, fields(step = %operation.step))]
    async fn wait(&self, operation: PendingOperation) -> Result<Option<Value>> {
        let timeout = self.options.operation_timeout;
        let deadline = Instant::now()
            .checked_add(timeout)
            .ok_or_else(|| CaptureError::InvalidParameter {
                field: "operation_timeout",
                reason: format!("{:?} is too large", timeout),
            })?;

        // Bounds hung requests too, not only the sleeps between polls.
        tokio::time::timeout_at(deadline, self.follow(operation, deadline))
            .await
            .map_err(|_| CaptureError::Timeout(timeout))?
    }
}

/// Turns a non-success response into [`CaptureError::Http`].
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(envelope) => (Some(envelope.error.code), envelope.error.message),
        Err(_) if text.trim().is_empty() => (
            None,
            status.canonical_reason().unwrap_or_default().to_string(),
        ),
        Err(_) => (None, text),
    };

    Err(CaptureError::Http {
        status: status.as_u16(),
        code,
        message,
    })
}

async fn read_body(response: Response) -> Result<Option<Value>> {
    let bytes = response.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&bytes)?))
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

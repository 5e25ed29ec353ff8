//! HTTP client for a tenant's fleet REST endpoint.
//!
//! ## Example
//!
//! ```no_run
//! use fleetdeck_api::{FleetApi, HttpFleetApi};
//! use fleetdeck_core::TenantConfig;
//!
//! # async fn example() -> fleetdeck_api::Result<()> {
//! let tenant = TenantConfig {
//!     base_url: "https://fleet.acme.example/api".into(),
//!     api_key_env: "ACME_FLEET_KEY".into(),
//!     timeout_secs: 20,
//! };
//! let client = HttpFleetApi::from_tenant("acme", &tenant)?;
//! let devices = client.list_devices("acme").await?;
//! println!("{} devices", devices.len());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Duration;
use tracing::debug;

use fleetdeck_core::TenantConfig;
use fleetdeck_core::types::{Device, Incident, OperationKind, OperationReceipt, Space, Ticket};

use crate::FleetApi;
use crate::error::{ApiError, Result};

/// reqwest-backed [`FleetApi`].
pub struct HttpFleetApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct OperationRequest<'a> {
    operation: &'a str,
}

impl HttpFleetApi {
    /// Build a client for a configured tenant, reading the API key from the
    /// tenant's environment variable.
    pub fn from_tenant(tenant_id: &str, tenant: &TenantConfig) -> Result<Self> {
        let api_key = std::env::var(&tenant.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ApiError::MissingKey {
                tenant: tenant_id.to_string(),
                env_var: tenant.api_key_env.clone(),
            })?;
        Self::with_api_key(&tenant.base_url, api_key, tenant.timeout_secs)
    }

    /// Build a client with an explicit API key.
    pub fn with_api_key(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ApiError::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout_secs,
        })
    }

    fn url(&self, tenant: &str, path: &str) -> String {
        format!("{}/v1/tenants/{}/{}", self.base_url, tenant, path)
    }

    fn map_transport(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.timeout_secs)
        } else {
            ApiError::from(err)
        }
    }

    async fn read_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), &body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, tenant: &str, path: &str) -> Result<T> {
        let url = self.url(tenant, path);
        debug!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        self.read_response(response).await
    }
}

#[async_trait]
impl FleetApi for HttpFleetApi {
    async fn list_devices(&self, tenant: &str) -> Result<Vec<Device>> {
        self.get(tenant, "devices").await
    }

    async fn list_spaces(&self, tenant: &str) -> Result<Vec<Space>> {
        self.get(tenant, "spaces").await
    }

    async fn list_space_devices(&self, tenant: &str, space_id: &str) -> Result<Vec<Device>> {
        self.get(tenant, &format!("spaces/{space_id}/devices")).await
    }

    async fn list_incidents(&self, tenant: &str) -> Result<Vec<Incident>> {
        self.get(tenant, "incidents").await
    }

    async fn list_tickets(&self, tenant: &str) -> Result<Vec<Ticket>> {
        self.get(tenant, "tickets").await
    }

    async fn invoke_operation(
        &self,
        tenant: &str,
        device_id: &str,
        operation: OperationKind,
    ) -> Result<OperationReceipt> {
        let url = self.url(tenant, &format!("devices/{device_id}/operations"));
        debug!(%url, operation = operation.as_str(), "POST");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&OperationRequest {
                operation: operation.as_str(),
            })
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        self.read_response(response).await
    }

    fn name(&self) -> &str {
        "http"
    }
}

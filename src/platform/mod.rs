//! External platform API client.
//!
//! All inventory reads and writes against the e-commerce platform go
//! through `PlatformClient`, so workers can be tested against a mock and
//! the GraphQL transport stays in one place.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Decrypted credentials for one tenant's platform API
#[derive(Debug, Clone)]
pub struct PlatformCredentials {
    pub domain: String,
    pub access_token: String,
}

/// An absolute-quantity inventory mutation. Absolute sets (never deltas)
/// are what make retries safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySet {
    pub inventory_item_id: String,
    pub location_id: String,
    pub quantity: i64,
    /// Audit reason recorded on the external side, e.g. "correction"
    pub reason: String,
}

/// Platform API errors
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Request exceeded its deadline
    #[error("Platform request timed out")]
    Timeout,

    /// Network failure, rate limit, or 5xx; worth retrying
    #[error("Transient platform error: {0}")]
    Transient(String),

    /// The platform rejected the request (including mutation userErrors)
    #[error("Platform API error: {0}")]
    Api(String),

    /// Response did not match the expected shape
    #[error("Unexpected platform response: {0}")]
    InvalidResponse(String),
}

/// Client for the platform's GraphQL admin API
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Current available quantity for an inventory item at one specific
    /// location. Other locations are never consulted or summed.
    async fn inventory_level(
        &self,
        creds: &PlatformCredentials,
        inventory_item_id: &str,
        location_id: &str,
    ) -> Result<i64, PlatformError>;

    /// Set the absolute quantity at one location. Idempotent: repeating
    /// the same set is a no-op on the platform side.
    async fn set_inventory_level(
        &self,
        creds: &PlatformCredentials,
        set: InventorySet,
    ) -> Result<(), PlatformError>;
}

/// Production client over the platform's GraphQL endpoint.
pub struct GraphqlPlatformClient {
    client: reqwest::Client,
    api_version: String,
}

impl GraphqlPlatformClient {
    pub fn new(timeout: Duration, api_version: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_version: api_version.to_string(),
        })
    }

    fn endpoint(&self, domain: &str) -> String {
        format!("https://{}/admin/api/{}/graphql.json", domain, self.api_version)
    }

    async fn execute(
        &self,
        creds: &PlatformCredentials,
        query: &str,
        variables: Value,
    ) -> Result<Value, PlatformError> {
        let response = self
            .client
            .post(self.endpoint(&creds.domain))
            .header("X-Access-Token", &creds.access_token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PlatformError::Timeout
                } else {
                    PlatformError::Transient(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(PlatformError::Transient(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(PlatformError::Api(format!("HTTP {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;

        if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
            return Err(PlatformError::Api(errors.to_string()));
        }

        body.get("data")
            .cloned()
            .ok_or_else(|| PlatformError::InvalidResponse("missing data field".into()))
    }
}

const INVENTORY_LEVEL_QUERY: &str = r#"
query InventoryLevel($inventoryItemId: ID!, $locationId: ID!) {
  inventoryLevel(inventoryItemId: $inventoryItemId, locationId: $locationId) {
    available
  }
}
"#;

const INVENTORY_SET_MUTATION: &str = r#"
mutation InventorySetQuantity($input: InventorySetQuantityInput!) {
  inventorySetQuantity(input: $input) {
    userErrors {
      field
      message
    }
  }
}
"#;

#[async_trait]
impl PlatformClient for GraphqlPlatformClient {
    async fn inventory_level(
        &self,
        creds: &PlatformCredentials,
        inventory_item_id: &str,
        location_id: &str,
    ) -> Result<i64, PlatformError> {
        let data = self
            .execute(
                creds,
                INVENTORY_LEVEL_QUERY,
                json!({
                    "inventoryItemId": inventory_item_id,
                    "locationId": location_id,
                }),
            )
            .await?;

        data.pointer("/inventoryLevel/available")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                PlatformError::InvalidResponse(format!(
                    "no inventory level for item {} at location {}",
                    inventory_item_id, location_id
                ))
            })
    }

    async fn set_inventory_level(
        &self,
        creds: &PlatformCredentials,
        set: InventorySet,
    ) -> Result<(), PlatformError> {
        debug!(
            item = %set.inventory_item_id,
            location = %set.location_id,
            quantity = set.quantity,
            "Setting platform inventory level"
        );

        let data = self
            .execute(
                creds,
                INVENTORY_SET_MUTATION,
                json!({
                    "input": {
                        "inventoryItemId": set.inventory_item_id,
                        "locationId": set.location_id,
                        "quantity": set.quantity,
                        "reason": set.reason,
                    }
                }),
            )
            .await?;

        let user_errors = data
            .pointer("/inventorySetQuantity/userErrors")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if !user_errors.is_empty() {
            return Err(PlatformError::Api(Value::Array(user_errors).to_string()));
        }
        Ok(())
    }
}

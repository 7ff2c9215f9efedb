//! Webhook receiver: validates inbound platform change notifications and
//! enqueues them, nothing more.
//!
//! The handler owns raw-byte access: the signature is recomputed over the
//! unparsed body, and JSON parsing happens only after verification. The
//! receiver never processes payloads synchronously; slow work would trip
//! the platform's webhook retry policy.

use crate::audit::{EntityKind, LogEntry, SyncLogger, SyncOperation, SyncStatus};
use crate::infrastructure::jobs::{NewJob, SyncQueue, SyncTask};
use crate::services::error::SyncError;
use crate::store::TenantStore;
use crate::vault::{constant_time_eq, CredentialVault};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Compute the hex HMAC-SHA256 signature for a webhook body.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a provided hex signature against the raw body, in constant time.
pub fn verify(secret: &[u8], body: &[u8], provided_hex: &str) -> bool {
    let Ok(provided) = hex::decode(provided_hex) else {
        return false;
    };
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
    mac.update(body);
    constant_time_eq(&mac.finalize().into_bytes(), &provided)
}

/// Shared state for the webhook endpoint
#[derive(Clone)]
pub struct WebhookState {
    pub tenants: Arc<TenantStore>,
    pub vault: Arc<CredentialVault>,
    pub queue: Arc<dyn SyncQueue>,
    pub audit: Arc<SyncLogger>,
}

/// Build the receiver router. Separate from serving so tests can drive
/// it directly.
pub fn router(state: WebhookState) -> Router {
    Router::new()
        // Wildcard because topics contain slashes, e.g. inventory_levels/update
        .route("/webhooks/*topic", post(receive_webhook))
        .with_state(state)
}

async fn receive_webhook(
    State(state): State<WebhookState>,
    Path(path_topic): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match handle(&state, &path_topic, &headers, &body).await {
        Ok(response) => response,
        Err(SyncError::Authentication(message)) => {
            debug!(topic = %path_topic, %message, "Rejected webhook");
            (StatusCode::UNAUTHORIZED, message).into_response()
        }
        Err(err) => {
            error!(topic = %path_topic, %err, "Webhook processing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}

async fn handle(
    state: &WebhookState,
    path_topic: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, SyncError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };

    let (Some(signature), Some(topic), Some(domain)) = (
        header("x-signature"),
        header("x-topic"),
        header("x-tenant-domain"),
    ) else {
        return Err(SyncError::Authentication("Missing headers".into()));
    };

    if topic != path_topic {
        debug!(%topic, path_topic, "Topic header differs from path; using header");
    }

    // Unknown or inactive tenants get the same response as a bad
    // signature so the endpoint is not a tenant-enumeration oracle.
    let tenant = state
        .tenants
        .find_by_domain(&domain)
        .await?
        .filter(|t| t.active)
        .ok_or_else(|| SyncError::Authentication("Invalid HMAC".into()))?;

    let secret = state
        .vault
        .decrypt(&tenant.webhook_secret_ciphertext)
        .map_err(|source| {
            // Vault misconfiguration or tampering must not pass silently
            error!(tenant = %tenant.uuid, %source, "Webhook secret decryption failed");
            SyncError::Authentication("Invalid HMAC".into())
        })?;

    if !verify(secret.as_bytes(), body, &signature) {
        warn!(tenant = %tenant.uuid, %topic, "Webhook signature mismatch");
        return Err(SyncError::Authentication("Invalid HMAC".into()));
    }

    // Signature checked; structured parsing is allowed from here on.
    let payload: serde_json::Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(parse_err) => {
            // A correctly signed but unparseable body is a poison payload;
            // acknowledge it so the platform stops re-delivering, and
            // leave an error entry for operators.
            warn!(tenant = %tenant.uuid, %topic, %parse_err, "Discarding unparseable webhook body");
            state
                .audit
                .record(LogEntry {
                    tenant_id: tenant.uuid,
                    entity_kind: EntityKind::Webhook,
                    operation: SyncOperation::Error,
                    direction: None,
                    status: SyncStatus::Error,
                    external_id: None,
                    internal_sku: None,
                    message: Some(format!("Unparseable webhook body: {}", parse_err)),
                    payload: None,
                    duration_ms: None,
                })
                .await?;
            return Ok((StatusCode::OK, "discarded").into_response());
        }
    };

    state
        .queue
        .enqueue(NewJob {
            tenant_id: tenant.uuid,
            key: format!("{}:{}", tenant.uuid, topic),
            task: SyncTask::InboundWebhook {
                topic: topic.clone(),
                payload,
            },
        })
        .await?;

    debug!(tenant = %tenant.uuid, %topic, "Webhook accepted and enqueued");
    Ok((StatusCode::OK, "ok").into_response())
}

/// HTTP server wrapper for the receiver.
pub struct WebhookServer {
    state: WebhookState,
    addr: SocketAddr,
}

impl WebhookServer {
    pub fn new(state: WebhookState, addr: SocketAddr) -> Self {
        Self { state, addr }
    }

    /// Serve until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("Webhook receiver listening on {}", self.addr);

        axum::serve(listener, router(self.state.clone()))
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await?;

        info!("Webhook receiver stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let secret = b"webhook-secret";
        let body = br#"{"inventory_item_id":"item-1"}"#;
        let sig = sign(secret, body);
        assert!(verify(secret, body, &sig));
    }

    #[test]
    fn bit_flip_in_body_fails() {
        let secret = b"webhook-secret";
        let body = b"payload-bytes";
        let sig = sign(secret, body);
        let mut tampered = body.to_vec();
        tampered[0] ^= 0x01;
        assert!(!verify(secret, &tampered, &sig));
    }

    #[test]
    fn bit_flip_in_signature_fails() {
        let secret = b"webhook-secret";
        let body = b"payload-bytes";
        let sig = sign(secret, body);
        let mut bytes = hex::decode(&sig).unwrap();
        bytes[0] ^= 0x01;
        assert!(!verify(secret, body, &hex::encode(bytes)));
    }

    #[test]
    fn wrong_secret_fails() {
        let body = b"payload-bytes";
        let sig = sign(b"secret-a", body);
        assert!(!verify(b"secret-b", body, &sig));
    }

    #[test]
    fn non_hex_signature_fails() {
        assert!(!verify(b"secret", b"body", "not hex at all"));
    }
}

//! Background services management

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub mod error;
pub mod outbound;
pub mod reconciler;
pub mod webhook;

pub use error::SyncError;
pub use outbound::OutboundWriter;
pub use reconciler::{KeyLocks, ReconcileWorker, WorkerConfig};
pub use webhook::{WebhookServer, WebhookState};

/// Container for all background services
pub struct Services {
    /// HTTP receiver for platform webhooks
    pub webhook: Arc<WebhookServer>,

    /// Event-bus listener that turns internal writes into push jobs
    pub outbound: Arc<OutboundWriter>,

    /// Queue consumers
    pub workers: Vec<Arc<ReconcileWorker>>,

    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Services {
    pub fn new(
        webhook: Arc<WebhookServer>,
        outbound: Arc<OutboundWriter>,
        workers: Vec<Arc<ReconcileWorker>>,
    ) -> Self {
        info!("Initializing background services");
        let (shutdown, _) = watch::channel(false);
        Self {
            webhook,
            outbound,
            workers,
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Start all services
    pub async fn start_all(&self) -> Result<()> {
        info!("Starting all background services");
        let mut handles = self.handles.lock().await;

        let webhook = self.webhook.clone();
        let rx = self.shutdown.subscribe();
        handles.push(tokio::spawn(async move {
            if let Err(err) = webhook.run(rx).await {
                warn!(%err, "Webhook receiver exited with error");
            }
        }));

        let outbound = self.outbound.clone();
        let rx = self.shutdown.subscribe();
        handles.push(tokio::spawn(async move {
            outbound.run(rx).await;
        }));

        for worker in &self.workers {
            let worker = worker.clone();
            let rx = self.shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                worker.run(rx).await;
            }));
        }

        Ok(())
    }

    /// Stop all services gracefully
    pub async fn stop_all(&self) -> Result<()> {
        info!("Stopping all background services");
        let _ = self.shutdown.send(true);

        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(err) = handle.await {
                warn!(%err, "Service task panicked during shutdown");
            }
        }
        Ok(())
    }
}

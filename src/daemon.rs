//! Daemon - wires the services together and runs them
//!
//! Builds the long-lived service objects once (gateway client, stores,
//! retriever, processor, queue), starts the worker and the HTTP listener,
//! and coordinates cooperative shutdown: stop enqueues, drain the queue with
//! a bounded wait, stop the worker, and only then release the listener.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::api::{self, ApiState};
use crate::gateway::GatewayClient;
use crate::ingest::queue::{spawn_worker, QUEUE_CAPACITY};
use crate::ingest::{HandoffQueue, LoginWatch, MessageDedup};
use crate::media::MediaRetriever;
use crate::notify::Notifier;
use crate::processor::{NoopIdiomLearner, Processor};
use crate::store::{ContactStore, GroupDirectory};
use crate::{Config, Result};

/// Bounded wait for the queue to drain on shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// The bridge daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the daemon until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if startup fails (bad gateway URL, port in use)
    pub async fn run(self) -> Result<()> {
        let service = &self.config.service;
        let account_id = service.account_id.clone();

        let gateway = Arc::new(GatewayClient::new(&service.base_url)?);
        let notifier = Notifier::new(self.config.notify_url.clone());

        let contacts = Arc::new(ContactStore::new(self.config.storage.contact_file.clone()));
        let groups = Arc::new(GroupDirectory::new(
            self.config.storage.group_file.clone(),
            gateway.clone(),
            account_id.clone(),
        ));

        tracing::info!(
            contacts = contacts.len(),
            gateway = %service.base_url,
            "services initialized"
        );

        let media = MediaRetriever::new(
            gateway.clone(),
            account_id.clone(),
            self.config.storage.image_dir.clone(),
            self.config.storage.file_dir.clone(),
        );

        let processor = Arc::new(Processor::new(
            account_id.clone(),
            gateway,
            contacts,
            groups,
            media,
            notifier.clone(),
            Arc::new(NoopIdiomLearner),
            self.config
                .idiom
                .watch_senders
                .iter()
                .cloned()
                .collect::<HashSet<_>>(),
        ));

        let (queue, rx, shutdown) = HandoffQueue::new(QUEUE_CAPACITY);
        let mut worker = spawn_worker(rx, shutdown.clone(), move |entry| {
            let processor = processor.clone();
            async move { processor.handle(entry).await }
        });

        let state = Arc::new(ApiState {
            account_id: account_id.clone(),
            dedup: MessageDedup::new(),
            queue,
            login: LoginWatch::new(notifier),
        });

        let app = api::router(state);
        let listener = TcpListener::bind(("0.0.0.0", service.port)).await?;
        tracing::info!(
            port = service.port,
            path = %format!("/msg/SyncMessage/{account_id}"),
            "webhook ingress listening"
        );

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await
        });

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutdown requested");

        // stop enqueues, then give the worker a bounded window to drain
        shutdown.store(true, Ordering::Relaxed);
        match tokio::time::timeout(DRAIN_TIMEOUT, &mut worker).await {
            Ok(result) => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "worker ended abnormally");
                }
            }
            Err(_) => {
                tracing::warn!("queue drain timed out, cancelling worker");
                worker.abort();
            }
        }

        // release the listener last
        let _ = stop_tx.send(());
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "server ended abnormally"),
            Err(e) => tracing::warn!(error = %e, "server task failed"),
        }

        tracing::info!("daemon stopped");
        Ok(())
    }
}

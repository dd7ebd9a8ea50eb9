//! Catalog Notifier - sends list_changed notifications to the active client
//!
//! Listens for `CatalogRebuilt` and forwards tools, prompts and resources
//! list_changed to whichever client the [`ClientGateway`] currently holds.
//! Notifications are never buffered for a client that is not connected.

use std::sync::Arc;

use mcplex_core::{DomainEvent, EventReceiver};
use rmcp::model::ServerNotification;
use tracing::{debug, info, trace, warn};

use crate::session::ClientGateway;

pub struct CatalogNotifier {
    gateway: Arc<ClientGateway>,
}

impl CatalogNotifier {
    pub fn new(gateway: Arc<ClientGateway>) -> Self {
        Self { gateway }
    }

    /// Spawn the listening task
    pub fn start(self: Arc<Self>, mut event_rx: EventReceiver) {
        tokio::spawn(async move {
            info!("[CatalogNotifier] Started listening for DomainEvents");

            while let Some(event) = event_rx.recv().await {
                self.handle_event(event).await;
            }

            debug!("[CatalogNotifier] Event channel closed, stopping");
        });
    }

    async fn handle_event(&self, event: DomainEvent) {
        if !event.affects_catalog() {
            trace!(
                event_type = event.type_name(),
                "[CatalogNotifier] Skipping event"
            );
            return;
        }

        let sent = self.notify_all_lists().await;
        debug!(sent = sent, "[CatalogNotifier] list_changed dispatched");
    }

    /// Send all three list_changed notifications, returning how many went out
    pub async fn notify_all_lists(&self) -> usize {
        let notifications = [
            ServerNotification::ToolListChangedNotification(Default::default()),
            ServerNotification::PromptListChangedNotification(Default::default()),
            ServerNotification::ResourceListChangedNotification(Default::default()),
        ];

        let mut sent = 0;
        for notification in notifications {
            match self.gateway.notify(notification).await {
                Ok(true) => sent += 1,
                Ok(false) => {
                    trace!("[CatalogNotifier] No active client");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "[CatalogNotifier] Failed to notify client");
                    if let Some(session) = self.gateway.current_session() {
                        self.gateway.release(&session.session_id);
                    }
                    break;
                }
            }
        }
        sent
    }
}

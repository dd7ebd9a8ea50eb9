//! Event Bus - Central event distribution system
//!
//! All domain events flow through this bus, decoupling producers (registry
//! service, connection manager, client gateway) from consumers (catalog
//! notifier, diagnostics).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Event Bus (broadcast channel)               │
//! │                                                                 │
//! │  Producers:                    Consumers:                       │
//! │  ├─ RegistryAppService         ├─ CatalogNotifier (list_changed)│
//! │  ├─ ConnectionManager          └─ Tests / diagnostics           │
//! │  └─ ClientGateway                                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! // Create event bus
//! let event_bus = EventBus::new();
//!
//! // Get sender for services
//! let sender = event_bus.sender();
//!
//! // Subscribe consumers
//! let notifier_receiver = event_bus.subscribe();
//!
//! // Emit event from service
//! sender.emit(DomainEvent::ServerAdded { ... });
//!
//! // Consumers receive asynchronously
//! while let Some(event) = notifier_receiver.recv().await { ... }
//! ```

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::DomainEvent;

/// Default channel capacity for the event bus
const DEFAULT_CAPACITY: usize = 256;

/// Event Bus - Central hub for domain event distribution
///
/// Uses a broadcast channel to allow multiple consumers to receive
/// all events. Each consumer gets its own copy of every event.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus with custom capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Get a sender for emitting events
    ///
    /// The sender can be cloned and shared across threads/tasks.
    pub fn sender(&self) -> EventSender {
        EventSender::new(self.sender.clone())
    }

    /// Subscribe to receive events
    ///
    /// Each subscriber gets its own receiver that receives all events
    /// emitted after subscription.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe())
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event Sender - Used by services to emit domain events
///
/// Thread-safe and cheaply cloneable.
#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventSender {
    fn new(sender: broadcast::Sender<DomainEvent>) -> Self {
        Self { sender }
    }

    /// Emit a domain event
    ///
    /// Returns the number of receivers that received the event.
    /// Returns 0 if there are no subscribers (not an error).
    pub fn emit(&self, event: DomainEvent) -> usize {
        let type_name = event.type_name();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(
                    event_type = type_name,
                    receivers = count,
                    "[EventBus] Emitted event"
                );
                count
            }
            Err(_) => {
                // No receivers - this is okay, just means no one is listening
                debug!(
                    event_type = type_name,
                    "[EventBus] No receivers for event"
                );
                0
            }
        }
    }

    /// Check if there are any subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }

    /// New receiver on the same channel
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe())
    }
}

/// Event Receiver - Used by consumers to receive domain events
///
/// Each receiver gets all events emitted after subscription.
/// Use in an async loop to process events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    fn new(receiver: broadcast::Receiver<DomainEvent>) -> Self {
        Self { receiver }
    }

    /// Receive the next event (async)
    ///
    /// Returns `None` if the channel is closed.
    /// Handles lag gracefully by logging and continuing.
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        skipped_events = skipped,
                        "[EventBus] Receiver lagged, skipped {} events",
                        skipped
                    );
                    // Continue to receive next available event
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("[EventBus] Channel closed");
                    return None;
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<DomainEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(
                    skipped_events = skipped,
                    "[EventBus] Receiver lagged on try_recv"
                );
                // Try again after lag
                self.receiver.try_recv().ok()
            }
            Err(_) => None,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

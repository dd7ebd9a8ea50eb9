//! Event consumers
//!
//! Consumers subscribe to DomainEvents from the EventBus and react in their
//! own context:
//!
//! - **CatalogNotifier**: tells the active client that lists changed

mod catalog_notifier;

pub use catalog_notifier::CatalogNotifier;

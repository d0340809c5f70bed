//! Infrastructure layer: event store, dispatch pipeline, read models,
//! background jobs, and external service clients.

pub mod command_dispatcher;
pub mod event_store;
pub mod jobs;
pub mod mailer;
pub mod maps;
pub mod notifications;
pub mod orders;
pub mod projections;
pub mod read_model;
pub mod worker;

#[cfg(test)]
mod integration_tests;

/// Aggregate type identifiers used as stream and routing keys.
pub mod aggregate_types {
    pub const PLANT_BATCH: &str = "agriculture.plant_batch";
    pub const CONTRACT: &str = "contracts.contract";
    pub const DELIVERY_TRIP: &str = "delivery.delivery_trip";
    pub const SALES_INVOICE: &str = "invoicing.sales_invoice";
}

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{
    EventStore, EventStoreError, InMemoryEventStore, PublishingEventStore, StoredEvent,
    UncommittedEvent,
};
pub use read_model::{InMemoryTenantStore, TenantStore};

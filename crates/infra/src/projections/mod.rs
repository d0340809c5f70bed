//! Projection implementations (read model builders).
//!
//! Projections consume domain events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: Can be reconstructed from the event stream
//! - **Tenant-isolated**: Data is partitioned by tenant
//! - **Idempotent**: Safe for at-least-once delivery

pub mod batches;
pub mod contracts;
pub mod invoices;
pub mod trips;

pub use batches::{BatchProjectionError, BatchReadModel, BatchesProjection};
pub use contracts::{ContractProjectionError, ContractReadModel, ContractsProjection};
pub use invoices::{InvoiceProjectionError, InvoiceReadModel, InvoicesProjection};
pub use trips::{
    DeliveryNoteAssignment, DeliveryNoteStatus, TripProjectionError, TripReadModel,
    TripsProjection,
};

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use agroflow_contracts::ContractId;
use agroflow_core::AggregateId;
use agroflow_delivery::DeliveryTripId;
use agroflow_events::EventEnvelope;
use agroflow_invoicing::SalesInvoiceId;

use crate::aggregate_types;
use crate::read_model::InMemoryTenantStore;

#[derive(Debug, Error)]
pub enum ProjectionRouterError {
    #[error(transparent)]
    Batch(#[from] BatchProjectionError),
    #[error(transparent)]
    Contract(#[from] ContractProjectionError),
    #[error(transparent)]
    Invoice(#[from] InvoiceProjectionError),
    #[error(transparent)]
    Trip(#[from] TripProjectionError),
}

type BatchStore = Arc<InMemoryTenantStore<agroflow_agriculture::PlantBatchId, BatchReadModel>>;
type ContractStore = Arc<InMemoryTenantStore<ContractId, ContractReadModel>>;
type InvoiceStore = Arc<InMemoryTenantStore<SalesInvoiceId, InvoiceReadModel>>;
type TripStore = Arc<InMemoryTenantStore<DeliveryTripId, TripReadModel>>;
type NoteStore = Arc<InMemoryTenantStore<AggregateId, DeliveryNoteAssignment>>;

/// Routes published envelopes to the projection owning the aggregate type.
///
/// Envelopes for aggregate types no projection owns are ignored, which
/// keeps the router forward compatible with new event sources.
pub struct ProjectionRouter {
    pub batches: BatchesProjection<BatchStore>,
    pub contracts: ContractsProjection<ContractStore>,
    pub invoices: InvoicesProjection<InvoiceStore>,
    pub trips: TripsProjection<TripStore, NoteStore>,
}

impl ProjectionRouter {
    pub fn new() -> Self {
        Self {
            batches: BatchesProjection::new(Arc::new(InMemoryTenantStore::new())),
            contracts: ContractsProjection::new(Arc::new(InMemoryTenantStore::new())),
            invoices: InvoicesProjection::new(Arc::new(InMemoryTenantStore::new())),
            trips: TripsProjection::new(
                Arc::new(InMemoryTenantStore::new()),
                Arc::new(InMemoryTenantStore::new()),
            ),
        }
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionRouterError> {
        match envelope.aggregate_type() {
            aggregate_types::PLANT_BATCH => self.batches.apply_envelope(envelope)?,
            aggregate_types::CONTRACT => self.contracts.apply_envelope(envelope)?,
            aggregate_types::SALES_INVOICE => self.invoices.apply_envelope(envelope)?,
            aggregate_types::DELIVERY_TRIP => self.trips.apply_envelope(envelope)?,
            _ => {}
        }
        Ok(())
    }
}

impl Default for ProjectionRouter {
    fn default() -> Self {
        Self::new()
    }
}


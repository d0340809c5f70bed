use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;

use agroflow_core::{AggregateId, TenantId};
use agroflow_events::EventEnvelope;
use agroflow_invoicing::{InvoiceStatus, SalesInvoiceEvent, SalesInvoiceId};

use crate::read_model::TenantStore;

/// Sales invoice read model, one row per invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceReadModel {
    pub invoice_id: SalesInvoiceId,
    pub customer: String,
    pub contract: Option<AggregateId>,
    pub due_date: Option<NaiveDate>,
    pub total_cents: u64,
    pub paid_cents: u64,
    pub status: InvoiceStatus,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum InvoiceProjectionError {
    #[error("failed to deserialize invoice event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event for unknown invoice {0}")]
    UnknownInvoice(SalesInvoiceId),
}

/// Sales invoice projection backing the invoice lookups of the contract
/// status sync job and the payment endpoint.
#[derive(Debug)]
pub struct InvoicesProjection<S>
where
    S: TenantStore<SalesInvoiceId, InvoiceReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> InvoicesProjection<S>
where
    S: TenantStore<SalesInvoiceId, InvoiceReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, invoice_id: &SalesInvoiceId) -> Option<InvoiceReadModel> {
        self.store.get(tenant_id, invoice_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<InvoiceReadModel> {
        self.store.list(tenant_id)
    }

    /// Apply a published envelope into the projection.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), InvoiceProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let Ok(mut cursors) = self.cursors.write() {
            let key = CursorKey { tenant_id, aggregate_id };
            let last = *cursors.get(&key).unwrap_or(&0);

            if seq == 0 {
                return Err(InvoiceProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(InvoiceProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: SalesInvoiceEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| InvoiceProjectionError::Deserialize(e.to_string()))?;

            let (event_tenant, invoice_id) = match &event {
                SalesInvoiceEvent::SalesInvoiceIssued(e) => (e.tenant_id, e.invoice_id),
                SalesInvoiceEvent::SalesInvoicePaymentRegistered(e) => (e.tenant_id, e.invoice_id),
                SalesInvoiceEvent::SalesInvoiceVoided(e) => (e.tenant_id, e.invoice_id),
            };

            if event_tenant != tenant_id {
                return Err(InvoiceProjectionError::TenantIsolation(
                    "event tenant_id does not match envelope tenant_id".to_string(),
                ));
            }

            if invoice_id.0 != aggregate_id {
                return Err(InvoiceProjectionError::TenantIsolation(
                    "event invoice_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                SalesInvoiceEvent::SalesInvoiceIssued(e) => {
                    self.store.upsert(
                        tenant_id,
                        e.invoice_id,
                        InvoiceReadModel {
                            invoice_id: e.invoice_id,
                            customer: e.customer,
                            contract: e.contract,
                            due_date: e.due_date,
                            total_cents: e.total_cents,
                            paid_cents: 0,
                            status: InvoiceStatus::Open,
                        },
                    );
                }
                SalesInvoiceEvent::SalesInvoicePaymentRegistered(e) => {
                    let mut rm = self
                        .store
                        .get(tenant_id, &invoice_id)
                        .ok_or(InvoiceProjectionError::UnknownInvoice(invoice_id))?;
                    rm.paid_cents = e.new_paid_cents;
                    if rm.paid_cents >= rm.total_cents {
                        rm.status = InvoiceStatus::Paid;
                    }
                    self.store.upsert(tenant_id, invoice_id, rm);
                }
                SalesInvoiceEvent::SalesInvoiceVoided(_) => {
                    let mut rm = self
                        .store
                        .get(tenant_id, &invoice_id)
                        .ok_or(InvoiceProjectionError::UnknownInvoice(invoice_id))?;
                    rm.status = InvoiceStatus::Void;
                    self.store.upsert(tenant_id, invoice_id, rm);
                }
            }

            cursors.insert(key, seq);
        }

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), InvoiceProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        {
            let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
            tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
            tenants.dedup();
            for t in tenants {
                self.store.clear_tenant(t);
            }
        }

        envs.sort_by_key(|e| {
            (
                *e.tenant_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}

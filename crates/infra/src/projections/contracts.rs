use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use agroflow_contracts::{
    ContractEvent, ContractId, ContractStatus, FulfilmentStatus, FulfilmentTerm, PartyType,
};
use agroflow_core::{AggregateId, TenantId};
use agroflow_events::EventEnvelope;

use crate::read_model::TenantStore;

/// Queryable contract read model, one row per contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractReadModel {
    pub contract_id: ContractId,
    pub party_type: PartyType,
    pub party_name: String,
    pub party_users: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_signed: bool,
    pub signee: Option<String>,
    pub requires_fulfilment: bool,
    pub fulfilment_deadline: Option<NaiveDate>,
    pub fulfilment_terms: Vec<FulfilmentTerm>,
    pub contract_display: String,
    pub status: ContractStatus,
    pub fulfilment_status: Option<FulfilmentStatus>,
    pub submitted: bool,
    pub sales_invoice: Option<AggregateId>,
    pub sales_invoice_status: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ContractReadModel {
    pub fn fulfilment_progress(&self) -> (usize, usize) {
        let done = self.fulfilment_terms.iter().filter(|t| t.fulfilled).count();
        (done, self.fulfilment_terms.len())
    }
}

/// Tenant+aggregate cursor to support at-least-once delivery (idempotent projection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum ContractProjectionError {
    #[error("failed to deserialize contract event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event for unknown contract {0}")]
    UnknownContract(ContractId),
}

/// Contract directory projection.
///
/// Consumes published envelopes and maintains a tenant-isolated read model
/// that backs the contract list endpoints and the status/invoicing jobs.
/// Read models are disposable and rebuildable from the event stream.
#[derive(Debug)]
pub struct ContractsProjection<S>
where
    S: TenantStore<ContractId, ContractReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> ContractsProjection<S>
where
    S: TenantStore<ContractId, ContractReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, contract_id: &ContractId) -> Option<ContractReadModel> {
        self.store.get(tenant_id, contract_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<ContractReadModel> {
        self.store.list(tenant_id)
    }

    /// Submitted contracts created within the status refresh window.
    pub fn refresh_candidates(
        &self,
        tenant_id: TenantId,
        now: DateTime<Utc>,
        window_days: i64,
    ) -> Vec<ContractReadModel> {
        let floor = now - Duration::days(window_days);
        self.store
            .list(tenant_id)
            .into_iter()
            .filter(|c| c.submitted && c.created_at >= floor)
            .collect()
    }

    /// Submitted customer contracts that lapsed and have no invoice yet.
    pub fn lapsed_without_invoice(&self, tenant_id: TenantId) -> Vec<ContractReadModel> {
        self.store
            .list(tenant_id)
            .into_iter()
            .filter(|c| {
                c.submitted
                    && c.party_type == PartyType::Customer
                    && c.start_date.is_some()
                    && c.fulfilment_status == Some(FulfilmentStatus::Lapsed)
                    && c.sales_invoice.is_none()
            })
            .collect()
    }

    /// Contracts with a linked sales invoice, for the status sync job.
    pub fn with_linked_invoice(&self, tenant_id: TenantId) -> Vec<ContractReadModel> {
        self.store
            .list(tenant_id)
            .into_iter()
            .filter(|c| c.sales_invoice.is_some())
            .collect()
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Enforces tenant isolation
    /// - Enforces monotonic sequence per (tenant, aggregate) stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ContractProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let Ok(mut cursors) = self.cursors.write() {
            let key = CursorKey { tenant_id, aggregate_id };
            let last = *cursors.get(&key).unwrap_or(&0);

            if seq == 0 {
                return Err(ContractProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(ContractProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: ContractEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| ContractProjectionError::Deserialize(e.to_string()))?;

            let (event_tenant, contract_id) = match &event {
                ContractEvent::ContractDrafted(e) => (e.tenant_id, e.contract_id),
                ContractEvent::ContractSigned(e) => (e.tenant_id, e.contract_id),
                ContractEvent::TermFulfilled(e) => (e.tenant_id, e.contract_id),
                ContractEvent::ContractSubmitted(e) => (e.tenant_id, e.contract_id),
                ContractEvent::StatusRefreshed(e) => (e.tenant_id, e.contract_id),
                ContractEvent::SalesInvoiceAttached(e) => (e.tenant_id, e.contract_id),
                ContractEvent::InvoiceStatusSynced(e) => (e.tenant_id, e.contract_id),
            };

            if event_tenant != tenant_id {
                return Err(ContractProjectionError::TenantIsolation(
                    "event tenant_id does not match envelope tenant_id".to_string(),
                ));
            }

            if contract_id.0 != aggregate_id {
                return Err(ContractProjectionError::TenantIsolation(
                    "event contract_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                ContractEvent::ContractDrafted(e) => {
                    self.store.upsert(
                        tenant_id,
                        e.contract_id,
                        ContractReadModel {
                            contract_id: e.contract_id,
                            party_type: e.party_type,
                            party_name: e.party_name,
                            party_users: e.party_users,
                            start_date: e.start_date,
                            end_date: e.end_date,
                            is_signed: false,
                            signee: None,
                            requires_fulfilment: e.requires_fulfilment,
                            fulfilment_deadline: e.fulfilment_deadline,
                            fulfilment_terms: e.fulfilment_terms,
                            contract_display: e.contract_display,
                            status: e.status,
                            fulfilment_status: e.fulfilment_status,
                            submitted: false,
                            sales_invoice: None,
                            sales_invoice_status: None,
                            created_at: e.occurred_at,
                        },
                    );
                }
                ContractEvent::ContractSigned(e) => {
                    let mut rm = self.row(tenant_id, contract_id)?;
                    rm.is_signed = true;
                    rm.signee = Some(e.signee);
                    rm.contract_display = e.contract_display;
                    rm.status = e.status;
                    self.store.upsert(tenant_id, contract_id, rm);
                }
                ContractEvent::TermFulfilled(e) => {
                    let mut rm = self.row(tenant_id, contract_id)?;
                    if let Some(term) = rm.fulfilment_terms.get_mut(e.term_index) {
                        term.fulfilled = true;
                    }
                    rm.fulfilment_status = e.fulfilment_status;
                    rm.status = e.status;
                    self.store.upsert(tenant_id, contract_id, rm);
                }
                ContractEvent::ContractSubmitted(e) => {
                    let mut rm = self.row(tenant_id, contract_id)?;
                    rm.submitted = true;
                    if e.fulfilment_cleared {
                        rm.fulfilment_terms.clear();
                        rm.fulfilment_deadline = None;
                        rm.fulfilment_status = None;
                    }
                    self.store.upsert(tenant_id, contract_id, rm);
                }
                ContractEvent::StatusRefreshed(e) => {
                    let mut rm = self.row(tenant_id, contract_id)?;
                    rm.status = e.status;
                    rm.fulfilment_status = e.fulfilment_status;
                    self.store.upsert(tenant_id, contract_id, rm);
                }
                ContractEvent::SalesInvoiceAttached(e) => {
                    let mut rm = self.row(tenant_id, contract_id)?;
                    rm.sales_invoice = Some(e.invoice_id);
                    self.store.upsert(tenant_id, contract_id, rm);
                }
                ContractEvent::InvoiceStatusSynced(e) => {
                    let mut rm = self.row(tenant_id, contract_id)?;
                    rm.sales_invoice_status = Some(e.status);
                    self.store.upsert(tenant_id, contract_id, rm);
                }
            }

            cursors.insert(key, seq);
        }

        Ok(())
    }

    fn row(
        &self,
        tenant_id: TenantId,
        contract_id: ContractId,
    ) -> Result<ContractReadModel, ContractProjectionError> {
        self.store
            .get(tenant_id, &contract_id)
            .ok_or(ContractProjectionError::UnknownContract(contract_id))
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ContractProjectionError> {
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

        // Deterministic replay order: tenant, aggregate, sequence.
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

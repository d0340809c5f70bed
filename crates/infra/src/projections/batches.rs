use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;

use agroflow_agriculture::{PlantBatchEvent, PlantBatchId, ProjectSchedule};
use agroflow_core::{AggregateId, TenantId};
use agroflow_events::EventEnvelope;

use crate::read_model::TenantStore;

/// Plant batch read model, one row per batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReadModel {
    pub batch_id: PlantBatchId,
    pub title: String,
    pub strain: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub plant_spacing_uom: Option<String>,
    pub project: Option<ProjectSchedule>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum BatchProjectionError {
    #[error("failed to deserialize plant batch event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event for unknown batch {0}")]
    UnknownBatch(PlantBatchId),
}

/// Plant batch projection backing the batch list endpoints.
#[derive(Debug)]
pub struct BatchesProjection<S>
where
    S: TenantStore<PlantBatchId, BatchReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> BatchesProjection<S>
where
    S: TenantStore<PlantBatchId, BatchReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, batch_id: &PlantBatchId) -> Option<BatchReadModel> {
        self.store.get(tenant_id, batch_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<BatchReadModel> {
        self.store.list(tenant_id)
    }

    /// Apply a published envelope into the projection.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), BatchProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let Ok(mut cursors) = self.cursors.write() {
            let key = CursorKey { tenant_id, aggregate_id };
            let last = *cursors.get(&key).unwrap_or(&0);

            if seq == 0 {
                return Err(BatchProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(BatchProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: PlantBatchEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| BatchProjectionError::Deserialize(e.to_string()))?;

            let (event_tenant, batch_id) = match &event {
                PlantBatchEvent::BatchPlanted(e) => (e.tenant_id, e.batch_id),
                PlantBatchEvent::CultivationScheduled(e) => (e.tenant_id, e.batch_id),
                PlantBatchEvent::BatchRescheduled(e) => (e.tenant_id, e.batch_id),
            };

            if event_tenant != tenant_id {
                return Err(BatchProjectionError::TenantIsolation(
                    "event tenant_id does not match envelope tenant_id".to_string(),
                ));
            }

            if batch_id.0 != aggregate_id {
                return Err(BatchProjectionError::TenantIsolation(
                    "event batch_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                PlantBatchEvent::BatchPlanted(e) => {
                    self.store.upsert(
                        tenant_id,
                        e.batch_id,
                        BatchReadModel {
                            batch_id: e.batch_id,
                            title: e.title,
                            strain: e.strain.name,
                            start_date: e.start_date,
                            end_date: e.end_date,
                            plant_spacing_uom: e.plant_spacing_uom,
                            project: None,
                        },
                    );
                }
                PlantBatchEvent::CultivationScheduled(e) => {
                    let mut rm = self
                        .store
                        .get(tenant_id, &batch_id)
                        .ok_or(BatchProjectionError::UnknownBatch(batch_id))?;
                    rm.project = Some(e.project);
                    self.store.upsert(tenant_id, batch_id, rm);
                }
                PlantBatchEvent::BatchRescheduled(e) => {
                    let mut rm = self
                        .store
                        .get(tenant_id, &batch_id)
                        .ok_or(BatchProjectionError::UnknownBatch(batch_id))?;
                    rm.start_date = e.start_date;
                    rm.end_date = e.end_date;
                    if e.project.is_some() {
                        rm.project = e.project;
                    }
                    self.store.upsert(tenant_id, batch_id, rm);
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
    ) -> Result<(), BatchProjectionError> {
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

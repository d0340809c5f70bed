use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use agroflow_core::{AggregateId, TenantId};
use agroflow_delivery::{DeliveryStop, DeliveryTripEvent, DeliveryTripId, TripStatus};
use agroflow_events::EventEnvelope;

use crate::read_model::TenantStore;

/// Queryable delivery trip read model, one row per trip.
#[derive(Debug, Clone, PartialEq)]
pub struct TripReadModel {
    pub trip_id: DeliveryTripId,
    pub driver_name: String,
    pub driver_email: Option<String>,
    pub vehicle: String,
    pub departure_time: DateTime<Utc>,
    pub status: TripStatus,
    pub stops: Vec<DeliveryStop>,
    pub package_total_cents: u64,
    pub total_distance_m: Option<u64>,
    pub actual_distance_m: Option<u64>,
    pub odometer_start: Option<u64>,
    pub odometer_end: Option<u64>,
    pub email_notification_sent: bool,
}

/// Delivery note side of a submitted trip: which driver and vehicle the
/// note travels with. Rows exist only while the note is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryNoteAssignment {
    pub delivery_note: AggregateId,
    pub trip_id: DeliveryTripId,
    pub driver_name: String,
    pub vehicle: String,
    pub departure_time: DateTime<Utc>,
    pub status: DeliveryNoteStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryNoteStatus {
    ToDeliver,
    Completed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum TripProjectionError {
    #[error("failed to deserialize delivery trip event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event for unknown trip {0}")]
    UnknownTrip(DeliveryTripId),
}

/// Delivery trip projection.
///
/// Maintains the trip list read model plus the delivery note assignment
/// view. Submitting a trip assigns its delivery notes to the driver and
/// vehicle; cancelling releases them; visiting a stop completes its note.
#[derive(Debug)]
pub struct TripsProjection<S, N>
where
    S: TenantStore<DeliveryTripId, TripReadModel>,
    N: TenantStore<AggregateId, DeliveryNoteAssignment>,
{
    store: S,
    notes: N,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S, N> TripsProjection<S, N>
where
    S: TenantStore<DeliveryTripId, TripReadModel>,
    N: TenantStore<AggregateId, DeliveryNoteAssignment>,
{
    pub fn new(store: S, notes: N) -> Self {
        Self {
            store,
            notes,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, trip_id: &DeliveryTripId) -> Option<TripReadModel> {
        self.store.get(tenant_id, trip_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<TripReadModel> {
        self.store.list(tenant_id)
    }

    pub fn note_assignment(
        &self,
        tenant_id: TenantId,
        delivery_note: &AggregateId,
    ) -> Option<DeliveryNoteAssignment> {
        self.notes.get(tenant_id, delivery_note)
    }

    /// Unvisited stops billed against a sales invoice, for the payment flow.
    pub fn unvisited_stops_for_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: AggregateId,
    ) -> Vec<(DeliveryTripId, usize)> {
        let mut hits = Vec::new();
        for trip in self.store.list(tenant_id) {
            for (idx, stop) in trip.stops.iter().enumerate() {
                if stop.sales_invoice == Some(invoice_id) && !stop.visited {
                    hits.push((trip.trip_id, idx));
                }
            }
        }
        hits
    }

    /// Apply a published envelope into the projection.
    ///
    /// Same delivery contract as the other projections: tenant isolation,
    /// strictly monotonic per-stream sequence, idempotent replays.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), TripProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let Ok(mut cursors) = self.cursors.write() {
            let key = CursorKey { tenant_id, aggregate_id };
            let last = *cursors.get(&key).unwrap_or(&0);

            if seq == 0 {
                return Err(TripProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(TripProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: DeliveryTripEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| TripProjectionError::Deserialize(e.to_string()))?;

            let (event_tenant, trip_id) = match &event {
                DeliveryTripEvent::TripPlanned(e) => (e.tenant_id, e.trip_id),
                DeliveryTripEvent::TripSubmitted(e) => (e.tenant_id, e.trip_id),
                DeliveryTripEvent::TripCancelled(e) => (e.tenant_id, e.trip_id),
                DeliveryTripEvent::RoutePlanned(e) => (e.tenant_id, e.trip_id),
                DeliveryTripEvent::StopVisited(e) => (e.tenant_id, e.trip_id),
                DeliveryTripEvent::TripStarted(e) => (e.tenant_id, e.trip_id),
                DeliveryTripEvent::TripPaused(e) => (e.tenant_id, e.trip_id),
                DeliveryTripEvent::TripResumed(e) => (e.tenant_id, e.trip_id),
                DeliveryTripEvent::TripEnded(e) => (e.tenant_id, e.trip_id),
                DeliveryTripEvent::CustomersNotified(e) => (e.tenant_id, e.trip_id),
            };

            if event_tenant != tenant_id {
                return Err(TripProjectionError::TenantIsolation(
                    "event tenant_id does not match envelope tenant_id".to_string(),
                ));
            }

            if trip_id.0 != aggregate_id {
                return Err(TripProjectionError::TenantIsolation(
                    "event trip_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                DeliveryTripEvent::TripPlanned(e) => {
                    self.store.upsert(
                        tenant_id,
                        e.trip_id,
                        TripReadModel {
                            trip_id: e.trip_id,
                            driver_name: e.driver_name,
                            driver_email: e.driver_email,
                            vehicle: e.vehicle,
                            departure_time: e.departure_time,
                            status: TripStatus::Draft,
                            stops: e.stops,
                            package_total_cents: e.package_total_cents,
                            total_distance_m: None,
                            actual_distance_m: None,
                            odometer_start: None,
                            odometer_end: None,
                            email_notification_sent: false,
                        },
                    );
                }
                DeliveryTripEvent::TripSubmitted(e) => {
                    let mut rm = self.row(tenant_id, trip_id)?;
                    rm.status = e.status;
                    for stop in &rm.stops {
                        if let Some(note) = stop.delivery_note {
                            self.notes.upsert(
                                tenant_id,
                                note,
                                DeliveryNoteAssignment {
                                    delivery_note: note,
                                    trip_id,
                                    driver_name: rm.driver_name.clone(),
                                    vehicle: rm.vehicle.clone(),
                                    departure_time: rm.departure_time,
                                    status: DeliveryNoteStatus::ToDeliver,
                                },
                            );
                        }
                    }
                    self.store.upsert(tenant_id, trip_id, rm);
                }
                DeliveryTripEvent::TripCancelled(_) => {
                    let mut rm = self.row(tenant_id, trip_id)?;
                    rm.status = TripStatus::Cancelled;
                    for stop in &rm.stops {
                        if let Some(note) = stop.delivery_note {
                            self.notes.remove(tenant_id, &note);
                        }
                    }
                    self.store.upsert(tenant_id, trip_id, rm);
                }
                DeliveryTripEvent::RoutePlanned(e) => {
                    let mut rm = self.row(tenant_id, trip_id)?;
                    let mut reordered = Vec::with_capacity(rm.stops.len());
                    for (new_pos, &old_pos) in e.plan.stop_order.iter().enumerate() {
                        let mut stop = rm.stops[old_pos].clone();
                        let est = &e.plan.stops[new_pos];
                        stop.estimated_arrival = est.estimated_arrival;
                        stop.distance_m = Some(est.distance_m);
                        stop.lat = Some(est.lat);
                        stop.lng = Some(est.lng);
                        reordered.push(stop);
                    }
                    rm.stops = reordered;
                    rm.total_distance_m = Some(e.plan.total_distance_m);
                    self.store.upsert(tenant_id, trip_id, rm);
                }
                DeliveryTripEvent::StopVisited(e) => {
                    let mut rm = self.row(tenant_id, trip_id)?;
                    if let Some(stop) = rm.stops.get_mut(e.stop_index) {
                        stop.visited = true;
                        stop.paid_amount_cents = e.paid_amount_cents;
                        if let Some(note) = stop.delivery_note {
                            if let Some(mut assignment) = self.notes.get(tenant_id, &note) {
                                assignment.status = DeliveryNoteStatus::Completed;
                                self.notes.upsert(tenant_id, note, assignment);
                            }
                        }
                    }
                    rm.status = e.status;
                    self.store.upsert(tenant_id, trip_id, rm);
                }
                DeliveryTripEvent::TripStarted(e) => {
                    let mut rm = self.row(tenant_id, trip_id)?;
                    rm.status = TripStatus::InTransit;
                    rm.odometer_start = Some(e.odometer_value);
                    self.store.upsert(tenant_id, trip_id, rm);
                }
                DeliveryTripEvent::TripPaused(_) => {
                    let mut rm = self.row(tenant_id, trip_id)?;
                    rm.status = TripStatus::Paused;
                    self.store.upsert(tenant_id, trip_id, rm);
                }
                DeliveryTripEvent::TripResumed(_) => {
                    let mut rm = self.row(tenant_id, trip_id)?;
                    rm.status = TripStatus::InTransit;
                    self.store.upsert(tenant_id, trip_id, rm);
                }
                DeliveryTripEvent::TripEnded(e) => {
                    let mut rm = self.row(tenant_id, trip_id)?;
                    rm.status = TripStatus::Completed;
                    rm.odometer_end = Some(e.odometer_value);
                    rm.actual_distance_m = Some(e.actual_distance);
                    self.store.upsert(tenant_id, trip_id, rm);
                }
                DeliveryTripEvent::CustomersNotified(e) => {
                    let mut rm = self.row(tenant_id, trip_id)?;
                    for n in &e.notifications {
                        if let Some(stop) = rm.stops.get_mut(n.stop_index) {
                            stop.email_sent_to = Some(n.email.clone());
                        }
                    }
                    rm.email_notification_sent = true;
                    self.store.upsert(tenant_id, trip_id, rm);
                }
            }

            cursors.insert(key, seq);
        }

        Ok(())
    }

    fn row(
        &self,
        tenant_id: TenantId,
        trip_id: DeliveryTripId,
    ) -> Result<TripReadModel, TripProjectionError> {
        self.store
            .get(tenant_id, &trip_id)
            .ok_or(TripProjectionError::UnknownTrip(trip_id))
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), TripProjectionError> {
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
                self.notes.clear_tenant(t);
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

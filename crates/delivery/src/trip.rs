use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agroflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use agroflow_events::Event;

use crate::routing::RoutePlan;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryTripId(pub AggregateId);

impl DeliveryTripId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DeliveryTripId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Draft,
    Scheduled,
    InTransit,
    Paused,
    Completed,
    Cancelled,
}

/// Derive a trip's status from its lifecycle flags and stop visits.
///
/// `Completed` iff every stop is visited, `InTransit` iff some are; a
/// submitted trip without visits is `Scheduled`. The trip console layers
/// `InTransit`/`Paused` on top through its own events.
pub fn trip_status(submitted: bool, cancelled: bool, visited: &[bool]) -> TripStatus {
    if cancelled {
        return TripStatus::Cancelled;
    }
    if !submitted {
        return TripStatus::Draft;
    }
    if !visited.is_empty() && visited.iter().all(|v| *v) {
        TripStatus::Completed
    } else if visited.iter().any(|v| *v) {
        TripStatus::InTransit
    } else {
        TripStatus::Scheduled
    }
}

/// Unit for reporting driving distances. Distances are stored in metres;
/// conversion happens at read time only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUom {
    Meter,
    Kilometer,
    Mile,
}

impl DistanceUom {
    pub fn from_meters(self, meters: u64) -> f64 {
        match self {
            DistanceUom::Meter => meters as f64,
            DistanceUom::Kilometer => meters as f64 / 1_000.0,
            DistanceUom::Mile => meters as f64 / 1_609.344,
        }
    }
}

/// One delivery stop on a trip, in driving order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStop {
    pub customer: String,
    pub address: String,
    pub contact_email: Option<String>,
    pub delivery_note: Option<AggregateId>,
    pub sales_invoice: Option<AggregateId>,
    pub grand_total_cents: u64,
    /// A locked stop ends a route leg: the optimizer may not move it.
    pub lock: bool,
    pub visited: bool,
    pub paid_amount_cents: Option<u64>,
    pub email_sent_to: Option<String>,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub distance_m: Option<u64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Stop fields supplied at trip creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopInput {
    pub customer: String,
    pub address: String,
    pub contact_email: Option<String>,
    pub delivery_note: Option<AggregateId>,
    pub sales_invoice: Option<AggregateId>,
    pub grand_total_cents: u64,
    pub lock: bool,
}

impl StopInput {
    fn into_stop(self) -> DeliveryStop {
        DeliveryStop {
            customer: self.customer,
            address: self.address,
            contact_email: self.contact_email,
            delivery_note: self.delivery_note,
            sales_invoice: self.sales_invoice,
            grand_total_cents: self.grand_total_cents,
            lock: self.lock,
            visited: false,
            paid_amount_cents: None,
            email_sent_to: None,
            estimated_arrival: None,
            distance_m: None,
            lat: None,
            lng: None,
        }
    }
}

/// One driving interval on the driver's timesheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLog {
    pub from_time: DateTime<Utc>,
    pub to_time: Option<DateTime<Utc>>,
}

/// Aggregate root: DeliveryTrip.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryTrip {
    id: DeliveryTripId,
    tenant_id: Option<TenantId>,
    driver_name: String,
    driver_email: Option<String>,
    cell_number: Option<String>,
    driver_address: Option<String>,
    vehicle: String,
    departure_time: DateTime<Utc>,
    stops: Vec<DeliveryStop>,
    package_total_cents: u64,
    total_distance_m: Option<u64>,
    status: TripStatus,
    submitted: bool,
    cancelled: bool,
    odometer_start: Option<u64>,
    odometer_start_time: Option<DateTime<Utc>>,
    odometer_end: Option<u64>,
    odometer_end_time: Option<DateTime<Utc>>,
    actual_distance: Option<u64>,
    time_logs: Vec<TimeLog>,
    email_notification_sent: bool,
    version: u64,
    created: bool,
}

impl DeliveryTrip {
    pub fn empty(id: DeliveryTripId) -> Self {
        Self {
            id,
            tenant_id: None,
            driver_name: String::new(),
            driver_email: None,
            cell_number: None,
            driver_address: None,
            vehicle: String::new(),
            departure_time: DateTime::<Utc>::MIN_UTC,
            stops: Vec::new(),
            package_total_cents: 0,
            total_distance_m: None,
            status: TripStatus::Draft,
            submitted: false,
            cancelled: false,
            odometer_start: None,
            odometer_start_time: None,
            odometer_end: None,
            odometer_end_time: None,
            actual_distance: None,
            time_logs: Vec::new(),
            email_notification_sent: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DeliveryTripId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn driver_email(&self) -> Option<&str> {
        self.driver_email.as_deref()
    }

    pub fn cell_number(&self) -> Option<&str> {
        self.cell_number.as_deref()
    }

    pub fn driver_address(&self) -> Option<&str> {
        self.driver_address.as_deref()
    }

    pub fn vehicle(&self) -> &str {
        &self.vehicle
    }

    pub fn departure_time(&self) -> DateTime<Utc> {
        self.departure_time
    }

    pub fn stops(&self) -> &[DeliveryStop] {
        &self.stops
    }

    pub fn package_total_cents(&self) -> u64 {
        self.package_total_cents
    }

    pub fn total_distance_m(&self) -> Option<u64> {
        self.total_distance_m
    }

    pub fn status(&self) -> TripStatus {
        self.status
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn odometer_start(&self) -> Option<u64> {
        self.odometer_start
    }

    pub fn odometer_end(&self) -> Option<u64> {
        self.odometer_end
    }

    pub fn actual_distance(&self) -> Option<u64> {
        self.actual_distance
    }

    pub fn total_distance_in(&self, uom: DistanceUom) -> Option<f64> {
        self.total_distance_m.map(|m| uom.from_meters(m))
    }

    pub fn time_logs(&self) -> &[TimeLog] {
        &self.time_logs
    }

    pub fn email_notification_sent(&self) -> bool {
        self.email_notification_sent
    }

    fn visited_flags(&self) -> Vec<bool> {
        self.stops.iter().map(|s| s.visited).collect()
    }

    fn open_time_log(&self) -> Option<&TimeLog> {
        self.time_logs.last().filter(|log| log.to_time.is_none())
    }
}

impl AggregateRoot for DeliveryTrip {
    type Id = DeliveryTripId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDeliveryTrip {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub driver_name: String,
    pub driver_email: Option<String>,
    pub cell_number: Option<String>,
    pub driver_address: Option<String>,
    pub vehicle: String,
    pub departure_time: DateTime<Utc>,
    pub stops: Vec<StopInput>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitTrip {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTrip {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub occurred_at: DateTime<Utc>,
}

/// Apply a computed route plan: reorder stops and record their estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyRoutePlan {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub plan: RoutePlan,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkStopVisited {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub stop_index: usize,
    pub paid_amount_cents: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartTrip {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub odometer_value: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseTrip {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeTrip {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndTrip {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub odometer_value: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Record which stop contacts were emailed by the dispatch notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkCustomersNotified {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub notifications: Vec<StopNotification>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopNotification {
    pub stop_index: usize,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeliveryTripCommand {
    CreateDeliveryTrip(CreateDeliveryTrip),
    SubmitTrip(SubmitTrip),
    CancelTrip(CancelTrip),
    ApplyRoutePlan(ApplyRoutePlan),
    MarkStopVisited(MarkStopVisited),
    StartTrip(StartTrip),
    PauseTrip(PauseTrip),
    ResumeTrip(ResumeTrip),
    EndTrip(EndTrip),
    MarkCustomersNotified(MarkCustomersNotified),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPlanned {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub driver_name: String,
    pub driver_email: Option<String>,
    pub cell_number: Option<String>,
    pub driver_address: Option<String>,
    pub vehicle: String,
    pub departure_time: DateTime<Utc>,
    pub stops: Vec<DeliveryStop>,
    pub package_total_cents: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripSubmitted {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub status: TripStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripCancelled {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlanned {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub plan: RoutePlan,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopVisited {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub stop_index: usize,
    pub paid_amount_cents: Option<u64>,
    pub status: TripStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripStarted {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub odometer_value: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripPaused {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripResumed {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripEnded {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub odometer_value: u64,
    pub actual_distance: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomersNotified {
    pub tenant_id: TenantId,
    pub trip_id: DeliveryTripId,
    pub notifications: Vec<StopNotification>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeliveryTripEvent {
    TripPlanned(TripPlanned),
    TripSubmitted(TripSubmitted),
    TripCancelled(TripCancelled),
    RoutePlanned(RoutePlanned),
    StopVisited(StopVisited),
    TripStarted(TripStarted),
    TripPaused(TripPaused),
    TripResumed(TripResumed),
    TripEnded(TripEnded),
    CustomersNotified(CustomersNotified),
}

impl Event for DeliveryTripEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DeliveryTripEvent::TripPlanned(_) => "delivery.trip.planned",
            DeliveryTripEvent::TripSubmitted(_) => "delivery.trip.submitted",
            DeliveryTripEvent::TripCancelled(_) => "delivery.trip.cancelled",
            DeliveryTripEvent::RoutePlanned(_) => "delivery.trip.route_planned",
            DeliveryTripEvent::StopVisited(_) => "delivery.trip.stop_visited",
            DeliveryTripEvent::TripStarted(_) => "delivery.trip.started",
            DeliveryTripEvent::TripPaused(_) => "delivery.trip.paused",
            DeliveryTripEvent::TripResumed(_) => "delivery.trip.resumed",
            DeliveryTripEvent::TripEnded(_) => "delivery.trip.ended",
            DeliveryTripEvent::CustomersNotified(_) => "delivery.trip.customers_notified",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DeliveryTripEvent::TripPlanned(e) => e.occurred_at,
            DeliveryTripEvent::TripSubmitted(e) => e.occurred_at,
            DeliveryTripEvent::TripCancelled(e) => e.occurred_at,
            DeliveryTripEvent::RoutePlanned(e) => e.occurred_at,
            DeliveryTripEvent::StopVisited(e) => e.occurred_at,
            DeliveryTripEvent::TripStarted(e) => e.occurred_at,
            DeliveryTripEvent::TripPaused(e) => e.occurred_at,
            DeliveryTripEvent::TripResumed(e) => e.occurred_at,
            DeliveryTripEvent::TripEnded(e) => e.occurred_at,
            DeliveryTripEvent::CustomersNotified(e) => e.occurred_at,
        }
    }
}

impl Aggregate for DeliveryTrip {
    type Command = DeliveryTripCommand;
    type Event = DeliveryTripEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DeliveryTripEvent::TripPlanned(e) => {
                self.id = e.trip_id;
                self.tenant_id = Some(e.tenant_id);
                self.driver_name = e.driver_name.clone();
                self.driver_email = e.driver_email.clone();
                self.cell_number = e.cell_number.clone();
                self.driver_address = e.driver_address.clone();
                self.vehicle = e.vehicle.clone();
                self.departure_time = e.departure_time;
                self.stops = e.stops.clone();
                self.package_total_cents = e.package_total_cents;
                self.created = true;
            }
            DeliveryTripEvent::TripSubmitted(e) => {
                self.submitted = true;
                self.status = e.status;
            }
            DeliveryTripEvent::TripCancelled(_) => {
                self.cancelled = true;
                self.status = TripStatus::Cancelled;
            }
            DeliveryTripEvent::RoutePlanned(e) => {
                let reordered: Vec<DeliveryStop> = e
                    .plan
                    .stop_order
                    .iter()
                    .zip(e.plan.stops.iter())
                    .filter_map(|(&original, estimate)| {
                        self.stops.get(original).map(|stop| {
                            let mut stop = stop.clone();
                            stop.estimated_arrival = estimate.estimated_arrival;
                            stop.distance_m = Some(estimate.distance_m);
                            stop.lat = Some(estimate.lat);
                            stop.lng = Some(estimate.lng);
                            stop
                        })
                    })
                    .collect();
                if reordered.len() == self.stops.len() {
                    self.stops = reordered;
                }
                self.total_distance_m = Some(e.plan.total_distance_m);
            }
            DeliveryTripEvent::StopVisited(e) => {
                if let Some(stop) = self.stops.get_mut(e.stop_index) {
                    stop.visited = true;
                    stop.paid_amount_cents = e.paid_amount_cents;
                }
                self.status = e.status;
            }
            DeliveryTripEvent::TripStarted(e) => {
                self.odometer_start = Some(e.odometer_value);
                self.odometer_start_time = Some(e.occurred_at);
                self.time_logs.push(TimeLog {
                    from_time: e.occurred_at,
                    to_time: None,
                });
                self.status = TripStatus::InTransit;
            }
            DeliveryTripEvent::TripPaused(e) => {
                if let Some(log) = self.time_logs.last_mut() {
                    if log.to_time.is_none() {
                        log.to_time = Some(e.occurred_at);
                    }
                }
                self.status = TripStatus::Paused;
            }
            DeliveryTripEvent::TripResumed(e) => {
                self.time_logs.push(TimeLog {
                    from_time: e.occurred_at,
                    to_time: None,
                });
                self.status = TripStatus::InTransit;
            }
            DeliveryTripEvent::TripEnded(e) => {
                if let Some(log) = self.time_logs.last_mut() {
                    if log.to_time.is_none() {
                        log.to_time = Some(e.occurred_at);
                    }
                }
                self.odometer_end = Some(e.odometer_value);
                self.odometer_end_time = Some(e.occurred_at);
                self.actual_distance = Some(e.actual_distance);
                self.status = TripStatus::Completed;
            }
            DeliveryTripEvent::CustomersNotified(e) => {
                for notification in &e.notifications {
                    if let Some(stop) = self.stops.get_mut(notification.stop_index) {
                        stop.email_sent_to = Some(notification.email.clone());
                    }
                }
                self.email_notification_sent = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DeliveryTripCommand::CreateDeliveryTrip(cmd) => self.handle_create(cmd),
            DeliveryTripCommand::SubmitTrip(cmd) => self.handle_submit(cmd),
            DeliveryTripCommand::CancelTrip(cmd) => self.handle_cancel(cmd),
            DeliveryTripCommand::ApplyRoutePlan(cmd) => self.handle_apply_route_plan(cmd),
            DeliveryTripCommand::MarkStopVisited(cmd) => self.handle_mark_visited(cmd),
            DeliveryTripCommand::StartTrip(cmd) => self.handle_start(cmd),
            DeliveryTripCommand::PauseTrip(cmd) => self.handle_pause(cmd),
            DeliveryTripCommand::ResumeTrip(cmd) => self.handle_resume(cmd),
            DeliveryTripCommand::EndTrip(cmd) => self.handle_end(cmd),
            DeliveryTripCommand::MarkCustomersNotified(cmd) => self.handle_notified(cmd),
        }
    }
}

impl DeliveryTrip {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_submitted(&self) -> Result<(), DomainError> {
        if !self.submitted {
            return Err(DomainError::invariant("trip is not submitted"));
        }
        if self.cancelled {
            return Err(DomainError::invariant("trip is cancelled"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateDeliveryTrip) -> Result<Vec<DeliveryTripEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("delivery trip already exists"));
        }

        if cmd.stops.is_empty() {
            return Err(DomainError::validation("a trip needs at least one stop"));
        }

        for (index, stop) in cmd.stops.iter().enumerate() {
            if stop.address.trim().is_empty() {
                return Err(DomainError::validation(format!(
                    "stop {} has no address",
                    index + 1
                )));
            }
        }

        let stops: Vec<DeliveryStop> = cmd.stops.iter().cloned().map(StopInput::into_stop).collect();
        let package_total_cents = stops.iter().map(|s| s.grand_total_cents).sum();

        Ok(vec![DeliveryTripEvent::TripPlanned(TripPlanned {
            tenant_id: cmd.tenant_id,
            trip_id: cmd.trip_id,
            driver_name: cmd.driver_name.clone(),
            driver_email: cmd.driver_email.clone(),
            cell_number: cmd.cell_number.clone(),
            driver_address: cmd.driver_address.clone(),
            vehicle: cmd.vehicle.clone(),
            departure_time: cmd.departure_time,
            stops,
            package_total_cents,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &SubmitTrip) -> Result<Vec<DeliveryTripEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.submitted {
            return Err(DomainError::conflict("trip is already submitted"));
        }
        if self.cancelled {
            return Err(DomainError::invariant("trip is cancelled"));
        }

        let status = trip_status(true, false, &self.visited_flags());

        Ok(vec![DeliveryTripEvent::TripSubmitted(TripSubmitted {
            tenant_id: cmd.tenant_id,
            trip_id: cmd.trip_id,
            status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelTrip) -> Result<Vec<DeliveryTripEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if !self.submitted {
            return Err(DomainError::invariant("only submitted trips can be cancelled"));
        }
        if self.cancelled {
            return Err(DomainError::conflict("trip is already cancelled"));
        }

        Ok(vec![DeliveryTripEvent::TripCancelled(TripCancelled {
            tenant_id: cmd.tenant_id,
            trip_id: cmd.trip_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply_route_plan(
        &self,
        cmd: &ApplyRoutePlan,
    ) -> Result<Vec<DeliveryTripEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;

        let plan = &cmd.plan;

        if plan.stop_order.len() != self.stops.len() || plan.stops.len() != self.stops.len() {
            return Err(DomainError::validation(
                "route plan does not cover every stop",
            ));
        }

        // The order must be a permutation of the current stop indexes.
        let mut seen = vec![false; self.stops.len()];
        for &index in &plan.stop_order {
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(DomainError::validation(
                        "route plan stop order is not a permutation",
                    ));
                }
            }
        }

        Ok(vec![DeliveryTripEvent::RoutePlanned(RoutePlanned {
            tenant_id: cmd.tenant_id,
            trip_id: cmd.trip_id,
            plan: plan.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_visited(
        &self,
        cmd: &MarkStopVisited,
    ) -> Result<Vec<DeliveryTripEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_submitted()?;

        let stop = self
            .stops
            .get(cmd.stop_index)
            .ok_or_else(|| DomainError::validation("no such delivery stop"))?;

        if stop.visited {
            return Err(DomainError::conflict("stop is already visited"));
        }

        let mut visited = self.visited_flags();
        visited[cmd.stop_index] = true;
        let status = trip_status(true, false, &visited);

        Ok(vec![DeliveryTripEvent::StopVisited(StopVisited {
            tenant_id: cmd.tenant_id,
            trip_id: cmd.trip_id,
            stop_index: cmd.stop_index,
            paid_amount_cents: cmd.paid_amount_cents,
            status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start(&self, cmd: &StartTrip) -> Result<Vec<DeliveryTripEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_submitted()?;

        if self.odometer_start.is_some() {
            return Err(DomainError::conflict("trip has already started"));
        }

        Ok(vec![DeliveryTripEvent::TripStarted(TripStarted {
            tenant_id: cmd.tenant_id,
            trip_id: cmd.trip_id,
            odometer_value: cmd.odometer_value,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_pause(&self, cmd: &PauseTrip) -> Result<Vec<DeliveryTripEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_submitted()?;

        if self.open_time_log().is_none() {
            return Err(DomainError::invariant("trip is not running"));
        }

        Ok(vec![DeliveryTripEvent::TripPaused(TripPaused {
            tenant_id: cmd.tenant_id,
            trip_id: cmd.trip_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_resume(&self, cmd: &ResumeTrip) -> Result<Vec<DeliveryTripEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_submitted()?;

        if self.odometer_start.is_none() {
            return Err(DomainError::invariant("trip has not started"));
        }
        if self.odometer_end.is_some() {
            return Err(DomainError::invariant("trip has already ended"));
        }
        if self.open_time_log().is_some() {
            return Err(DomainError::conflict("trip is already running"));
        }

        Ok(vec![DeliveryTripEvent::TripResumed(TripResumed {
            tenant_id: cmd.tenant_id,
            trip_id: cmd.trip_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_end(&self, cmd: &EndTrip) -> Result<Vec<DeliveryTripEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_submitted()?;

        let start = self
            .odometer_start
            .ok_or_else(|| DomainError::invariant("trip has not started"))?;

        if self.odometer_end.is_some() {
            return Err(DomainError::conflict("trip has already ended"));
        }

        if cmd.odometer_value < start {
            return Err(DomainError::validation(
                "odometer end reading is below the start reading",
            ));
        }

        Ok(vec![DeliveryTripEvent::TripEnded(TripEnded {
            tenant_id: cmd.tenant_id,
            trip_id: cmd.trip_id,
            odometer_value: cmd.odometer_value,
            actual_distance: cmd.odometer_value - start,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_notified(
        &self,
        cmd: &MarkCustomersNotified,
    ) -> Result<Vec<DeliveryTripEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;

        // Nothing was sent, nothing to record.
        if cmd.notifications.is_empty() {
            return Ok(vec![]);
        }

        for notification in &cmd.notifications {
            if notification.stop_index >= self.stops.len() {
                return Err(DomainError::validation("no such delivery stop"));
            }
        }

        Ok(vec![DeliveryTripEvent::CustomersNotified(
            CustomersNotified {
                tenant_id: cmd.tenant_id,
                trip_id: cmd.trip_id,
                notifications: cmd.notifications.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

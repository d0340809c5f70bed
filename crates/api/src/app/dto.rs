use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use agroflow_agriculture::{CultivationTaskSpec, StrainSnapshot};
use agroflow_core::AggregateId;
use agroflow_delivery::StopInput;
use agroflow_infra::projections::{
    BatchReadModel, ContractReadModel, InvoiceReadModel, TripReadModel,
};

use crate::app::errors;
use axum::http::StatusCode;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateContractRequest {
    pub party_type: String,
    pub party_name: String,
    #[serde(default)]
    pub party_users: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub requires_fulfilment: bool,
    pub fulfilment_deadline: Option<NaiveDate>,
    #[serde(default)]
    pub fulfilment_requirements: Vec<String>,
    pub contract_terms: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct SignContractRequest {
    /// Defaults to the acting user's email when omitted.
    pub signee: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ShareContractRequest {
    /// Defaults to the contract's party users when omitted.
    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct StrainRequest {
    pub name: String,
    pub period_days: i64,
    pub plant_spacing_uom: Option<String>,
    #[serde(default)]
    pub cultivation_tasks: Vec<CultivationTaskRequest>,
}

#[derive(Debug, Deserialize)]
pub struct CultivationTaskRequest {
    pub subject: String,
    pub start_offset_days: i64,
    pub duration_days: i64,
}

impl StrainRequest {
    pub fn into_snapshot(self) -> StrainSnapshot {
        StrainSnapshot {
            name: self.name,
            period_days: self.period_days,
            plant_spacing_uom: self.plant_spacing_uom,
            cultivation_tasks: self
                .cultivation_tasks
                .into_iter()
                .map(|t| CultivationTaskSpec {
                    subject: t.subject,
                    start_offset_days: t.start_offset_days,
                    duration_days: t.duration_days,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    pub title: String,
    pub strain: StrainRequest,
    pub start_date: NaiveDate,
    pub plant_spacing_uom: Option<String>,
    pub location: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleBatchRequest {
    pub start_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct CreateTripRequest {
    pub driver_name: String,
    pub driver_email: Option<String>,
    pub cell_number: Option<String>,
    pub driver_address: Option<String>,
    pub vehicle: String,
    pub departure_time: DateTime<Utc>,
    pub stops: Vec<StopRequest>,
}

#[derive(Debug, Deserialize)]
pub struct StopRequest {
    pub customer: String,
    pub address: String,
    pub contact_email: Option<String>,
    pub delivery_note: Option<String>,
    pub sales_invoice: Option<String>,
    #[serde(default)]
    pub grand_total_cents: u64,
    #[serde(default)]
    pub lock: bool,
}

impl StopRequest {
    pub fn into_stop_input(self) -> Result<StopInput, axum::response::Response> {
        let delivery_note = parse_optional_id(self.delivery_note, "delivery_note")?;
        let sales_invoice = parse_optional_id(self.sales_invoice, "sales_invoice")?;
        Ok(StopInput {
            customer: self.customer,
            address: self.address,
            contact_email: self.contact_email,
            delivery_note,
            sales_invoice,
            grand_total_cents: self.grand_total_cents,
            lock: self.lock,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct VisitStopRequest {
    pub paid_amount_cents: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ConsoleRequest {
    /// One of `start`, `pause`, `continue`, `end`.
    pub action: String,
    pub odometer_value: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub sales_invoice: String,
    pub amount_cents: u64,
    /// Defaults to today.
    pub reference_date: Option<NaiveDate>,
}

pub fn parse_id(raw: &str, field: &'static str) -> Result<AggregateId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {field}"))
    })
}

fn parse_optional_id(
    raw: Option<String>,
    field: &'static str,
) -> Result<Option<AggregateId>, axum::response::Response> {
    match raw {
        Some(s) => parse_id(&s, field).map(Some),
        None => Ok(None),
    }
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn contract_to_json(rm: ContractReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.contract_id.0.to_string(),
        "party_type": rm.party_type,
        "party_name": rm.party_name,
        "party_users": rm.party_users,
        "start_date": rm.start_date,
        "end_date": rm.end_date,
        "is_signed": rm.is_signed,
        "signee": rm.signee,
        "requires_fulfilment": rm.requires_fulfilment,
        "fulfilment_deadline": rm.fulfilment_deadline,
        "fulfilment_terms": rm.fulfilment_terms,
        "contract_display": rm.contract_display,
        "status": rm.status,
        "fulfilment_status": rm.fulfilment_status,
        "submitted": rm.submitted,
        "sales_invoice": rm.sales_invoice.map(|id| id.to_string()),
        "sales_invoice_status": rm.sales_invoice_status,
    })
}

pub fn batch_to_json(rm: BatchReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.batch_id.0.to_string(),
        "title": rm.title,
        "strain": rm.strain,
        "start_date": rm.start_date,
        "end_date": rm.end_date,
        "plant_spacing_uom": rm.plant_spacing_uom,
        "project": rm.project,
    })
}

pub fn trip_to_json(rm: TripReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.trip_id.0.to_string(),
        "driver_name": rm.driver_name,
        "driver_email": rm.driver_email,
        "vehicle": rm.vehicle,
        "departure_time": rm.departure_time.to_rfc3339(),
        "status": rm.status,
        "package_total_cents": rm.package_total_cents,
        "total_distance_m": rm.total_distance_m,
        "actual_distance_m": rm.actual_distance_m,
        "odometer_start": rm.odometer_start,
        "odometer_end": rm.odometer_end,
        "email_notification_sent": rm.email_notification_sent,
        "stops": rm.stops.into_iter().map(|s| serde_json::json!({
            "customer": s.customer,
            "address": s.address,
            "contact_email": s.contact_email,
            "delivery_note": s.delivery_note.map(|id| id.to_string()),
            "sales_invoice": s.sales_invoice.map(|id| id.to_string()),
            "grand_total_cents": s.grand_total_cents,
            "lock": s.lock,
            "visited": s.visited,
            "paid_amount_cents": s.paid_amount_cents,
            "email_sent_to": s.email_sent_to,
            "estimated_arrival": s.estimated_arrival.map(|t| t.to_rfc3339()),
            "distance_m": s.distance_m,
            "lat": s.lat,
            "lng": s.lng,
        })).collect::<Vec<_>>(),
    })
}

pub fn invoice_to_json(rm: InvoiceReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.invoice_id.0.to_string(),
        "customer": rm.customer,
        "contract": rm.contract.map(|id| id.to_string()),
        "due_date": rm.due_date,
        "total_cents": rm.total_cents,
        "paid_cents": rm.paid_cents,
        "status": rm.status.as_str(),
    })
}

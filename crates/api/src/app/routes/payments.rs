use std::sync::Arc;

use axum::{
    extract::Extension, http::StatusCode, response::IntoResponse, Json,
};
use chrono::Utc;

use agroflow_delivery::{DeliveryTrip, DeliveryTripCommand, MarkStopVisited};
use agroflow_infra::aggregate_types;
use agroflow_infra::command_dispatcher::DispatchError;
use agroflow_invoicing::{
    make_payment_entry, RegisterPayment, SalesInvoice, SalesInvoiceCommand, SalesInvoiceId,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

/// Record a payment against an invoice, then mark the delivery stops that
/// carry that invoice as visited with the paid amount.
pub async fn make_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::PaymentRequest>,
) -> axum::response::Response {
    let invoice_agg = match dto::parse_id(&body.sales_invoice, "sales_invoice") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let invoice_id = SalesInvoiceId::new(invoice_agg);

    let now = Utc::now();
    let reference_date = body.reference_date.unwrap_or_else(|| now.date_naive());

    let entry = match make_payment_entry(
        tenant.tenant_id(),
        invoice_id,
        body.amount_cents,
        reference_date,
        now,
    ) {
        Ok(entry) => entry,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        }
    };

    if entry.is_some() {
        let cmd = SalesInvoiceCommand::RegisterPayment(RegisterPayment {
            tenant_id: tenant.tenant_id(),
            invoice_id,
            amount_cents: body.amount_cents,
            occurred_at: now,
        });
        match services.dispatcher.dispatch::<SalesInvoice>(
            tenant.tenant_id(),
            invoice_agg,
            aggregate_types::SALES_INVOICE,
            cmd,
            |_t, id| SalesInvoice::empty(SalesInvoiceId::new(id)),
        ) {
            Ok(_) => {}
            // Invoices issued outside this system are not event-sourced
            // here; the stop sync below still applies to them.
            Err(DispatchError::NotFound) => {}
            Err(e) => return errors::dispatch_error_to_response(e),
        }
    }

    // Payment sync: unvisited stops linked to this invoice get marked
    // visited with the paid amount, zero amounts included.
    let hits = services
        .projections
        .trips
        .unvisited_stops_for_invoice(tenant.tenant_id(), invoice_agg);

    let mut stops_marked = 0usize;
    for (trip_id, stop_index) in &hits {
        let cmd = DeliveryTripCommand::MarkStopVisited(MarkStopVisited {
            tenant_id: tenant.tenant_id(),
            trip_id: *trip_id,
            stop_index: *stop_index,
            paid_amount_cents: Some(body.amount_cents),
            occurred_at: Utc::now(),
        });
        match services.dispatcher.dispatch::<DeliveryTrip>(
            tenant.tenant_id(),
            trip_id.0,
            aggregate_types::DELIVERY_TRIP,
            cmd,
            |_t, id| DeliveryTrip::empty(agroflow_delivery::DeliveryTripId::new(id)),
        ) {
            Ok(_) => stops_marked += 1,
            Err(e) => return errors::dispatch_error_to_response(e),
        }
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "sales_invoice": invoice_agg.to_string(),
            "payment_entry": entry,
            "stops_marked": stops_marked,
        })),
    )
        .into_response()
}

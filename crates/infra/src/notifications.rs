//! Customer-facing notification emails.

use chrono::NaiveDate;
use serde_json::json;
use tracing::info;

use agroflow_core::{template, TenantId};
use agroflow_delivery::StopNotification;

use crate::mailer::{EmailMessage, MailError, Mailer};
use crate::projections::TripReadModel;

/// Default body for the dispatch notification email. Tenants can override
/// it with any template using the same placeholders.
pub const DEFAULT_DISPATCH_TEMPLATE: &str = "Dear {{ stop.customer }},\n\n\
Your delivery is on its way. {{ trip.driver_name }} will arrive at \
{{ stop.address }} with vehicle {{ trip.vehicle }}.\n\
Estimated arrival: {{ stop.estimated_arrival }}.\n";

/// Email each stop's contact about the upcoming delivery.
///
/// Stops without a contact email are skipped. Returns the notification
/// list to be recorded on the trip via `MarkCustomersNotified`; an empty
/// return means no stop had a reachable contact.
pub fn notify_customers<M: Mailer>(
    tenant_id: TenantId,
    trip: &TripReadModel,
    template_body: &str,
    mailer: &M,
) -> Result<Vec<StopNotification>, MailError> {
    let mut notified = Vec::new();

    for (stop_index, stop) in trip.stops.iter().enumerate() {
        let Some(email) = stop.contact_email.clone() else {
            continue;
        };

        let context = json!({
            "trip": {
                "driver_name": trip.driver_name,
                "vehicle": trip.vehicle,
            },
            "stop": {
                "customer": stop.customer,
                "address": stop.address,
                "estimated_arrival": stop
                    .estimated_arrival
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
            },
        });

        mailer.send(EmailMessage {
            tenant_id,
            to: vec![email.clone()],
            subject: format!("Your delivery from trip {}", trip.trip_id),
            body: template::render(template_body, &context),
        })?;

        notified.push(StopNotification { stop_index, email });
    }

    info!(trip_id = %trip.trip_id, count = notified.len(), "dispatch notifications sent");
    Ok(notified)
}

/// One line in the lapse invoicing summary email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LapsedInvoiceNotice {
    pub contract_display: String,
    pub party_name: String,
    pub start_date: Option<NaiveDate>,
    pub total_cents: u64,
}

/// Summarize the invoices raised for lapsed contracts to the contract
/// managers. Nothing is sent when no invoices were raised.
pub fn send_lapse_summary<M: Mailer>(
    tenant_id: TenantId,
    recipients: &[String],
    notices: &[LapsedInvoiceNotice],
    mailer: &M,
) -> Result<(), MailError> {
    if notices.is_empty() || recipients.is_empty() {
        return Ok(());
    }

    let mut body = String::from(
        "The following lapsed contracts have been invoiced for non-compliance:\n\n",
    );
    for n in notices {
        body.push_str(&format!(
            "- {} ({}): {}.{:02}\n",
            n.party_name,
            n.start_date.map(|d| d.to_string()).unwrap_or_default(),
            n.total_cents / 100,
            n.total_cents % 100,
        ));
    }

    mailer.send(EmailMessage {
        tenant_id,
        to: recipients.to_vec(),
        subject: format!("{} lapsed contract(s) invoiced", notices.len()),
        body,
    })
}

//! Recurring contract maintenance: status refresh, lapse invoicing, and
//! invoice status sync.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use agroflow_contracts::{
    AttachSalesInvoice, Contract, ContractCommand, ContractId, RefreshStatus, SyncInvoiceStatus,
};
use agroflow_core::{AggregateId, TenantId};
use agroflow_events::{EventBus, EventEnvelope};
use agroflow_invoicing::{
    build_lapse_invoice, LapsedContract, SalesInvoice, SalesInvoiceCommand, SalesInvoiceId,
};

use crate::aggregate_types;
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::mailer::Mailer;
use crate::notifications::{send_lapse_summary, LapsedInvoiceNotice};
use crate::orders::OrderHistory;
use crate::projections::{ContractReadModel, ContractsProjection, InvoiceReadModel, InvoicesProjection};
use crate::read_model::TenantStore;

/// Contracts older than this are left alone by the daily refresh.
pub const REFRESH_WINDOW_DAYS: i64 = 60;

/// Daily pass: re-derive status for recently created, submitted contracts.
///
/// The aggregate emits nothing when the status is unchanged, so dispatching
/// to every candidate is cheap; only actual transitions append events.
pub fn refresh_contract_statuses<S, B, CS>(
    dispatcher: &CommandDispatcher<S, B>,
    contracts: &ContractsProjection<CS>,
    tenant_id: TenantId,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<usize, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    CS: TenantStore<ContractId, ContractReadModel>,
{
    let mut refreshed = 0;

    for contract in contracts.refresh_candidates(tenant_id, now, REFRESH_WINDOW_DAYS) {
        let committed = dispatcher.dispatch::<Contract>(
            tenant_id,
            contract.contract_id.0,
            aggregate_types::CONTRACT,
            ContractCommand::RefreshStatus(RefreshStatus {
                tenant_id,
                contract_id: contract.contract_id,
                today,
                occurred_at: now,
            }),
            |_, id| Contract::empty(ContractId::new(id)),
        )?;

        if !committed.is_empty() {
            refreshed += 1;
        }
    }

    info!(%tenant_id, refreshed, "contract status refresh finished");
    Ok(refreshed)
}

/// Daily pass: invoice lapsed customer contracts for their order discounts.
///
/// Selects submitted customer contracts whose fulfilment lapsed and that
/// carry no invoice yet, bills one line per discounted order placed
/// between the contract start and the fulfilment deadline, links the
/// invoice back to the contract, and mails a summary to the contract
/// managers. Contracts whose customers earned no discounts are skipped
/// entirely and will be looked at again the next day.
pub fn invoice_lapsed_contracts<S, B, CS, O, M>(
    dispatcher: &CommandDispatcher<S, B>,
    contracts: &ContractsProjection<CS>,
    orders: &O,
    mailer: &M,
    manager_emails: &[String],
    tenant_id: TenantId,
    now: DateTime<Utc>,
) -> Result<usize, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    CS: TenantStore<ContractId, ContractReadModel>,
    O: OrderHistory + ?Sized,
    M: Mailer,
{
    let mut notices = Vec::new();

    for contract in contracts.lapsed_without_invoice(tenant_id) {
        let (Some(start), Some(deadline)) = (contract.start_date, contract.fulfilment_deadline)
        else {
            continue;
        };

        let discounts = orders.order_discounts(tenant_id, &contract.party_name, start, deadline);

        let invoice_id = SalesInvoiceId::new(AggregateId::new());
        let issue = build_lapse_invoice(
            tenant_id,
            invoice_id,
            &LapsedContract {
                contract_id: contract.contract_id.0,
                party_name: contract.party_name.clone(),
            },
            &discounts,
            now,
        )
        .map_err(DispatchError::from)?;

        let Some(issue) = issue else {
            continue;
        };

        let total_cents = issue
            .lines
            .iter()
            .map(|l| u64::from(l.qty) * l.rate_cents)
            .sum();

        dispatcher.dispatch::<SalesInvoice>(
            tenant_id,
            invoice_id.0,
            aggregate_types::SALES_INVOICE,
            SalesInvoiceCommand::IssueInvoice(issue),
            |_, id| SalesInvoice::empty(SalesInvoiceId::new(id)),
        )?;

        dispatcher.dispatch::<Contract>(
            tenant_id,
            contract.contract_id.0,
            aggregate_types::CONTRACT,
            ContractCommand::AttachSalesInvoice(AttachSalesInvoice {
                tenant_id,
                contract_id: contract.contract_id,
                invoice_id: invoice_id.0,
                occurred_at: now,
            }),
            |_, id| Contract::empty(ContractId::new(id)),
        )?;

        notices.push(LapsedInvoiceNotice {
            contract_display: contract.contract_display.clone(),
            party_name: contract.party_name.clone(),
            start_date: contract.start_date,
            total_cents,
        });
    }

    if let Err(err) = send_lapse_summary(tenant_id, manager_emails, &notices, mailer) {
        // The invoices are already committed; a failed summary email is
        // not worth failing the whole run over.
        warn!(%tenant_id, error = %err, "lapse summary email failed");
    }

    info!(%tenant_id, invoiced = notices.len(), "lapsed contract invoicing finished");
    Ok(notices.len())
}

/// Hourly pass: mirror each linked invoice's status onto its contract.
///
/// The aggregate ignores a sync that matches the stored status, so this is
/// write-on-change.
pub fn sync_contract_invoice_status<S, B, CS, IS>(
    dispatcher: &CommandDispatcher<S, B>,
    contracts: &ContractsProjection<CS>,
    invoices: &InvoicesProjection<IS>,
    tenant_id: TenantId,
    now: DateTime<Utc>,
) -> Result<usize, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    CS: TenantStore<ContractId, ContractReadModel>,
    IS: TenantStore<SalesInvoiceId, InvoiceReadModel>,
{
    let mut synced = 0;

    for contract in contracts.with_linked_invoice(tenant_id) {
        let Some(invoice_id) = contract.sales_invoice else {
            continue;
        };
        let Some(invoice) = invoices.get(tenant_id, &SalesInvoiceId::new(invoice_id)) else {
            continue;
        };

        let status = invoice.status.as_str();
        if contract.sales_invoice_status.as_deref() == Some(status) {
            continue;
        }

        let committed = dispatcher.dispatch::<Contract>(
            tenant_id,
            contract.contract_id.0,
            aggregate_types::CONTRACT,
            ContractCommand::SyncInvoiceStatus(SyncInvoiceStatus {
                tenant_id,
                contract_id: contract.contract_id,
                status: status.to_string(),
                occurred_at: now,
            }),
            |_, id| Contract::empty(ContractId::new(id)),
        )?;

        if !committed.is_empty() {
            synced += 1;
        }
    }

    info!(%tenant_id, synced, "contract invoice status sync finished");
    Ok(synced)
}

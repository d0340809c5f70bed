//! Lapse-fee invoice construction.
//!
//! When a customer contract lapses, the fee charged is the sum of the
//! order discounts granted while the contract was in force: one invoice
//! line per order, rated at that order's additional discount.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agroflow_core::{AggregateId, DomainError, TenantId};

use crate::invoice::{InvoiceLine, IssueInvoice, SalesInvoiceId};

/// The contract fields the factory needs, resolved by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapsedContract {
    pub contract_id: AggregateId,
    pub party_name: String,
}

/// One discounted order placed during the contract window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDiscount {
    pub order_name: String,
    pub discount_cents: u64,
}

/// Build the IssueInvoice command for a lapsed contract. Orders without a
/// discount carry no fee and are skipped; with no discounted orders at all
/// there is nothing to invoice.
pub fn build_lapse_invoice(
    tenant_id: TenantId,
    invoice_id: SalesInvoiceId,
    contract: &LapsedContract,
    orders: &[OrderDiscount],
    occurred_at: DateTime<Utc>,
) -> Result<Option<IssueInvoice>, DomainError> {
    let lines: Vec<InvoiceLine> = orders
        .iter()
        .filter(|order| order.discount_cents > 0)
        .map(|order| InvoiceLine {
            item_name: format!("Contract lapse fee for {}", order.order_name),
            description: format!(
                "This fee is charged for the non-compliance of contract {} based on order {}",
                contract.contract_id, order.order_name
            ),
            qty: 1,
            rate_cents: order.discount_cents,
        })
        .collect();

    if lines.is_empty() {
        return Ok(None);
    }

    Ok(Some(IssueInvoice {
        tenant_id,
        invoice_id,
        customer: contract.party_name.clone(),
        contract: Some(contract.contract_id),
        lines,
        due_date: None,
        occurred_at,
    }))
}

//! Payment entries recorded against a sales invoice.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use agroflow_core::{DomainError, TenantId};

use crate::invoice::SalesInvoiceId;

/// A payment record referencing the invoice it settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEntry {
    pub tenant_id: TenantId,
    pub sales_invoice: SalesInvoiceId,
    pub paid_amount_cents: u64,
    pub reference_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Draft a payment entry. Zero amounts produce no entry; the caller still
/// marks the matching delivery stops visited either way.
pub fn make_payment_entry(
    tenant_id: TenantId,
    sales_invoice: SalesInvoiceId,
    paid_amount_cents: u64,
    reference_date: NaiveDate,
    created_at: DateTime<Utc>,
) -> Result<Option<PaymentEntry>, DomainError> {
    if paid_amount_cents == 0 {
        return Ok(None);
    }

    Ok(Some(PaymentEntry {
        tenant_id,
        sales_invoice,
        paid_amount_cents,
        reference_date,
        created_at,
    }))
}

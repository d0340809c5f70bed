use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use agroflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use agroflow_events::Event;

/// Sales invoice identifier (tenant-scoped via `tenant_id` fields in
/// events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SalesInvoiceId(pub AggregateId);

impl SalesInvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SalesInvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Open,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Open => "open",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }
}

/// One invoice line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub item_name: String,
    pub description: String,
    pub qty: u32,
    /// Rate in smallest currency unit (cents).
    pub rate_cents: u64,
}

/// Aggregate root: SalesInvoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesInvoice {
    id: SalesInvoiceId,
    tenant_id: Option<TenantId>,
    customer: String,
    contract: Option<AggregateId>,
    status: InvoiceStatus,
    lines: Vec<InvoiceLine>,
    due_date: Option<NaiveDate>,
    total_cents: u64,
    paid_cents: u64,
    version: u64,
    created: bool,
}

impl SalesInvoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SalesInvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            customer: String::new(),
            contract: None,
            status: InvoiceStatus::Open,
            lines: Vec::new(),
            due_date: None,
            total_cents: 0,
            paid_cents: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SalesInvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn customer(&self) -> &str {
        &self.customer
    }

    pub fn contract(&self) -> Option<AggregateId> {
        self.contract
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn total_cents(&self) -> u64 {
        self.total_cents
    }

    pub fn paid_cents(&self) -> u64 {
        self.paid_cents
    }

    pub fn outstanding_cents(&self) -> u64 {
        self.total_cents.saturating_sub(self.paid_cents)
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    /// Invariant: cannot pay a void or settled invoice.
    pub fn can_accept_payment(&self) -> bool {
        self.status != InvoiceStatus::Void && self.outstanding_cents() > 0
    }
}

impl AggregateRoot for SalesInvoice {
    type Id = SalesInvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: IssueInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: SalesInvoiceId,
    pub customer: String,
    pub contract: Option<AggregateId>,
    pub lines: Vec<InvoiceLine>,
    pub due_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RegisterPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPayment {
    pub tenant_id: TenantId,
    pub invoice_id: SalesInvoiceId,
    /// Payment amount in smallest currency unit.
    pub amount_cents: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VoidInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: SalesInvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesInvoiceCommand {
    IssueInvoice(IssueInvoice),
    RegisterPayment(RegisterPayment),
    VoidInvoice(VoidInvoice),
}

/// Event: SalesInvoiceIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesInvoiceIssued {
    pub tenant_id: TenantId,
    pub invoice_id: SalesInvoiceId,
    pub customer: String,
    pub contract: Option<AggregateId>,
    pub lines: Vec<InvoiceLine>,
    pub due_date: Option<NaiveDate>,
    pub total_cents: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SalesInvoicePaymentRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesInvoicePaymentRegistered {
    pub tenant_id: TenantId,
    pub invoice_id: SalesInvoiceId,
    pub amount_cents: u64,
    pub new_paid_cents: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SalesInvoiceVoided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesInvoiceVoided {
    pub tenant_id: TenantId,
    pub invoice_id: SalesInvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesInvoiceEvent {
    SalesInvoiceIssued(SalesInvoiceIssued),
    SalesInvoicePaymentRegistered(SalesInvoicePaymentRegistered),
    SalesInvoiceVoided(SalesInvoiceVoided),
}

impl Event for SalesInvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SalesInvoiceEvent::SalesInvoiceIssued(_) => "invoicing.sales_invoice.issued",
            SalesInvoiceEvent::SalesInvoicePaymentRegistered(_) => {
                "invoicing.sales_invoice.payment_registered"
            }
            SalesInvoiceEvent::SalesInvoiceVoided(_) => "invoicing.sales_invoice.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SalesInvoiceEvent::SalesInvoiceIssued(e) => e.occurred_at,
            SalesInvoiceEvent::SalesInvoicePaymentRegistered(e) => e.occurred_at,
            SalesInvoiceEvent::SalesInvoiceVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SalesInvoice {
    type Command = SalesInvoiceCommand;
    type Event = SalesInvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SalesInvoiceEvent::SalesInvoiceIssued(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.customer = e.customer.clone();
                self.contract = e.contract;
                self.lines = e.lines.clone();
                self.due_date = e.due_date;
                self.total_cents = e.total_cents;
                self.paid_cents = 0;
                self.status = InvoiceStatus::Open;
                self.created = true;
            }
            SalesInvoiceEvent::SalesInvoicePaymentRegistered(e) => {
                self.paid_cents = e.new_paid_cents;
                if self.paid_cents >= self.total_cents {
                    self.status = InvoiceStatus::Paid;
                }
            }
            SalesInvoiceEvent::SalesInvoiceVoided(_) => {
                self.status = InvoiceStatus::Void;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SalesInvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            SalesInvoiceCommand::RegisterPayment(cmd) => self.handle_register_payment(cmd),
            SalesInvoiceCommand::VoidInvoice(cmd) => self.handle_void(cmd),
        }
    }
}

impl SalesInvoice {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_invoice_id(&self, invoice_id: SalesInvoiceId) -> Result<(), DomainError> {
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<SalesInvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }

        if cmd.customer.trim().is_empty() {
            return Err(DomainError::validation("customer is required"));
        }

        if cmd.lines.is_empty() {
            return Err(DomainError::validation(
                "cannot issue an invoice without lines",
            ));
        }

        let mut total: u64 = 0;
        for line in &cmd.lines {
            if line.qty == 0 {
                return Err(DomainError::validation(
                    "invoice line qty must be positive",
                ));
            }
            if line.rate_cents == 0 {
                return Err(DomainError::validation(
                    "invoice line rate must be positive",
                ));
            }
            let line_total = (line.qty as u64)
                .checked_mul(line.rate_cents)
                .ok_or_else(|| DomainError::invariant("invoice line amount overflow"))?;
            total = total
                .checked_add(line_total)
                .ok_or_else(|| DomainError::invariant("invoice total overflow"))?;
        }

        Ok(vec![SalesInvoiceEvent::SalesInvoiceIssued(
            SalesInvoiceIssued {
                tenant_id: cmd.tenant_id,
                invoice_id: cmd.invoice_id,
                customer: cmd.customer.clone(),
                contract: cmd.contract,
                lines: cmd.lines.clone(),
                due_date: cmd.due_date,
                total_cents: total,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_register_payment(
        &self,
        cmd: &RegisterPayment,
    ) -> Result<Vec<SalesInvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if !self.can_accept_payment() {
            return Err(DomainError::invariant(
                "cannot register a payment on a void or settled invoice",
            ));
        }

        if cmd.amount_cents == 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }

        let new_paid_cents = self
            .paid_cents
            .checked_add(cmd.amount_cents)
            .ok_or_else(|| DomainError::invariant("payment total overflow"))?;

        if new_paid_cents > self.total_cents {
            return Err(DomainError::invariant("cannot overpay an invoice"));
        }

        Ok(vec![SalesInvoiceEvent::SalesInvoicePaymentRegistered(
            SalesInvoicePaymentRegistered {
                tenant_id: cmd.tenant_id,
                invoice_id: cmd.invoice_id,
                amount_cents: cmd.amount_cents,
                new_paid_cents,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_void(&self, cmd: &VoidInvoice) -> Result<Vec<SalesInvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if self.status == InvoiceStatus::Void {
            return Err(DomainError::conflict("invoice is already void"));
        }

        Ok(vec![SalesInvoiceEvent::SalesInvoiceVoided(
            SalesInvoiceVoided {
                tenant_id: cmd.tenant_id,
                invoice_id: cmd.invoice_id,
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_invoice_id() -> SalesInvoiceId {
        SalesInvoiceId::new(AggregateId::new())
    }

    fn fee_line(rate_cents: u64) -> InvoiceLine {
        InvoiceLine {
            item_name: "Contract lapse fee".to_string(),
            description: "Charged for contract non-compliance".to_string(),
            qty: 1,
            rate_cents,
        }
    }

    fn issued(tenant_id: TenantId, invoice_id: SalesInvoiceId, rates: &[u64]) -> SalesInvoice {
        let mut invoice = SalesInvoice::empty(invoice_id);
        let events = invoice
            .handle(&SalesInvoiceCommand::IssueInvoice(IssueInvoice {
                tenant_id,
                invoice_id,
                customer: "Rosewood Farms".to_string(),
                contract: None,
                lines: rates.iter().copied().map(fee_line).collect(),
                due_date: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        invoice.apply(&events[0]);
        invoice
    }

    #[test]
    fn issuing_totals_the_lines() {
        let invoice = issued(test_tenant_id(), test_invoice_id(), &[1_500, 2_500]);
        assert_eq!(invoice.status(), InvoiceStatus::Open);
        assert_eq!(invoice.total_cents(), 4_000);
        assert_eq!(invoice.outstanding_cents(), 4_000);
    }

    #[test]
    fn issuing_without_lines_is_rejected() {
        let invoice_id = test_invoice_id();
        let err = SalesInvoice::empty(invoice_id)
            .handle(&SalesInvoiceCommand::IssueInvoice(IssueInvoice {
                tenant_id: test_tenant_id(),
                invoice_id,
                customer: "Rosewood Farms".to_string(),
                contract: None,
                lines: vec![],
                due_date: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn paying_to_total_marks_the_invoice_paid() {
        let tenant_id = test_tenant_id();
        let invoice_id = test_invoice_id();
        let mut invoice = issued(tenant_id, invoice_id, &[2_000]);

        let events = invoice
            .handle(&SalesInvoiceCommand::RegisterPayment(RegisterPayment {
                tenant_id,
                invoice_id,
                amount_cents: 500,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        invoice.apply(&events[0]);
        assert_eq!(invoice.status(), InvoiceStatus::Open);
        assert_eq!(invoice.paid_cents(), 500);

        let events = invoice
            .handle(&SalesInvoiceCommand::RegisterPayment(RegisterPayment {
                tenant_id,
                invoice_id,
                amount_cents: 1_500,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        invoice.apply(&events[0]);
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
        assert_eq!(invoice.outstanding_cents(), 0);
    }

    #[test]
    fn overpaying_is_rejected() {
        let tenant_id = test_tenant_id();
        let invoice_id = test_invoice_id();
        let invoice = issued(tenant_id, invoice_id, &[2_000]);

        let err = invoice
            .handle(&SalesInvoiceCommand::RegisterPayment(RegisterPayment {
                tenant_id,
                invoice_id,
                amount_cents: 2_001,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn a_void_invoice_rejects_payments() {
        let tenant_id = test_tenant_id();
        let invoice_id = test_invoice_id();
        let mut invoice = issued(tenant_id, invoice_id, &[2_000]);

        let events = invoice
            .handle(&SalesInvoiceCommand::VoidInvoice(VoidInvoice {
                tenant_id,
                invoice_id,
                reason: Some("customer dispute".to_string()),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        invoice.apply(&events[0]);
        assert_eq!(invoice.status(), InvoiceStatus::Void);

        let err = invoice
            .handle(&SalesInvoiceCommand::RegisterPayment(RegisterPayment {
                tenant_id,
                invoice_id,
                amount_cents: 100,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}

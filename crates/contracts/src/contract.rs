use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use agroflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, template};
use agroflow_events::Event;

use crate::status::{ContractStatus, FulfilmentStatus, contract_status, fulfilment_status};

/// Contract identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(pub AggregateId);

impl ContractId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ContractId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The kind of party the agreement is with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyType {
    Customer,
    Supplier,
    Employee,
}

/// One checklist item that must be marked complete for contract fulfilment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfilmentTerm {
    pub requirement: String,
    pub fulfilled: bool,
}

/// Aggregate root: Contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    id: ContractId,
    tenant_id: Option<TenantId>,
    party_type: PartyType,
    party_name: String,
    party_users: Vec<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    is_signed: bool,
    signee: Option<String>,
    signed_on: Option<DateTime<Utc>>,
    requires_fulfilment: bool,
    fulfilment_deadline: Option<NaiveDate>,
    fulfilment_terms: Vec<FulfilmentTerm>,
    contract_terms: String,
    contract_display: String,
    status: ContractStatus,
    fulfilment_status: Option<FulfilmentStatus>,
    submitted: bool,
    sales_invoice: Option<AggregateId>,
    sales_invoice_status: Option<String>,
    version: u64,
    created: bool,
}

impl Contract {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ContractId) -> Self {
        Self {
            id,
            tenant_id: None,
            party_type: PartyType::Customer,
            party_name: String::new(),
            party_users: Vec::new(),
            start_date: None,
            end_date: None,
            is_signed: false,
            signee: None,
            signed_on: None,
            requires_fulfilment: false,
            fulfilment_deadline: None,
            fulfilment_terms: Vec::new(),
            contract_terms: String::new(),
            contract_display: String::new(),
            status: ContractStatus::Unsigned,
            fulfilment_status: None,
            submitted: false,
            sales_invoice: None,
            sales_invoice_status: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ContractId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn party_type(&self) -> PartyType {
        self.party_type
    }

    pub fn party_name(&self) -> &str {
        &self.party_name
    }

    pub fn party_users(&self) -> &[String] {
        &self.party_users
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    pub fn is_signed(&self) -> bool {
        self.is_signed
    }

    pub fn signee(&self) -> Option<&str> {
        self.signee.as_deref()
    }

    pub fn requires_fulfilment(&self) -> bool {
        self.requires_fulfilment
    }

    pub fn fulfilment_deadline(&self) -> Option<NaiveDate> {
        self.fulfilment_deadline
    }

    pub fn fulfilment_terms(&self) -> &[FulfilmentTerm] {
        &self.fulfilment_terms
    }

    pub fn contract_display(&self) -> &str {
        &self.contract_display
    }

    pub fn status(&self) -> ContractStatus {
        self.status
    }

    pub fn fulfilment_status(&self) -> Option<FulfilmentStatus> {
        self.fulfilment_status
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub fn sales_invoice(&self) -> Option<AggregateId> {
        self.sales_invoice
    }

    pub fn sales_invoice_status(&self) -> Option<&str> {
        self.sales_invoice_status.as_deref()
    }

    /// Whether `email` belongs to one of the contract's party users.
    ///
    /// This is the portal visibility rule: a party user may see their own
    /// contract, nobody else's.
    pub fn is_party_user(&self, email: &str) -> bool {
        self.party_users.iter().any(|u| u == email)
    }

    /// Count of fulfilled checklist terms.
    pub fn fulfilment_progress(&self) -> usize {
        self.fulfilment_terms.iter().filter(|t| t.fulfilled).count()
    }
}

impl AggregateRoot for Contract {
    type Id = ContractId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateContract (draft a new agreement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateContract {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub party_type: PartyType,
    pub party_name: String,
    pub party_users: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub requires_fulfilment: bool,
    pub fulfilment_deadline: Option<NaiveDate>,
    pub fulfilment_requirements: Vec<String>,
    pub contract_terms: String,
    pub today: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SignContract (portal "accept terms").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignContract {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub signee: String,
    pub today: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FulfilTerm (tick one checklist item).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfilTerm {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub term_index: usize,
    pub today: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitContract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitContract {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub today: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RefreshStatus (daily scheduler pass; no-op when nothing changed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshStatus {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub today: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachSalesInvoice (lapse-fee invoice generated by the scheduler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachSalesInvoice {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SyncInvoiceStatus (hourly mirror of the linked invoice's status).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncInvoiceStatus {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub status: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractCommand {
    CreateContract(CreateContract),
    SignContract(SignContract),
    FulfilTerm(FulfilTerm),
    SubmitContract(SubmitContract),
    RefreshStatus(RefreshStatus),
    AttachSalesInvoice(AttachSalesInvoice),
    SyncInvoiceStatus(SyncInvoiceStatus),
}

/// Event: ContractDrafted. Carries the derived statuses and the rendered
/// display so replay never re-derives against a clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDrafted {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub party_type: PartyType,
    pub party_name: String,
    /// Deduplicated, first occurrence wins.
    pub party_users: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub requires_fulfilment: bool,
    pub fulfilment_deadline: Option<NaiveDate>,
    pub fulfilment_terms: Vec<FulfilmentTerm>,
    pub contract_terms: String,
    pub contract_display: String,
    pub status: ContractStatus,
    pub fulfilment_status: Option<FulfilmentStatus>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ContractSigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSigned {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub signee: String,
    pub signed_on: DateTime<Utc>,
    /// Terms re-rendered with the signee in context.
    pub contract_display: String,
    pub status: ContractStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TermFulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermFulfilled {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub term_index: usize,
    pub fulfilment_status: Option<FulfilmentStatus>,
    pub status: ContractStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ContractSubmitted. When fulfilment is not required the checklist
/// fields are cleared on submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSubmitted {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub fulfilment_cleared: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusRefreshed. Only emitted when a status actually changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRefreshed {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub status: ContractStatus,
    pub fulfilment_status: Option<FulfilmentStatus>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SalesInvoiceAttached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesInvoiceAttached {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceStatusSynced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceStatusSynced {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub status: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractEvent {
    ContractDrafted(ContractDrafted),
    ContractSigned(ContractSigned),
    TermFulfilled(TermFulfilled),
    ContractSubmitted(ContractSubmitted),
    StatusRefreshed(StatusRefreshed),
    SalesInvoiceAttached(SalesInvoiceAttached),
    InvoiceStatusSynced(InvoiceStatusSynced),
}

impl Event for ContractEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ContractEvent::ContractDrafted(_) => "contracts.contract.drafted",
            ContractEvent::ContractSigned(_) => "contracts.contract.signed",
            ContractEvent::TermFulfilled(_) => "contracts.contract.term_fulfilled",
            ContractEvent::ContractSubmitted(_) => "contracts.contract.submitted",
            ContractEvent::StatusRefreshed(_) => "contracts.contract.status_refreshed",
            ContractEvent::SalesInvoiceAttached(_) => "contracts.contract.invoice_attached",
            ContractEvent::InvoiceStatusSynced(_) => "contracts.contract.invoice_status_synced",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ContractEvent::ContractDrafted(e) => e.occurred_at,
            ContractEvent::ContractSigned(e) => e.occurred_at,
            ContractEvent::TermFulfilled(e) => e.occurred_at,
            ContractEvent::ContractSubmitted(e) => e.occurred_at,
            ContractEvent::StatusRefreshed(e) => e.occurred_at,
            ContractEvent::SalesInvoiceAttached(e) => e.occurred_at,
            ContractEvent::InvoiceStatusSynced(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Contract {
    type Command = ContractCommand;
    type Event = ContractEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ContractEvent::ContractDrafted(e) => {
                self.id = e.contract_id;
                self.tenant_id = Some(e.tenant_id);
                self.party_type = e.party_type;
                self.party_name = e.party_name.clone();
                self.party_users = e.party_users.clone();
                self.start_date = e.start_date;
                self.end_date = e.end_date;
                self.requires_fulfilment = e.requires_fulfilment;
                self.fulfilment_deadline = e.fulfilment_deadline;
                self.fulfilment_terms = e.fulfilment_terms.clone();
                self.contract_terms = e.contract_terms.clone();
                self.contract_display = e.contract_display.clone();
                self.status = e.status;
                self.fulfilment_status = e.fulfilment_status;
                self.created = true;
            }
            ContractEvent::ContractSigned(e) => {
                self.is_signed = true;
                self.signee = Some(e.signee.clone());
                self.signed_on = Some(e.signed_on);
                self.contract_display = e.contract_display.clone();
                self.status = e.status;
            }
            ContractEvent::TermFulfilled(e) => {
                if let Some(term) = self.fulfilment_terms.get_mut(e.term_index) {
                    term.fulfilled = true;
                }
                self.fulfilment_status = e.fulfilment_status;
                self.status = e.status;
            }
            ContractEvent::ContractSubmitted(e) => {
                self.submitted = true;
                if e.fulfilment_cleared {
                    self.fulfilment_status = None;
                    self.fulfilment_deadline = None;
                    self.fulfilment_terms.clear();
                }
            }
            ContractEvent::StatusRefreshed(e) => {
                self.status = e.status;
                self.fulfilment_status = e.fulfilment_status;
            }
            ContractEvent::SalesInvoiceAttached(e) => {
                self.sales_invoice = Some(e.invoice_id);
            }
            ContractEvent::InvoiceStatusSynced(e) => {
                self.sales_invoice_status = Some(e.status.clone());
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ContractCommand::CreateContract(cmd) => self.handle_create(cmd),
            ContractCommand::SignContract(cmd) => self.handle_sign(cmd),
            ContractCommand::FulfilTerm(cmd) => self.handle_fulfil_term(cmd),
            ContractCommand::SubmitContract(cmd) => self.handle_submit(cmd),
            ContractCommand::RefreshStatus(cmd) => self.handle_refresh(cmd),
            ContractCommand::AttachSalesInvoice(cmd) => self.handle_attach_invoice(cmd),
            ContractCommand::SyncInvoiceStatus(cmd) => self.handle_sync_invoice_status(cmd),
        }
    }
}

impl Contract {
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

    fn handle_create(&self, cmd: &CreateContract) -> Result<Vec<ContractEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("contract already exists"));
        }

        if cmd.party_name.trim().is_empty() {
            return Err(DomainError::validation("party name is required"));
        }

        if let (Some(start), Some(end)) = (cmd.start_date, cmd.end_date) {
            if end < start {
                return Err(DomainError::validation(
                    "end date cannot be before start date",
                ));
            }
        }

        let party_users = dedup_users(&cmd.party_users);

        let fulfilment_terms: Vec<FulfilmentTerm> = cmd
            .fulfilment_requirements
            .iter()
            .map(|requirement| FulfilmentTerm {
                requirement: requirement.clone(),
                fulfilled: false,
            })
            .collect();

        let fulfilment = fulfilment_status(
            cmd.requires_fulfilment,
            &fulfilment_terms,
            cmd.fulfilment_deadline,
            cmd.today,
        );
        let status = contract_status(fulfilment, false, cmd.start_date, cmd.end_date, cmd.today);

        let contract_display = render_display(
            &cmd.contract_terms,
            &cmd.party_name,
            cmd.start_date,
            cmd.end_date,
            None,
        );

        Ok(vec![ContractEvent::ContractDrafted(ContractDrafted {
            tenant_id: cmd.tenant_id,
            contract_id: cmd.contract_id,
            party_type: cmd.party_type,
            party_name: cmd.party_name.clone(),
            party_users,
            start_date: cmd.start_date,
            end_date: cmd.end_date,
            requires_fulfilment: cmd.requires_fulfilment,
            fulfilment_deadline: cmd.fulfilment_deadline,
            fulfilment_terms,
            contract_terms: cmd.contract_terms.clone(),
            contract_display,
            status,
            fulfilment_status: fulfilment,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_sign(&self, cmd: &SignContract) -> Result<Vec<ContractEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.is_signed {
            return Err(DomainError::conflict("contract is already signed"));
        }

        if cmd.signee.trim().is_empty() {
            return Err(DomainError::validation("signee is required"));
        }

        let status = contract_status(
            self.fulfilment_status,
            true,
            self.start_date,
            self.end_date,
            cmd.today,
        );

        let contract_display = render_display(
            &self.contract_terms,
            &self.party_name,
            self.start_date,
            self.end_date,
            Some(&cmd.signee),
        );

        Ok(vec![ContractEvent::ContractSigned(ContractSigned {
            tenant_id: cmd.tenant_id,
            contract_id: cmd.contract_id,
            signee: cmd.signee.clone(),
            signed_on: cmd.occurred_at,
            contract_display,
            status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_fulfil_term(&self, cmd: &FulfilTerm) -> Result<Vec<ContractEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if !self.requires_fulfilment {
            return Err(DomainError::invariant(
                "contract does not require fulfilment",
            ));
        }

        let term = self
            .fulfilment_terms
            .get(cmd.term_index)
            .ok_or_else(|| DomainError::validation("no such fulfilment term"))?;

        if term.fulfilled {
            return Err(DomainError::validation("term is already fulfilled"));
        }

        // Rederive against the checklist as it will look after this tick.
        let mut terms = self.fulfilment_terms.clone();
        terms[cmd.term_index].fulfilled = true;

        let fulfilment = fulfilment_status(true, &terms, self.fulfilment_deadline, cmd.today);
        let status = contract_status(
            fulfilment,
            self.is_signed,
            self.start_date,
            self.end_date,
            cmd.today,
        );

        Ok(vec![ContractEvent::TermFulfilled(TermFulfilled {
            tenant_id: cmd.tenant_id,
            contract_id: cmd.contract_id,
            term_index: cmd.term_index,
            fulfilment_status: fulfilment,
            status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &SubmitContract) -> Result<Vec<ContractEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.submitted {
            return Err(DomainError::conflict("contract is already submitted"));
        }

        Ok(vec![ContractEvent::ContractSubmitted(ContractSubmitted {
            tenant_id: cmd.tenant_id,
            contract_id: cmd.contract_id,
            fulfilment_cleared: !self.requires_fulfilment,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_refresh(&self, cmd: &RefreshStatus) -> Result<Vec<ContractEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;

        let fulfilment = fulfilment_status(
            self.requires_fulfilment,
            &self.fulfilment_terms,
            self.fulfilment_deadline,
            cmd.today,
        );
        let status = contract_status(
            fulfilment,
            self.is_signed,
            self.start_date,
            self.end_date,
            cmd.today,
        );

        // An unchanged refresh emits nothing.
        if status == self.status && fulfilment == self.fulfilment_status {
            return Ok(vec![]);
        }

        Ok(vec![ContractEvent::StatusRefreshed(StatusRefreshed {
            tenant_id: cmd.tenant_id,
            contract_id: cmd.contract_id,
            status,
            fulfilment_status: fulfilment,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_attach_invoice(
        &self,
        cmd: &AttachSalesInvoice,
    ) -> Result<Vec<ContractEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if !self.submitted {
            return Err(DomainError::invariant(
                "only submitted contracts can carry a lapse-fee invoice",
            ));
        }

        if self.sales_invoice.is_some() {
            return Err(DomainError::conflict("contract already has a sales invoice"));
        }

        Ok(vec![ContractEvent::SalesInvoiceAttached(
            SalesInvoiceAttached {
                tenant_id: cmd.tenant_id,
                contract_id: cmd.contract_id,
                invoice_id: cmd.invoice_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_sync_invoice_status(
        &self,
        cmd: &SyncInvoiceStatus,
    ) -> Result<Vec<ContractEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.sales_invoice.is_none() {
            return Err(DomainError::invariant("contract has no linked invoice"));
        }

        if self.sales_invoice_status.as_deref() == Some(cmd.status.as_str()) {
            return Ok(vec![]);
        }

        Ok(vec![ContractEvent::InvoiceStatusSynced(InvoiceStatusSynced {
            tenant_id: cmd.tenant_id,
            contract_id: cmd.contract_id,
            status: cmd.status.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// Remove duplicate party users, first occurrence wins.
fn dedup_users(users: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(users.len());
    for user in users {
        if !seen.contains(user) {
            seen.push(user.clone());
        }
    }
    seen
}

fn render_display(
    terms: &str,
    party_name: &str,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    signee: Option<&str>,
) -> String {
    let context = json!({
        "doc": {
            "party_name": party_name,
            "start_date": start_date.map(|d| d.to_string()).unwrap_or_default(),
            "end_date": end_date.map(|d| d.to_string()).unwrap_or_default(),
            "signee": signee.unwrap_or_default(),
        }
    });
    template::render(terms, &context)
}

//! Contract lifecycle: party agreements with a fulfilment-term checklist,
//! derived activity/fulfilment statuses, and an optional lapse-fee invoice
//! link.

pub mod contract;
pub mod status;

pub use contract::{
    AttachSalesInvoice, Contract, ContractCommand, ContractDrafted, ContractEvent, ContractId,
    ContractSigned, ContractSubmitted, CreateContract, FulfilTerm, FulfilmentTerm,
    InvoiceStatusSynced, PartyType, RefreshStatus, SalesInvoiceAttached, SignContract,
    StatusRefreshed, SubmitContract, SyncInvoiceStatus, TermFulfilled,
};
pub use status::{ContractStatus, FulfilmentStatus, activity_status, contract_status, fulfilment_status};

//! Invoicing domain module (event-sourced).
//!
//! This crate contains business rules for sales invoices and payment
//! entries, implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage).

pub mod invoice;
pub mod lapse;
pub mod payment;

pub use invoice::{
    InvoiceLine, InvoiceStatus, IssueInvoice, RegisterPayment, SalesInvoice, SalesInvoiceCommand,
    SalesInvoiceEvent, SalesInvoiceId, SalesInvoiceIssued, SalesInvoicePaymentRegistered,
    SalesInvoiceVoided, VoidInvoice,
};
pub use lapse::{build_lapse_invoice, LapsedContract, OrderDiscount};
pub use payment::{make_payment_entry, PaymentEntry};

//! Order history lookup for lapse invoicing.
//!
//! Lapse fees are billed per order the customer placed during the contract
//! period. This trait is the seam to whatever system records orders; the
//! in-memory directory backs tests and dev.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;

use agroflow_core::TenantId;
use agroflow_invoicing::OrderDiscount;

pub trait OrderHistory: Send + Sync {
    /// Discounts on orders a customer placed in `[from, to]`, both inclusive.
    fn order_discounts(
        &self,
        tenant_id: TenantId,
        customer: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<OrderDiscount>;
}

#[derive(Debug, Clone)]
struct OrderRecord {
    order_name: String,
    discount_cents: u64,
    placed_on: NaiveDate,
}

/// In-memory order directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryOrderDirectory {
    orders: RwLock<HashMap<(TenantId, String), Vec<OrderRecord>>>,
}

impl InMemoryOrderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        tenant_id: TenantId,
        customer: impl Into<String>,
        order_name: impl Into<String>,
        discount_cents: u64,
        placed_on: NaiveDate,
    ) {
        if let Ok(mut orders) = self.orders.write() {
            orders
                .entry((tenant_id, customer.into()))
                .or_default()
                .push(OrderRecord {
                    order_name: order_name.into(),
                    discount_cents,
                    placed_on,
                });
        }
    }
}

impl OrderHistory for InMemoryOrderDirectory {
    fn order_discounts(
        &self,
        tenant_id: TenantId,
        customer: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<OrderDiscount> {
        let orders = match self.orders.read() {
            Ok(o) => o,
            Err(_) => return vec![],
        };

        orders
            .get(&(tenant_id, customer.to_string()))
            .map(|records| {
                records
                    .iter()
                    .filter(|r| from <= r.placed_on && r.placed_on <= to)
                    .map(|r| OrderDiscount {
                        order_name: r.order_name.clone(),
                        discount_cents: r.discount_cents,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

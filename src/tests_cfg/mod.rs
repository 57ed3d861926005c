//! Shared test entities and fixture data.
//!
//! Orders:
//!
//! | id | status | region | customer | total |
//! |----|--------|--------|----------|-------|
//! | 1  | OPEN   | EAST   | 1        | 100.0 |
//! | 2  | OPEN   | WEST   | 2        | 50.0  |
//! | 3  | CLOSED | EAST   | 2        | 75.0  |
//! | 4  | OPEN   | EAST   | -        | 20.0  |
//! | 5  | OPEN   | WEST   | 1        | 10.0  |
//!
//! Customers: 1 ACME (tier GOLD), 2 Globex (no tier).

use crate::metadata::MetadataRegistry;
use crate::store::{MemoryStore, NewRow};
use std::sync::Arc;

crate::entity! {
    pub struct Customer {
        table: "customers",
        key: id,
        fields { id: i64, name: String, tier: Option<String> }
    }
}

crate::entity! {
    pub struct Order {
        table: "orders",
        key: id,
        fields {
            id: i64,
            status: String,
            region: String,
            customer_id: Option<i64>,
            total: f64,
        }
        relations { customer: customer_id -> Customer.id }
    }
}

pub fn registry() -> Arc<MetadataRegistry> {
    MetadataRegistry::builder()
        .register::<Customer>()
        .register::<Order>()
        .build()
        .expect("test registry is valid")
}

pub fn fixture_store() -> MemoryStore {
    let store = MemoryStore::new(registry());
    for (id, name, tier) in [(1, "ACME", Some("GOLD")), (2, "Globex", None)] {
        store
            .insert(
                NewRow::<Customer>::new()
                    .set(Customer::id, id)
                    .set(Customer::name, name)
                    .set(Customer::tier, tier.map(String::from)),
            )
            .expect("customer row is complete");
    }
    let orders = [
        (1, "OPEN", "EAST", Some(1i64), 100.0),
        (2, "OPEN", "WEST", Some(2), 50.0),
        (3, "CLOSED", "EAST", Some(2), 75.0),
        (4, "OPEN", "EAST", None, 20.0),
        (5, "OPEN", "WEST", Some(1), 10.0),
    ];
    for (id, status, region, customer_id, total) in orders {
        store
            .insert(
                NewRow::<Order>::new()
                    .set(Order::id, id)
                    .set(Order::status, status)
                    .set(Order::region, region)
                    .set(Order::customer_id, customer_id)
                    .set(Order::total, total),
            )
            .expect("order row is complete");
    }
    store
}

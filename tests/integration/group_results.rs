//! Integration tests for query groups against the in-memory store.
//!
//! Most tests run over a seeded, randomly generated order book so the merge
//! properties (row counts, dedup, ordering) are checked on more than a handful of
//! hand-picked rows.

use fake::faker::company::en::CompanyName;
use fake::Fake;
use querygroup::{
    AttributeTrait, Condition, ConfigurationError, DslError, ExecutionOptions, JoinKind,
    MemoryStore, MetadataRegistry, NewRow, Operand, QueryBuilder, QueryError, QueryGroup,
    QueryStore, SelectPlan, TupleRow, Value,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;

querygroup::entity! {
    pub struct Customer {
        table: "customers",
        key: id,
        fields { id: i64, name: String }
    }
}

querygroup::entity! {
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

const STATUSES: [&str; 3] = ["OPEN", "CLOSED", "HELD"];
const REGIONS: [&str; 4] = ["EAST", "WEST", "NORTH", "SOUTH"];

fn registry() -> Arc<MetadataRegistry> {
    MetadataRegistry::builder()
        .register::<Customer>()
        .register::<Order>()
        .build()
        .expect("registry")
}

/// A store with `orders` random orders over ten customers.
fn seeded_store(seed: u64, orders: i64) -> Arc<MemoryStore> {
    let mut rng = StdRng::seed_from_u64(seed);
    let store = MemoryStore::new(registry());
    for id in 1..=10i64 {
        let name: String = CompanyName().fake_with_rng(&mut rng);
        store
            .insert(
                NewRow::<Customer>::new()
                    .set(Customer::id, id)
                    .set(Customer::name, name),
            )
            .expect("customer");
    }
    for id in 1..=orders {
        let customer_id = if rng.gen_bool(0.1) {
            None
        } else {
            Some(rng.gen_range(1..=10i64))
        };
        // Unique totals keep orderings by total deterministic.
        let total = f64::from(rng.gen_range(1..500u32)) + id as f64 / 1000.0;
        store
            .insert(
                NewRow::<Order>::new()
                    .set(Order::id, id)
                    .set(Order::status, *STATUSES.choose(&mut rng).expect("status"))
                    .set(Order::region, *REGIONS.choose(&mut rng).expect("region"))
                    .set(Order::customer_id, customer_id)
                    .set(Order::total, total),
            )
            .expect("order");
    }
    Arc::new(store)
}

fn ids(group: &QueryGroup<Order>, rows: &[TupleRow]) -> Vec<i64> {
    rows.iter()
        .map(|row| group.get(row, Order::id).expect("id"))
        .collect()
}

fn region_group(regions: &[&'static str]) -> QueryGroup<Order> {
    let mut group = QueryGroup::<Order>::new(registry());
    group.multiselect(Order::id).expect("id");
    group.multiselect(Order::region).expect("region");
    group.set_common(|_, c| c.push(Order::status.eq("OPEN")));
    for &region in regions {
        group.add_item(move |_, c| c.push(Order::region.eq(region)));
    }
    group
}

fn item_count(store: &MemoryStore, region: &str) -> u64 {
    let mut query = QueryBuilder::<Order>::new(registry());
    query
        .filter(Order::status.eq("OPEN"))
        .filter(Order::region.eq(region));
    query.count(store).expect("count")
}

#[test]
fn test_row_count_is_sum_of_items_without_distinct() {
    for seed in 0..5 {
        let store = seeded_store(seed, 200);
        let regions = ["EAST", "WEST", "EAST", "NORTH"];
        let group = region_group(&regions);
        let rows = group.get_results(&store).expect("rows");
        let expected: u64 = regions.iter().map(|r| item_count(&store, r)).sum();
        assert_eq!(rows.len() as u64, expected, "seed {seed}");
    }
}

#[test]
fn test_distinct_rows_are_unique() {
    for seed in 0..5 {
        let store = seeded_store(seed, 200);
        let regions = ["EAST", "WEST", "EAST", "NORTH"];
        let mut group = region_group(&regions);
        group.distinct();
        let rows = group.get_results(&store).expect("rows");

        let expected: u64 = regions.iter().map(|r| item_count(&store, r)).sum();
        assert!(rows.len() as u64 <= expected);
        let unique: HashSet<&TupleRow> = rows.iter().collect();
        assert_eq!(unique.len(), rows.len(), "seed {seed}");
        // EAST appears twice; its rows must survive once.
        let east = rows
            .iter()
            .filter(|row| group.get(row, Order::region).expect("region") == "EAST")
            .count() as u64;
        assert_eq!(east, item_count(&store, "EAST"));
    }
}

#[test]
fn test_get_matches_single_attribute_query() {
    let store = seeded_store(11, 80);
    let mut group = QueryGroup::<Order>::new(registry());
    group.multiselect(Order::id).expect("id");
    group.multiselect(Order::total).expect("total");
    group
        .add_item(|_, c| c.push(Order::total.lt(100.0)))
        .add_item(|_, c| c.push(Order::total.gte(400.0)));

    for row in group.get_results(&store).expect("rows") {
        let id = group.get(&row, Order::id).expect("id");
        let mut query = QueryBuilder::<Order>::new(registry());
        query.select(Order::total).expect("select");
        query.filter(Order::id.eq(id));
        let single: Vec<TupleRow> = query.execute_tuples(store.as_ref()).expect("single").collect();
        assert_eq!(single.len(), 1);
        assert_eq!(
            Some(&Value::Double(Some(group.get(&row, Order::total).expect("total")))),
            single[0].get(0)
        );
    }
}

#[test]
fn test_multiselect_twice_keeps_shape() {
    let mut group = QueryGroup::<Order>::new(registry());
    let first = group.multiselect(Order::status).expect("status");
    let shape = group.projection().clone();
    let second = group.multiselect(Order::status).expect("status");
    assert_eq!(first, second);
    assert_eq!(&shape, group.projection());
}

#[test]
fn test_open_orders_by_region_scenario() {
    let registry = registry();
    let store = MemoryStore::new(registry.clone());
    let orders = [
        (1, "OPEN", "EAST"),
        (2, "OPEN", "WEST"),
        (3, "CLOSED", "EAST"),
        (4, "OPEN", "EAST"),
    ];
    for (id, status, region) in orders {
        store
            .insert(
                NewRow::<Order>::new()
                    .set(Order::id, id)
                    .set(Order::status, status)
                    .set(Order::region, region)
                    .set(Order::total, 1.0),
            )
            .expect("order");
    }
    let store = Arc::new(store);

    let mut group = QueryGroup::<Order>::new(registry);
    group.multiselect(Order::id).expect("id");
    group.set_common(|_, c| c.push(Order::status.eq("OPEN")));
    group
        .add_item(|_, c| c.push(Order::region.eq("EAST")))
        .add_item(|_, c| c.push(Order::region.eq("WEST")))
        .distinct()
        .order_by(Order::id, true);

    let rows = group.get_results(&store).expect("rows");
    assert_eq!(ids(&group, &rows), vec![1, 2, 4]);
}

#[test]
fn test_zero_items_equals_filtered_query() {
    let store = seeded_store(3, 120);
    let mut group = QueryGroup::<Order>::new(registry());
    group.multiselect(Order::id).expect("id");
    group.set_common(|_, c| c.push(Order::region.eq("SOUTH")));
    group.order_by(Order::id, true);
    let grouped = ids(&group, &group.get_results(&store).expect("rows"));

    let mut query = QueryBuilder::<Order>::new(registry());
    query.filter(Order::region.eq("SOUTH")).order_by(Order::id, true);
    let direct: Vec<i64> = query
        .execute(store.as_ref())
        .expect("rows")
        .map(|record| record.get(Order::id).expect("id"))
        .collect();
    assert_eq!(grouped, direct);
}

#[test]
fn test_limit_zero_never_contacts_store() {
    let store = seeded_store(5, 50);
    let mut group = region_group(&["EAST", "WEST"]);
    group.set_common(|query, c| {
        query.limit(0);
        c.push(Order::status.eq("OPEN"));
    });
    let rows = group.get_results(&store).expect("rows");
    assert!(rows.is_empty());
    assert_eq!(store.calls(), 0);
}

#[test]
fn test_distinct_after_ordering_keeps_order() {
    let store = seeded_store(8, 150);
    let mut group = QueryGroup::<Order>::new(registry());
    group.multiselect(Order::region).expect("region");
    group
        .add_item(|_, c| c.push(Order::status.eq("OPEN")))
        .add_item(|_, c| c.push(Order::status.eq("HELD")))
        .distinct()
        .order_by(Order::total, false);
    let regions: Vec<String> = group
        .get_results(&store)
        .expect("rows")
        .iter()
        .map(|row| group.get(row, Order::region).expect("region"))
        .collect();

    // Expected: regions in descending-total order, first occurrence of each.
    let mut query = QueryBuilder::<Order>::new(registry());
    query
        .filter(Order::status.is_in(["OPEN", "HELD"]))
        .order_by(Order::total, false);
    let mut expected: Vec<String> = Vec::new();
    for record in query.execute(store.as_ref()).expect("rows") {
        let region = record.get(Order::region).expect("region");
        if !expected.contains(&region) {
            expected.push(region);
        }
    }
    assert_eq!(regions, expected);
}

#[test]
fn test_parallel_and_sequential_results_agree() {
    let store = seeded_store(21, 300);
    let regions = ["EAST", "WEST", "NORTH", "SOUTH", "EAST", "WEST"];
    let build = |options: ExecutionOptions| {
        let mut group = QueryGroup::<Order>::with_options(registry(), options);
        group.multiselect(Order::id).expect("id");
        group.multiselect(Order::region).expect("region");
        for region in regions {
            group.add_item(move |_, c| c.push(Order::region.eq(region)));
        }
        group.distinct().order_by(Order::total, true).order_by(Order::id, true);
        group
    };
    let sequential = build(ExecutionOptions::sequential());
    let parallel = build(ExecutionOptions {
        max_parallel: 3,
        ..ExecutionOptions::default()
    });
    assert_eq!(
        sequential.get_results(&store).expect("rows"),
        parallel.get_results(&store).expect("rows")
    );
}

#[test]
fn test_joined_attribute_in_projection() {
    let store = seeded_store(2, 60);
    let mut group = QueryGroup::<Order>::new(registry());
    let customer = group.join(Order::customer, JoinKind::Left);
    let name = customer.attr(Customer::name);
    group.multiselect(Order::id).expect("id");
    group.multiselect_as(name.clone(), "customer").expect("name");
    group.add_item(|_, c| c.push(Order::customer_id.is_null()));
    for row in group.get_results(&store).expect("rows") {
        assert_eq!(group.get_joined(&row, &name).expect("name"), None);
        assert_eq!(group.get_alias(&row, "customer"), Some(&Value::String(None)));
    }
}

/// Delegates to a memory store, failing every plan that compares against
/// `poisoned`.
struct FlakyStore {
    inner: Arc<MemoryStore>,
    poisoned: Value,
}

impl FlakyStore {
    fn mentions(condition: &Condition, value: &Value) -> bool {
        match condition {
            Condition::And(items) | Condition::Or(items) => {
                items.iter().any(|c| Self::mentions(c, value))
            }
            Condition::Not(inner) => Self::mentions(inner, value),
            Condition::Leaf(leaf) => leaf.operand == Operand::Value(value.clone()),
        }
    }
}

impl QueryStore for FlakyStore {
    fn fetch(&self, plan: &SelectPlan) -> Result<Vec<Vec<Value>>, QueryError> {
        match &plan.condition {
            Some(condition) if Self::mentions(condition, &self.poisoned) => {
                Err(QueryError::Execution(format!("{} is offline", self.poisoned)))
            }
            _ => self.inner.fetch(plan),
        }
    }

    fn count(&self, plan: &SelectPlan) -> Result<u64, QueryError> {
        self.inner.count(plan)
    }
}

#[test]
fn test_failing_item_aborts_group() {
    let store = Arc::new(FlakyStore {
        inner: seeded_store(4, 40),
        poisoned: Value::from("NORTH"),
    });
    for options in [ExecutionOptions::sequential(), ExecutionOptions::default()] {
        let mut group = QueryGroup::<Order>::with_options(registry(), options);
        group.multiselect(Order::id).expect("id");
        for region in REGIONS {
            group.add_item(move |_, c| c.push(Order::region.eq(region)));
        }
        let err = group.get_results(&store).unwrap_err();
        match err {
            DslError::Query(QueryError::Execution(message)) => assert!(message.contains("NORTH")),
            other => panic!("expected execution error, got {other:?}"),
        }
    }
}

/// Drops the trailing cell of every row it returns.
struct TruncatingStore {
    inner: Arc<MemoryStore>,
}

impl QueryStore for TruncatingStore {
    fn fetch(&self, plan: &SelectPlan) -> Result<Vec<Vec<Value>>, QueryError> {
        let mut rows = self.inner.fetch(plan)?;
        for row in &mut rows {
            row.pop();
        }
        Ok(rows)
    }

    fn count(&self, plan: &SelectPlan) -> Result<u64, QueryError> {
        self.inner.count(plan)
    }
}

#[test]
fn test_short_rows_from_store_are_decode_errors() {
    let store = Arc::new(TruncatingStore {
        inner: seeded_store(5, 30),
    });
    for options in [ExecutionOptions::sequential(), ExecutionOptions::default()] {
        let mut group = QueryGroup::<Order>::with_options(registry(), options);
        group.multiselect(Order::id).expect("id");
        group.order_by(Order::total, false);
        for region in REGIONS {
            group.add_item(move |_, c| c.push(Order::region.eq(region)));
        }
        let err = group.get_results(&store).unwrap_err();
        assert!(
            matches!(err, DslError::Query(QueryError::Decode(_))),
            "expected decode error, got {err:?}"
        );
    }
}

#[test]
fn test_configuration_errors_surface_before_execution() {
    let store = seeded_store(1, 10);
    let mut group = QueryGroup::<Order>::new(registry());
    group.multiselect(Order::id).expect("id");
    group.order_by_field("priority", true);
    let err = group.get_results(&store).unwrap_err();
    assert!(matches!(
        err,
        DslError::Configuration(ConfigurationError::UnknownAttribute { .. })
    ));
    assert_eq!(store.calls(), 0);
}

//! Integration tests for single queries, joins and the read-side DAO.

use querygroup::query::AttributeValues;
use querygroup::{
    AttributeTrait, Condition, ConfigurationError, Dao, DslError, JoinKind, MemoryStore,
    MetadataRegistry, NewRow, QueryBuilder,
};
use std::sync::Arc;

querygroup::entity! {
    pub struct Country {
        table: "countries",
        key: id,
        fields { id: i64, code: String }
    }
}

querygroup::entity! {
    pub struct Customer {
        table: "customers",
        key: id,
        fields { id: i64, name: String, country_id: Option<i64> }
        relations { country: country_id -> Country.id }
    }
}

querygroup::entity! {
    pub struct Invoice {
        table: "invoices",
        key: number,
        fields { number: i64, customer_id: i64, memo: Option<String>, paid: bool }
        relations { customer: customer_id -> Customer.id }
    }
}

fn registry() -> Arc<MetadataRegistry> {
    MetadataRegistry::builder()
        .register::<Country>()
        .register::<Customer>()
        .register::<Invoice>()
        .build()
        .expect("registry")
}

fn store() -> Arc<MemoryStore> {
    let store = MemoryStore::new(registry());
    for (id, code) in [(1, "AU"), (2, "NZ")] {
        store
            .insert(NewRow::<Country>::new().set(Country::id, id).set(Country::code, code))
            .expect("country");
    }
    for (id, name, country) in [
        (10, "Wombat Pty", Some(1i64)),
        (11, "Kiwi Ltd", Some(2)),
        (12, "Nomad", None),
    ] {
        store
            .insert(
                NewRow::<Customer>::new()
                    .set(Customer::id, id)
                    .set(Customer::name, name)
                    .set(Customer::country_id, country),
            )
            .expect("customer");
    }
    for (number, customer, memo, paid) in [
        (100, 10, Some("50% deposit"), true),
        (101, 10, None, false),
        (102, 11, Some("final"), false),
        (103, 12, Some("500 units"), true),
    ] {
        store
            .insert(
                NewRow::<Invoice>::new()
                    .set(Invoice::number, number)
                    .set(Invoice::customer_id, customer)
                    .set(Invoice::memo, memo.map(String::from))
                    .set(Invoice::paid, paid),
            )
            .expect("invoice");
    }
    Arc::new(store)
}

fn numbers(query: &QueryBuilder<Invoice>, store: &MemoryStore) -> Vec<i64> {
    query
        .execute(store)
        .expect("rows")
        .map(|record| record.get(Invoice::number).expect("number"))
        .collect()
}

#[test]
fn test_multi_hop_join() {
    let store = store();
    let mut query = QueryBuilder::<Invoice>::new(registry());
    let customer = query.join(Invoice::customer, JoinKind::Inner);
    let country = query.join_from(&customer, Customer::country, JoinKind::Inner);
    query
        .filter(country.attr(Country::code).eq("AU"))
        .order_by(Invoice::number, false);
    assert_eq!(numbers(&query, &store), vec![101, 100]);

    let (sql, _) = query.to_sql().expect("sql");
    assert!(sql.contains(r#"INNER JOIN "customers" AS "t1""#));
    assert!(sql.contains(r#"INNER JOIN "countries" AS "t2" ON "t1"."country_id" = "t2"."id""#));
}

#[test]
fn test_left_join_keeps_customers_without_country() {
    let store = store();
    let mut query = QueryBuilder::<Invoice>::new(registry());
    let customer = query.join(Invoice::customer, JoinKind::Inner);
    let country = query.join_from(&customer, Customer::country, JoinKind::Left);
    query.select(Invoice::number).expect("number");
    query
        .select_as(country.attr(Country::code), "country")
        .expect("country");
    query.order_by(Invoice::number, true);

    let countries: Vec<String> = query
        .execute_tuples(store.as_ref())
        .expect("rows")
        .map(|row| row.get_alias("country").map(ToString::to_string).unwrap_or_default())
        .collect();
    assert_eq!(countries, vec!["'AU'", "'AU'", "'NZ'", "NULL"]);
}

#[test]
fn test_like_escapes_wildcards() {
    let store = store();
    let mut query = QueryBuilder::<Invoice>::new(registry());
    query.filter(Invoice::memo.like("50\\%%"));
    assert_eq!(numbers(&query, &store), vec![100]);

    let mut query = QueryBuilder::<Invoice>::new(registry());
    query
        .filter(Invoice::memo.like("%0%"))
        .order_by(Invoice::number, true);
    assert_eq!(numbers(&query, &store), vec![100, 103]);
}

#[test]
fn test_or_and_not_composition() {
    let store = store();
    let paid_or_final = Invoice::paid.eq(true).or(Invoice::memo.eq(Some("final".to_string())));
    let mut query = QueryBuilder::<Invoice>::new(registry());
    query
        .filter(paid_or_final.clone())
        .order_by(Invoice::number, true);
    assert_eq!(numbers(&query, &store), vec![100, 102, 103]);

    // 101 is unpaid with no memo: the predicate is unknown, and so is its negation.
    let mut query = QueryBuilder::<Invoice>::new(registry());
    query.filter(paid_or_final.not());
    assert!(numbers(&query, &store).is_empty());
}

#[test]
fn test_projection_registration_rules() {
    let mut query = QueryBuilder::<Invoice>::new(registry());
    assert_eq!(query.select(Invoice::number).expect("number"), 0);
    assert_eq!(query.select_as(Invoice::paid, "paid").expect("paid"), 1);
    assert_eq!(query.select(Invoice::number).expect("number"), 0);
    let err = query.select_as(Invoice::memo, "paid").unwrap_err();
    assert_eq!(err, ConfigurationError::DuplicateAlias("paid".to_string()));
    assert_eq!(query.projection().len(), 2);
}

#[test]
fn test_rows_are_single_pass() {
    let store = store();
    let query = QueryBuilder::<Invoice>::new(registry());
    let mut rows = query.execute(store.as_ref()).expect("rows");
    assert_eq!(rows.len(), 4);
    rows.next();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.by_ref().count(), 3);
    assert!(rows.next().is_none());
}

#[test]
fn test_condition_survives_json() {
    let condition = Invoice::paid
        .eq(true)
        .and(Invoice::memo.is_not_null())
        .and(Invoice::customer_id.is_in([10, 11]));
    let json = serde_json::to_string(&condition).expect("serialize");
    let back: Condition = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, condition);
}

#[test]
fn test_dao_over_joined_entities() {
    let store = store();
    let dao: Dao<Invoice, MemoryStore> = Dao::new(registry(), Arc::clone(&store));

    let wombat = dao
        .find_all_by_attribute_join(Invoice::customer, Customer::name, "Wombat Pty", JoinKind::Inner)
        .expect("rows");
    assert_eq!(wombat.len(), 2);

    let invoice = dao.find_by_id(102i64).expect("lookup").expect("invoice 102");
    assert_eq!(invoice.get(Invoice::memo).expect("memo"), Some("final".to_string()));

    let unpaid_for_10 = dao
        .find_one_by_attributes(
            AttributeValues::new()
                .with(Invoice::customer_id, 10)
                .with(Invoice::paid, false),
        )
        .expect("lookup");
    assert_eq!(
        unpaid_for_10.map(|r| r.get(Invoice::number).expect("number")),
        Some(101)
    );
    assert_eq!(dao.count_by_attribute(Invoice::paid, true).expect("count"), 2);
}

#[test]
fn test_build_errors_are_configuration_errors() {
    let store = store();
    let mut query = QueryBuilder::<Invoice>::new(registry());
    query.filter(Invoice::memo.eq(None::<String>));
    let err = query.execute(store.as_ref()).unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(store.calls(), 0);

    let unregistered = MetadataRegistry::builder()
        .register::<Country>()
        .build()
        .expect("registry");
    let query = QueryBuilder::<Invoice>::new(unregistered);
    assert!(matches!(
        query.build(),
        Err(ConfigurationError::UnknownEntity(name)) if name == "Invoice"
    ));
    let err: DslError = query.count(store.as_ref()).unwrap_err();
    assert!(err.is_configuration());
}

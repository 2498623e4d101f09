#[path = "helpers.rs"]
mod helpers;

use helpers::{init_logging, setup_test_db, shop_metadata};
use pretty_assertions::assert_eq;
use refract::{
    DataSource, DatabaseSource, EntityMetadata, KeyFilter, MapperRegistry, Query, RefractKey,
    ScalarType, Value,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize, PartialEq)]
struct CustomerView {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize, PartialEq)]
struct OrderView {
    number: String,
    total: f64,
    customer: Option<CustomerView>,
    region: Option<String>,
}

#[tokio::test]
async fn test_select_statement_filters_by_key() {
    let db = setup_test_db().await;
    let source = DatabaseSource::new(db);
    let metadata = shop_metadata();
    let customer = metadata.require_entity("Customer").unwrap();

    let statement = source.select_statement(
        customer,
        Some(&KeyFilter::new("id", vec![RefractKey::Int(5), RefractKey::Int(6)])),
    );

    assert_eq!(
        statement.sql,
        r#"SELECT "id", "name", "region_id" FROM "customer" WHERE "id" IN (?, ?)"#
    );
}

#[tokio::test]
async fn test_untyped_columns_decode_by_stored_type() {
    init_logging();
    let db = setup_test_db().await;
    let source = DatabaseSource::new(db);
    let orders = EntityMetadata::new("Order")
        .table("orders")
        .key("id", ScalarType::Any)
        .column("number", ScalarType::Any)
        .column("customer_id", ScalarType::Any)
        .column("total", ScalarType::Any);

    let mut rows = source
        .load(
            &orders,
            Some(&KeyFilter::new("id", vec![RefractKey::Int(1), RefractKey::Int(4)])),
        )
        .await
        .unwrap();
    rows.sort_by_key(|row| row.value("id").as_key());

    let decoded: Vec<Vec<Value>> = rows
        .iter()
        .map(|row| {
            ["id", "number", "customer_id", "total"]
                .iter()
                .map(|column| row.value(column).clone())
                .collect()
        })
        .collect();
    assert_eq!(
        decoded,
        vec![
            vec![Value::Int(1), Value::from("A-1"), Value::Int(5), Value::Float(10.5)],
            vec![Value::Int(4), Value::from("A-4"), Value::Null, Value::Float(1.0)],
        ]
    );
}

#[tokio::test]
async fn test_orders_are_mapped_from_sqlite() {
    init_logging();
    let db = setup_test_db().await;
    let registry = MapperRegistry::<()>::builder(shop_metadata())
        .map("Order", "OrderDto", |m| {
            m.field("number");
            m.field("total");
            m.field("customer").mapped("CustomerDto").fetch();
            m.field("region").from("customer.region.name");
        })
        .map("Customer", "CustomerDto", |m| {
            m.field("id");
            m.field("name");
        })
        .build()
        .unwrap();

    let orders: Vec<OrderView> = registry
        .map_into(
            Query::all("Order").filter_in("id", vec![2, 4]),
            "OrderDto",
            Arc::new(DatabaseSource::new(db.clone())),
            (),
        )
        .await
        .unwrap();

    assert_eq!(
        orders,
        vec![
            OrderView {
                number: "A-2".into(),
                total: 20.0,
                customer: Some(CustomerView { id: 6, name: "Grace".into() }),
                region: Some("South".into()),
            },
            OrderView {
                number: "A-4".into(),
                total: 1.0,
                customer: None,
                region: None,
            },
        ]
    );
}

#[tokio::test]
async fn test_reverse_fetch_from_sqlite() {
    init_logging();
    let db = setup_test_db().await;
    let registry = MapperRegistry::<()>::builder(shop_metadata())
        .map("Customer", "CustomerDto", |m| {
            m.field("name");
            m.field("orders").mapped("OrderDto").fetch();
        })
        .map("Order", "OrderDto", |m| {
            m.field("number");
        })
        .build()
        .unwrap();

    let mapped = registry
        .map(
            Query::all("Customer"),
            "CustomerDto",
            Arc::new(DatabaseSource::new(db)),
            (),
        )
        .await
        .unwrap();

    let mut json = mapped.to_json().unwrap();
    // SQLite returns rows without a guaranteed order unless asked
    for customer in json.as_array_mut().unwrap() {
        let orders = customer["orders"].as_array_mut().unwrap();
        orders.sort_by_key(|order| order["number"].as_str().unwrap_or_default().to_string());
    }
    let mut customers = json.as_array().unwrap().clone();
    customers.sort_by_key(|customer| customer["name"].as_str().unwrap_or_default().to_string());
    assert_eq!(
        serde_json::Value::Array(customers),
        serde_json::json!([
            { "name": "Ada", "orders": [{ "number": "A-1" }, { "number": "A-3" }] },
            { "name": "Grace", "orders": [{ "number": "A-2" }] },
            { "name": "Linus", "orders": [] },
        ])
    );
    assert_eq!(mapped.stats.waves, 1);
    assert_eq!(mapped.stats.loads, 2);
}

#[path = "helpers.rs"]
mod helpers;

use helpers::{init_logging, shop_metadata, shop_source};
use pretty_assertions::assert_eq;
use refract::{
    row, Include, KeyFilter, MapperRegistry, MemorySource, Query, RefractError, RefractKey,
    RegistryConfig, Row, ScalarType, Value,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

struct Storefront {
    currency: String,
}

#[tokio::test]
async fn test_primitive_members_are_copied() {
    init_logging();
    let registry = MapperRegistry::<()>::builder(shop_metadata())
        .map("Customer", "CustomerDto", |m| {
            m.field("id");
            m.field("name");
        })
        .build()
        .unwrap();
    let source = shop_source();

    let mapped = registry
        .map(Query::all("Customer"), "CustomerDto", source.clone(), ())
        .await
        .unwrap();

    assert_eq!(
        mapped.to_json().unwrap(),
        json!([
            { "id": 5, "name": "Ada" },
            { "id": 6, "name": "Grace" },
            { "id": 7, "name": "Linus" },
        ])
    );
    assert_eq!(mapped.stats.waves, 0);
    assert_eq!(mapped.stats.loads, 1);
    assert_eq!(source.loads().len(), 1);
}

#[tokio::test]
async fn test_navigation_paths_are_flattened() {
    init_logging();
    let registry = MapperRegistry::<()>::builder(shop_metadata())
        .map("Order", "OrderDto", |m| {
            m.field("number");
            m.field("customerName").from("customer.name");
            m.field("regionName").from("customer.region.name");
        })
        .build()
        .unwrap();
    let source = shop_source();

    let mapped = registry
        .map(Query::all("Order"), "OrderDto", source.clone(), ())
        .await
        .unwrap();

    assert_eq!(mapped.objects[0].get("customerName"), Value::from("Ada"));
    assert_eq!(mapped.objects[1].get("regionName"), Value::from("South"));
    // no customer: the whole path reads as null
    assert_eq!(mapped.objects[3].get("customerName"), Value::Null);
    assert_eq!(mapped.objects[3].get("regionName"), Value::Null);
    // orders, then one load per include level
    assert_eq!(source.loads_of("Customer"), 1);
    assert_eq!(source.loads_of("Region"), 1);
    assert_eq!(mapped.stats.loads, 3);
}

#[tokio::test]
async fn test_null_navigation_maps_to_null_object() {
    init_logging();
    let registry = MapperRegistry::<()>::builder(shop_metadata())
        .map("Order", "OrderDto", |m| {
            m.field("id");
            m.field("customer").mapped("CustomerDto");
        })
        .map("Customer", "CustomerDto", |m| {
            m.field("id");
            m.field("name");
        })
        .build()
        .unwrap();
    let source = shop_source();

    let mapped = registry
        .map(Query::all("Order").filter_in("id", vec![1, 4]), "OrderDto", source.clone(), ())
        .await
        .unwrap();

    let customer = mapped.objects[0].get("customer");
    let customer = customer.as_object().unwrap();
    assert_eq!(customer.type_name(), "CustomerDto");
    assert_eq!(customer.get("name"), Value::from("Ada"));
    assert_eq!(mapped.objects[1].get("customer"), Value::Null);
    assert_eq!(mapped.stats.waves, 0);
    assert_eq!(
        source.loads()[1].filter,
        Some(KeyFilter::new("id", vec![RefractKey::Int(5)]))
    );
}

#[derive(Debug, Deserialize, PartialEq)]
struct LineView {
    quantity: i64,
    product_name: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct OrderView {
    id: i64,
    lines: Vec<LineView>,
}

#[tokio::test]
async fn test_inline_sequences_nest_their_includes() {
    init_logging();
    let registry = MapperRegistry::<()>::builder(shop_metadata())
        .map("Order", "OrderDto", |m| {
            m.field("id");
            m.field("lines").mapped("LineDto");
        })
        .map("OrderLine", "LineDto", |m| {
            m.field("quantity");
            m.field("product_name").from("product.name");
        })
        .build()
        .unwrap();
    let source = shop_source();

    let orders: Vec<OrderView> = registry
        .map_into(Query::all("Order"), "OrderDto", source.clone(), ())
        .await
        .unwrap();

    assert_eq!(
        orders,
        vec![
            OrderView {
                id: 1,
                lines: vec![
                    LineView { quantity: 2, product_name: Some("Lamp".into()) },
                    LineView { quantity: 1, product_name: Some("Desk".into()) },
                ],
            },
            OrderView {
                id: 2,
                lines: vec![LineView { quantity: 5, product_name: Some("Lamp".into()) }],
            },
            OrderView { id: 3, lines: vec![] },
            OrderView { id: 4, lines: vec![] },
        ]
    );
    let loaded: Vec<String> = source.loads().into_iter().map(|load| load.entity).collect();
    assert_eq!(loaded, vec!["Order", "OrderLine", "Product"]);
}

#[tokio::test]
async fn test_repeated_entities_share_one_destination() {
    init_logging();
    let declare = |config: RegistryConfig| {
        MapperRegistry::<()>::builder(shop_metadata())
            .config(config)
            .map("Order", "OrderDto", |m| {
                m.field("customer").mapped("CustomerDto");
            })
            .map("Customer", "CustomerDto", |m| {
                m.field("name");
            })
            .build()
            .unwrap()
    };
    let query = || Query::all("Order").filter_in("id", vec![1, 3]);

    let cached = declare(RegistryConfig::default())
        .map(query(), "OrderDto", shop_source(), ())
        .await
        .unwrap();
    let first = cached.objects[0].get("customer");
    let second = cached.objects[1].get("customer");
    assert!(first.as_object().unwrap().ptr_eq(second.as_object().unwrap()));

    let uncached = declare(RegistryConfig {
        cache_destinations: false,
        ..RegistryConfig::default()
    })
    .map(query(), "OrderDto", shop_source(), ())
    .await
    .unwrap();
    let first = uncached.objects[0].get("customer");
    let second = uncached.objects[1].get("customer");
    assert!(!first.as_object().unwrap().ptr_eq(second.as_object().unwrap()));
    assert_eq!(first.as_object().unwrap().get("name"), Value::from("Ada"));
}

#[tokio::test]
async fn test_entities_sharing_a_key_stay_distinct() {
    init_logging();
    let registry = MapperRegistry::<()>::builder(shop_metadata())
        .map("Customer", "NamedDto", |m| {
            m.field("name");
            m.field("region").mapped("NamedDto");
        })
        .map("Region", "NamedDto", |m| {
            m.field("name");
        })
        .build()
        .unwrap();
    let source = MemorySource::new();
    source.insert("Region", row! { "id" => 1, "name" => "North" });
    source.insert("Customer", row! { "id" => 1, "name" => "Ada", "region_id" => 1 });

    let mapped = registry
        .map(Query::all("Customer"), "NamedDto", Arc::new(source), ())
        .await
        .unwrap();

    let customer = &mapped.objects[0];
    let region = customer.get("region");
    let region = region.as_object().unwrap();
    assert_eq!(customer.get("name"), Value::from("Ada"));
    assert_eq!(region.get("name"), Value::from("North"));
    assert!(!region.ptr_eq(customer));
    assert_eq!(
        mapped.to_json().unwrap(),
        json!([{ "name": "Ada", "region": { "name": "North" } }])
    );
}

#[tokio::test]
async fn test_computed_members_see_the_ambient_context() {
    init_logging();
    let registry = MapperRegistry::<Storefront>::builder(shop_metadata())
        .map("Order", "OrderDto", |m| {
            m.field("total")
                .compute(|row: &Row, cx: &Storefront| {
                    let total = row.value("total");
                    Ok(Value::from(format!("{} {}", total, cx.currency)))
                })
                .typed(ScalarType::String);
            m.field("number").to(|value, cx: Arc<Storefront>| async move {
                let number = value.as_str().unwrap_or_default().to_string();
                Ok(Value::from(format!("{}/{}", cx.currency, number)))
            });
        })
        .build()
        .unwrap();

    let mapped = registry
        .map(
            Query::all("Order").filter_in("id", vec![1]),
            "OrderDto",
            shop_source(),
            Storefront { currency: "EUR".into() },
        )
        .await
        .unwrap();

    assert_eq!(
        mapped.to_json().unwrap(),
        json!([{ "total": "10.5 EUR", "number": "EUR/A-1" }])
    );
}

#[tokio::test]
async fn test_transposer_failures_carry_item_context() {
    init_logging();
    let registry = MapperRegistry::<()>::builder(shop_metadata())
        .map("Customer", "CustomerDto", |m| {
            m.field("name")
                .convert(|_| Err(RefractError::external("name lookup failed")));
        })
        .build()
        .unwrap();

    let error = registry
        .map(Query::all("Customer"), "CustomerDto", shop_source(), ())
        .await
        .unwrap_err();

    match &error {
        RefractError::Transpose {
            item,
            value_type,
            field,
            cause,
            ..
        } => {
            assert_eq!(item, "name");
            assert_eq!(value_type, "string");
            assert_eq!(field, "name");
            assert!(matches!(**cause, RefractError::External { .. }));
        }
        other => panic!("expected a transpose error, got {:?}", other),
    }
    assert!(error.to_string().contains("name lookup failed"));
}

#[tokio::test]
async fn test_assignment_type_mismatch_is_reported() {
    init_logging();
    let registry = MapperRegistry::<()>::builder(shop_metadata())
        .map("Customer", "CustomerDto", |m| {
            m.field("name").typed(ScalarType::Int);
        })
        .build()
        .unwrap();

    let error = registry
        .map(Query::all("Customer"), "CustomerDto", shop_source(), ())
        .await
        .unwrap_err();

    assert_eq!(
        error.to_string(),
        "RefractError::Assignment: error assigning 'name' of type string to destination 'name' of type int"
    );
}

#[tokio::test]
async fn test_query_failures_name_the_projection() {
    init_logging();
    let registry = MapperRegistry::<()>::builder(shop_metadata())
        .map("Order", "OrderDto", |m| {
            m.field("number");
        })
        .build()
        .unwrap();

    let query = Query::all("Order").include(Include::new("warehouse"));
    let error = registry
        .map(query, "OrderDto", shop_source(), ())
        .await
        .unwrap_err();

    match error {
        RefractError::Query { projection, cause } => {
            assert_eq!(
                projection,
                "Order -> OrderDto { __id: id, __customer_id: customer_id, number: number }"
            );
            assert!(matches!(*cause, RefractError::RelationNotFound { .. }));
        }
        other => panic!("expected a query error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_self_referencing_destinations_cannot_be_serialized() {
    init_logging();
    let registry = MapperRegistry::<()>::builder(shop_metadata())
        .map("Customer", "CustomerDto", |m| {
            m.field("name");
            m.after(|customer, _| async move {
                customer.set("itself", customer.clone());
                Ok(())
            });
        })
        .build()
        .unwrap();

    let mapped = registry
        .map(Query::all("Customer"), "CustomerDto", shop_source(), ())
        .await
        .unwrap();

    assert!(matches!(
        mapped.to_json(),
        Err(RefractError::CyclicGraph { .. })
    ));
}

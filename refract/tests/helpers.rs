use std::sync::Arc;

use refract::{
    row, EntityMetadata, MemorySource, MetadataRegistry, RelationshipMetadata, ScalarType, Value,
};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};

#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Regions, customers with profiles, orders with lines and products
#[allow(dead_code)]
pub fn shop_metadata() -> Arc<dyn RelationshipMetadata> {
    Arc::new(
        MetadataRegistry::new()
            .with(
                EntityMetadata::new("Region")
                    .key("id", ScalarType::Int)
                    .column("name", ScalarType::String),
            )
            .with(
                EntityMetadata::new("Customer")
                    .key("id", ScalarType::Int)
                    .column("name", ScalarType::String)
                    .column("region_id", ScalarType::Int)
                    .belongs_to("region", "Region", "region_id", "id")
                    .has_many("orders", "Order", "customer_id", "id")
                    .has_one("profile", "Profile", "customer_id", "id"),
            )
            .with(
                EntityMetadata::new("Profile")
                    .key("id", ScalarType::Int)
                    .column("customer_id", ScalarType::Int)
                    .column("bio", ScalarType::String)
                    .belongs_to("customer", "Customer", "customer_id", "id"),
            )
            .with(
                EntityMetadata::new("Order")
                    .table("orders")
                    .key("id", ScalarType::Int)
                    .column("number", ScalarType::String)
                    .column("customer_id", ScalarType::Int)
                    .column("total", ScalarType::Float)
                    .belongs_to("customer", "Customer", "customer_id", "id")
                    .has_many("lines", "OrderLine", "order_id", "id"),
            )
            .with(
                EntityMetadata::new("OrderLine")
                    .key("id", ScalarType::Int)
                    .column("order_id", ScalarType::Int)
                    .column("product_id", ScalarType::Int)
                    .column("quantity", ScalarType::Int)
                    .belongs_to("order", "Order", "order_id", "id")
                    .belongs_to("product", "Product", "product_id", "id"),
            )
            .with(
                EntityMetadata::new("Product")
                    .key("id", ScalarType::Int)
                    .column("name", ScalarType::String),
            ),
    )
}

/// Seeded shop data.
///
/// Customer 7 has no orders and no profile, order 4 has no customer and order 3 no lines.
#[allow(dead_code)]
pub fn shop_source() -> Arc<MemorySource> {
    let source = MemorySource::new();
    source.extend(
        "Region",
        vec![
            row! { "id" => 1, "name" => "North" },
            row! { "id" => 2, "name" => "South" },
        ],
    );
    source.extend(
        "Customer",
        vec![
            row! { "id" => 5, "name" => "Ada", "region_id" => 1 },
            row! { "id" => 6, "name" => "Grace", "region_id" => 2 },
            row! { "id" => 7, "name" => "Linus", "region_id" => 1 },
        ],
    );
    source.insert(
        "Profile",
        row! { "id" => 50, "customer_id" => 5, "bio" => "Mathematician" },
    );
    source.extend(
        "Order",
        vec![
            row! { "id" => 1, "number" => "A-1", "customer_id" => 5, "total" => 10.5 },
            row! { "id" => 2, "number" => "A-2", "customer_id" => 6, "total" => 20.0 },
            row! { "id" => 3, "number" => "A-3", "customer_id" => 5, "total" => 7.0 },
            row! { "id" => 4, "number" => "A-4", "customer_id" => Value::Null, "total" => 1.0 },
        ],
    );
    source.extend(
        "OrderLine",
        vec![
            row! { "id" => 10, "order_id" => 1, "product_id" => 100, "quantity" => 2 },
            row! { "id" => 11, "order_id" => 1, "product_id" => 101, "quantity" => 1 },
            row! { "id" => 12, "order_id" => 2, "product_id" => 100, "quantity" => 5 },
        ],
    );
    source.extend(
        "Product",
        vec![
            row! { "id" => 100, "name" => "Lamp" },
            row! { "id" => 101, "name" => "Desk" },
        ],
    );
    Arc::new(source)
}

#[allow(dead_code)]
pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:?mode=rwc").await.unwrap();
    for statement in [
        "CREATE TABLE region (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        "CREATE TABLE customer (id INTEGER PRIMARY KEY, name TEXT NOT NULL, region_id INTEGER)",
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, number TEXT NOT NULL, customer_id INTEGER, total REAL NOT NULL)",
        "INSERT INTO region (id, name) VALUES (1, 'North'), (2, 'South')",
        "INSERT INTO customer (id, name, region_id) VALUES (5, 'Ada', 1), (6, 'Grace', 2), (7, 'Linus', 1)",
        "INSERT INTO orders (id, number, customer_id, total) VALUES (1, 'A-1', 5, 10.5), (2, 'A-2', 6, 20.0), (3, 'A-3', 5, 7.0), (4, 'A-4', NULL, 1.0)",
    ] {
        db.execute_unprepared(statement).await.unwrap();
    }
    db
}

#[path = "helpers.rs"]
mod helpers;

use helpers::{init_logging, shop_metadata};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use refract::{
    EntityMetadata, MapperKey, MapperRegistry, MetadataRegistry, RefractError, ScalarType,
};
use std::collections::HashMap;
use std::sync::Arc;

fn build_error(
    declare: impl FnOnce(refract::MapperRegistryBuilder<()>) -> refract::MapperRegistryBuilder<()>,
) -> RefractError {
    match declare(MapperRegistry::builder(shop_metadata())).build() {
        Ok(_) => panic!("expected the registry to be rejected"),
        Err(error) => error,
    }
}

#[test]
fn test_unknown_members_are_rejected() {
    init_logging();
    let error = build_error(|builder| {
        builder.map("Customer", "CustomerDto", |m| {
            m.field("nickname");
        })
    });
    assert!(matches!(error, RefractError::UnknownField { ref field, .. } if field == "nickname"));

    let error = build_error(|builder| {
        builder.map("Order", "OrderDto", |m| {
            m.field("vendorName").from("vendor.name");
        })
    });
    assert!(matches!(
        error,
        RefractError::RelationNotFound { ref relation, .. } if relation == "vendor"
    ));

    let error = build_error(|builder| builder.map("Invoice", "InvoiceDto", |_| {}));
    assert!(matches!(error, RefractError::UnknownEntity { .. }));
}

#[test]
fn test_mapped_items_need_a_registered_mapper() {
    init_logging();
    let error = build_error(|builder| {
        builder.map("Order", "OrderDto", |m| {
            m.field("customer").mapped("CustomerDto");
        })
    });
    match error {
        RefractError::MapperNotFound { mapper } => assert_eq!(mapper, "Customer -> CustomerDto"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_fetch_needs_a_mapped_navigation() {
    init_logging();
    let error = build_error(|builder| {
        builder.map("Order", "OrderDto", |m| {
            m.field("number").fetch();
        })
    });
    assert!(error.is_configuration());

    let error = build_error(|builder| {
        builder.map("Order", "OrderDto", |m| {
            m.field("number").mapped("CustomerDto");
        })
    });
    assert!(matches!(error, RefractError::InvalidConfiguration { .. }));
}

#[test]
fn test_self_reference_is_a_cycle() {
    init_logging();
    let metadata = Arc::new(
        MetadataRegistry::new().with(
            EntityMetadata::new("Employee")
                .key("id", ScalarType::Int)
                .column("manager_id", ScalarType::Int)
                .belongs_to("manager", "Employee", "manager_id", "id"),
        ),
    );
    let result = MapperRegistry::<()>::builder(metadata)
        .map("Employee", "EmployeeDto", |m| {
            m.field("manager").mapped("EmployeeDto").fetch();
        })
        .build();
    match result {
        Err(RefractError::MapperCycle { path }) => {
            assert_eq!(path, vec!["Employee -> EmployeeDto", "Employee -> EmployeeDto"])
        }
        other => panic!("expected a cycle, got {:?}", other.err()),
    }
}

#[test]
fn test_commit_order_respects_random_dependencies() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..25 {
        let size = rng.gen_range(2..10);
        let mut edges: Vec<Vec<usize>> = Vec::with_capacity(size);
        let mut metadata = MetadataRegistry::new();
        for node in 0..size {
            let targets: Vec<usize> = (0..node).filter(|_| rng.gen_bool(0.4)).collect();
            let mut entity =
                EntityMetadata::new(format!("Node{}", node)).key("id", ScalarType::Int);
            for target in &targets {
                let column = format!("node{}_id", target);
                entity = entity
                    .column(column.clone(), ScalarType::Int)
                    .belongs_to(format!("to{}", target), format!("Node{}", target), column, "id");
            }
            metadata.register(entity);
            edges.push(targets);
        }

        let mut declared: Vec<usize> = (0..size).collect();
        declared.shuffle(&mut rng);
        let mut builder = MapperRegistry::<()>::builder(Arc::new(metadata));
        for &node in &declared {
            let targets = edges[node].clone();
            builder = builder.map(&format!("Node{}", node), &format!("Dto{}", node), move |m| {
                m.field("id");
                for target in targets {
                    m.field(&format!("to{}", target)).mapped(&format!("Dto{}", target));
                }
            });
        }
        let registry = builder.build().unwrap();

        let position: HashMap<MapperKey, usize> = registry
            .commit_order()
            .iter()
            .enumerate()
            .map(|(index, key)| (key.clone(), index))
            .collect();
        assert_eq!(position.len(), size);
        for (node, targets) in edges.iter().enumerate() {
            let dependent = MapperKey::new(format!("Node{}", node), format!("Dto{}", node));
            for target in targets {
                let dependency =
                    MapperKey::new(format!("Node{}", target), format!("Dto{}", target));
                assert!(
                    position[&dependency] < position[&dependent],
                    "{} must commit before {}",
                    dependency,
                    dependent
                );
            }
        }
    }
}

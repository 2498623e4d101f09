//! Refract compiles declarative entity-to-DTO mappings into projections and
//! resolves deferred relationships with one batched query per relationship and wave.
//!
//! Mappers are declared on a [`MapperRegistryBuilder`] and committed once, in
//! dependency order. [`MapperRegistry::map`] then runs a query through the root
//! mapper, projects every row into a transient record, copies it into
//! [`Destination`] objects and drains the queued fetches and after hooks.

pub mod applicators;
pub mod batch;
pub mod context;
pub mod destination;
pub mod entity_metadata;
pub mod fetchers;
pub mod graph;
pub mod item;
pub mod key_types;
pub mod mapper;
pub mod registry;
pub mod schema;
pub mod source;
pub mod types;
pub mod value;

pub use batch::{BatchItem, BatchProcessor, KeyedBatchProcessor};
pub use context::PassStats;
pub use destination::Destination;
pub use entity_metadata::{
    ColumnMetadata, EntityMetadata, MetadataRegistry, RelationKind, RelationMetadata,
    RelationshipMetadata,
};
pub use fetchers::{EntityFetcher, FetcherFactory, ReverseFetcher, ReverseKey};
pub use item::{
    DestinationShape, ItemDeclaration, MapperBuilder, MapperItem, RelationshipStyle,
    SourceAccessor, SourceShape,
};
pub use key_types::RefractKey;
pub use mapper::{Mapper, MapperKey};
pub use registry::{Mapped, MapperRegistry, MapperRegistryBuilder, RegistryConfig};
pub use schema::{FieldDef, FieldType, Projection, Schema, Slot, Transient};
pub use source::{
    DataSource, DatabaseSource, Include, KeyFilter, LoadRecord, MemorySource, Query,
};
pub use types::{BoxFuture, RefractError, RefractResult};
pub use value::{Row, ScalarType, Value};

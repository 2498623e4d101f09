use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Alias, Expr, Query as SqlQuery};
use sea_orm::{ConnectionTrait, QueryResult, Statement};
use uuid::Uuid;

use super::{DataSource, KeyFilter};
use crate::entity_metadata::EntityMetadata;
use crate::key_types::RefractKey;
use crate::types::RefractResult;
use crate::value::{Row, ScalarType, Value};

/// Loads rows through a SeaORM connection (sqlite or postgres)
#[derive(Debug, Clone)]
pub struct DatabaseSource<C> {
    conn: C,
}

impl<C: ConnectionTrait> DatabaseSource<C> {
    pub fn new(conn: C) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// `SELECT <columns> FROM <table> [WHERE <column> IN (...)]`
    pub fn select_statement(
        &self,
        entity: &EntityMetadata,
        filter: Option<&KeyFilter>,
    ) -> Statement {
        let mut select = SqlQuery::select();
        select.from(Alias::new(entity.table_name.as_str()));
        for column in &entity.columns {
            select.column(Alias::new(column.name.as_str()));
        }
        if let Some(filter) = filter {
            select.and_where(
                Expr::col(Alias::new(filter.column.as_str()))
                    .is_in(filter.keys.iter().map(RefractKey::to_db_value)),
            );
        }
        self.conn.get_database_backend().build(&select)
    }
}

#[async_trait]
impl<C> DataSource for DatabaseSource<C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn load(
        &self,
        entity: &EntityMetadata,
        filter: Option<&KeyFilter>,
    ) -> RefractResult<Vec<Row>> {
        let stmt = self.select_statement(entity, filter);
        log::debug!("refract: {}", stmt);
        let results = self.conn.query_all(stmt).await?;
        results.iter().map(|result| decode_row(entity, result)).collect()
    }
}

fn decode_row(entity: &EntityMetadata, result: &QueryResult) -> RefractResult<Row> {
    let mut row = Row::new();
    for column in &entity.columns {
        let name = column.name.as_str();
        let value: Value = match column.ty {
            ScalarType::Bool => result.try_get::<Option<bool>>("", name)?.into(),
            ScalarType::Int => decode_int(result, name)?,
            ScalarType::Float => decode_float(result, name)?,
            ScalarType::String => result.try_get::<Option<String>>("", name)?.into(),
            ScalarType::Uuid => result.try_get::<Option<Uuid>>("", name)?.into(),
            ScalarType::DateTime => result
                .try_get::<Option<DateTime<FixedOffset>>>("", name)?
                .into(),
            ScalarType::Decimal => result.try_get::<Option<Decimal>>("", name)?.into(),
            ScalarType::Json => decode_json(result, name)?,
            ScalarType::Any => decode_any(result, name)?,
        };
        row.set(name, value);
    }
    Ok(row)
}

/// 64-bit first, then the 32-bit `INTEGER` postgres uses for plain columns
fn decode_int(result: &QueryResult, name: &str) -> RefractResult<Value> {
    match result.try_get::<Option<i64>>("", name) {
        Ok(value) => Ok(value.into()),
        Err(_) => Ok(result.try_get::<Option<i32>>("", name)?.into()),
    }
}

fn decode_float(result: &QueryResult, name: &str) -> RefractResult<Value> {
    match result.try_get::<Option<f64>>("", name) {
        Ok(value) => Ok(value.into()),
        Err(_) => Ok(result
            .try_get::<Option<f32>>("", name)?
            .map(f64::from)
            .into()),
    }
}

fn decode_json(result: &QueryResult, name: &str) -> RefractResult<Value> {
    Ok(result
        .try_get::<Option<serde_json::Value>>("", name)?
        .map(Value::Json)
        .unwrap_or(Value::Null))
}

/// Undeclared column type: take the first decoding the driver accepts
fn decode_any(result: &QueryResult, name: &str) -> RefractResult<Value> {
    if let Ok(value) = decode_int(result, name) {
        return Ok(value);
    }
    if let Ok(value) = decode_float(result, name) {
        return Ok(value);
    }
    if let Ok(value) = result.try_get::<Option<bool>>("", name) {
        return Ok(value.into());
    }
    if let Ok(value) = result.try_get::<Option<String>>("", name) {
        return Ok(value.into());
    }
    if let Ok(value) = result.try_get::<Option<Uuid>>("", name) {
        return Ok(value.into());
    }
    if let Ok(value) = result.try_get::<Option<DateTime<FixedOffset>>>("", name) {
        return Ok(value.into());
    }
    if let Ok(value) = result.try_get::<Option<Decimal>>("", name) {
        return Ok(value.into());
    }
    decode_json(result, name)
}

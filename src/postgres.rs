//! `QueryExecutor` over `may_postgres`.
//!
//! Entity and entity-array projections are selected as `to_jsonb(...)` by
//! wrapping the generated statement, then decoded into records using the
//! field types the projection declares. Plain columns are decoded by their
//! PostgreSQL type.

use crate::config::DatabaseConfig;
use crate::entity::null_for;
use crate::error::{Error, Result};
use crate::executor::{Projection, QueryExecutor, RecordType, Row, RowValue, Rows};
use crate::join::quote_ident;
use may_postgres::types::{ToSql, Type};
use may_postgres::Client;
use sea_query::Value;
use serde_json::Value as JsonValue;

const WRAPPER_ALIAS: &str = "tether_rows";

pub struct MayPostgresExecutor {
    client: Client,
}

impl MayPostgresExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect and apply the configured statement timeout
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let client = may_postgres::connect(&config.url)?;
        if config.statement_timeout_seconds > 0 {
            let timeout = format!("SET statement_timeout = {}", config.statement_timeout_seconds * 1000);
            client.execute(timeout.as_str(), &[])?;
        }
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn into_client(self) -> Client {
        self.client
    }
}

impl QueryExecutor for MayPostgresExecutor {
    fn query(&self, sql: &str, params: &[Value], projection: &Projection) -> Result<Rows> {
        let statement = wrap_records(sql, projection);
        let rows = with_converted_params(params, |params| Ok(self.client.query(statement.as_str(), params)?))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut converted = Row::new();
            for (idx, column) in row.columns().iter().enumerate() {
                let name = column.name();
                let record = projection.get(name).and_then(|f| f.field_type.record_type());
                let value = match record {
                    Some(record) => {
                        let json: Option<JsonValue> = row.try_get(idx)?;
                        record_from_json(json.unwrap_or(JsonValue::Null), record)?
                    }
                    None => RowValue::Scalar(scalar_from_row(row, idx, column.type_())?),
                };
                converted.insert(name, value);
            }
            out.push(converted);
        }
        Ok(Rows::new(out))
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        with_converted_params(params, |params| Ok(self.client.execute(sql, params)?))
    }
}

/// `SELECT ... FROM (<sql>) AS tether_rows` turning record fields into jsonb
fn wrap_records(sql: &str, projection: &Projection) -> String {
    if !projection.fields().iter().any(|f| f.field_type.record_type().is_some()) {
        return sql.to_string();
    }
    let columns: Vec<String> = projection
        .fields()
        .iter()
        .map(|field| {
            let column = format!("{WRAPPER_ALIAS}.{}", quote_ident(&field.name));
            if field.field_type.record_type().is_some() {
                format!("to_jsonb({column}) AS {}", quote_ident(&field.name))
            } else {
                column
            }
        })
        .collect();
    format!("SELECT {} FROM ({sql}) AS {WRAPPER_ALIAS}", columns.join(", "))
}

fn scalar_from_row(row: &may_postgres::Row, idx: usize, ty: &Type) -> Result<Value> {
    let value = if *ty == Type::BOOL {
        Value::from(row.try_get::<_, Option<bool>>(idx)?)
    } else if *ty == Type::INT2 {
        Value::from(row.try_get::<_, Option<i16>>(idx)?)
    } else if *ty == Type::INT4 {
        Value::from(row.try_get::<_, Option<i32>>(idx)?)
    } else if *ty == Type::INT8 {
        Value::from(row.try_get::<_, Option<i64>>(idx)?)
    } else if *ty == Type::FLOAT4 {
        Value::from(row.try_get::<_, Option<f32>>(idx)?)
    } else if *ty == Type::FLOAT8 {
        Value::from(row.try_get::<_, Option<f64>>(idx)?)
    } else if *ty == Type::UUID {
        Value::from(row.try_get::<_, Option<uuid::Uuid>>(idx)?)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        Value::from(row.try_get::<_, Option<JsonValue>>(idx)?)
    } else if *ty == Type::TIMESTAMPTZ {
        Value::from(row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?)
    } else if *ty == Type::TIMESTAMP {
        Value::from(row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)?)
    } else if *ty == Type::DATE {
        Value::from(row.try_get::<_, Option<chrono::NaiveDate>>(idx)?)
    } else {
        Value::from(row.try_get::<_, Option<String>>(idx)?)
    };
    Ok(value)
}

/// Decode a `to_jsonb` record (or array of records) using declared field types
pub(crate) fn record_from_json(json: JsonValue, record: &RecordType) -> Result<RowValue> {
    match json {
        JsonValue::Null => Ok(RowValue::Null),
        JsonValue::Array(items) => {
            let mut rows = Vec::with_capacity(items.len());
            for item in items {
                if let RowValue::Record(row) = record_from_json(item, record)? {
                    rows.push(row);
                }
            }
            Ok(RowValue::Records(rows))
        }
        JsonValue::Object(mut object) => {
            let mut row = Row::new();
            for (name, sql_type) in &record.fields {
                let value = object.remove(name).unwrap_or(JsonValue::Null);
                row.insert(name.clone(), json_to_value(value, sql_type)?);
            }
            Ok(RowValue::Record(row))
        }
        other => Err(Error::Conversion(format!("{} record decoded from {other}", record.class))),
    }
}

fn json_to_value(json: JsonValue, sql_type: &str) -> Result<Value> {
    if json.is_null() {
        return Ok(null_for(Some(sql_type)));
    }
    let mismatch = |json: &JsonValue| Error::Conversion(format!("cannot read {json} as {sql_type}"));
    let value = match sql_type.to_ascii_lowercase().as_str() {
        "int2" | "smallint" => {
            let n = json.as_i64().ok_or_else(|| mismatch(&json))?;
            Value::from(i16::try_from(n).map_err(|_| mismatch(&json))?)
        }
        "int4" | "integer" | "int" | "serial" => {
            let n = json.as_i64().ok_or_else(|| mismatch(&json))?;
            Value::from(i32::try_from(n).map_err(|_| mismatch(&json))?)
        }
        "int8" | "bigint" | "bigserial" => Value::from(json.as_i64().ok_or_else(|| mismatch(&json))?),
        "float4" | "real" => Value::from(json.as_f64().ok_or_else(|| mismatch(&json))? as f32),
        "float8" | "double precision" | "numeric" => Value::from(json.as_f64().ok_or_else(|| mismatch(&json))?),
        "bool" | "boolean" => Value::from(json.as_bool().ok_or_else(|| mismatch(&json))?),
        "uuid" => {
            let text = json.as_str().ok_or_else(|| mismatch(&json))?;
            Value::from(uuid::Uuid::parse_str(text).map_err(|e| Error::Conversion(e.to_string()))?)
        }
        "json" | "jsonb" => Value::from(json),
        _ => match json {
            JsonValue::String(text) => Value::from(text),
            other => Value::from(other.to_string()),
        },
    };
    Ok(value)
}

/// Convert to `ToSql` parameters, then run `f` with borrowed references
///
/// The converted values are owned by this frame, so the references handed
/// to `f` stay valid for the duration of the call.
fn with_converted_params<F, R>(values: &[Value], f: F) -> Result<R>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R>,
{
    // First pass: own every converted value
    let mut owned: Vec<Box<dyn ToSql>> = Vec::with_capacity(values.len());
    for value in values {
        let param: Box<dyn ToSql> = match value {
            Value::Bool(v) => Box::new(*v),
            Value::TinyInt(v) => Box::new(v.map(i16::from)),
            Value::SmallInt(v) => Box::new(*v),
            Value::Int(v) => Box::new(*v),
            Value::BigInt(v) => Box::new(*v),
            Value::TinyUnsigned(v) => Box::new(v.map(i16::from)),
            Value::SmallUnsigned(v) => Box::new(v.map(i32::from)),
            Value::Unsigned(v) => Box::new(v.map(i64::from)),
            Value::BigUnsigned(Some(u)) => {
                let n = i64::try_from(*u).map_err(|_| {
                    Error::Conversion(format!("BigUnsigned value {u} exceeds i64::MAX"))
                })?;
                Box::new(Some(n))
            }
            Value::BigUnsigned(None) => Box::new(None::<i64>),
            Value::Float(v) => Box::new(*v),
            Value::Double(v) => Box::new(*v),
            Value::String(v) => Box::new(v.as_ref().map(|s| s.to_string())),
            Value::Char(v) => Box::new(v.map(|c| c.to_string())),
            Value::Bytes(v) => Box::new(v.as_ref().map(|b| b.to_vec())),
            Value::Uuid(v) => Box::new(v.as_ref().map(|u| uuid::Uuid::clone(u))),
            Value::Json(v) => Box::new(v.as_ref().map(|j| JsonValue::clone(j))),
            other => {
                return Err(Error::Conversion(format!("Unsupported value type in query: {other:?}")));
            }
        };
        owned.push(param);
    }

    // Second pass: borrow them
    let params: Vec<&dyn ToSql> = owned.iter().map(|p| p.as_ref()).collect();
    f(&params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{FieldType, ProjectedField};

    fn dog_record() -> RecordType {
        RecordType {
            class: "DummyDog".to_string(),
            fields: vec![
                ("name".to_string(), "text".to_string()),
                ("dummy_person_name".to_string(), "text".to_string()),
                ("age".to_string(), "int4".to_string()),
            ],
        }
    }

    #[test]
    fn test_plain_projection_is_not_wrapped() {
        let projection = Projection::new(vec![ProjectedField::new(
            "name",
            "t0.\"name\"",
            FieldType::Sql("text".into()),
        )]);
        assert_eq!(wrap_records("SELECT 1", &projection), "SELECT 1");
    }

    #[test]
    fn test_record_fields_are_selected_as_jsonb() {
        let projection = Projection::new(vec![
            ProjectedField::new("name", "t0.\"name\"", FieldType::Sql("text".into())),
            ProjectedField::new("dogs", "array_agg(t2)", FieldType::EntityArray(dog_record())),
        ]);
        assert_eq!(
            wrap_records("SELECT x", &projection),
            "SELECT tether_rows.\"name\", to_jsonb(tether_rows.\"dogs\") AS \"dogs\" FROM (SELECT x) AS tether_rows"
        );
    }

    #[test]
    fn test_record_array_decodes_with_declared_types() {
        let json = serde_json::json!([{"name": "rex", "dummy_person_name": null, "age": 3}]);
        let RowValue::Records(rows) = record_from_json(json, &dog_record()).unwrap() else {
            panic!("expected records");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("age"), Some(&RowValue::Scalar(Value::Int(Some(3)))));
        assert_eq!(rows[0].get("dummy_person_name"), Some(&RowValue::Scalar(Value::String(None))));
    }

    #[test]
    fn test_type_mismatch_is_a_conversion_error() {
        let json = serde_json::json!({"name": "rex", "age": "three"});
        assert!(matches!(record_from_json(json, &dog_record()), Err(Error::Conversion(_))));
    }
}

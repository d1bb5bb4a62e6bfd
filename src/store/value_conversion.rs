//! Conversion of SeaQuery values into `may_postgres` parameters.
//!
//! SeaQuery builds `(sql, Values)`; the driver wants `&[&dyn ToSql]`. Values
//! are first converted into owned boxes, then borrowed for the duration of the
//! closure that runs the statement.

use crate::executor::DbError;
use may_postgres::types::ToSql;
use sea_query::{Value, Values};

/// Convert `values` and run `f` with the borrowed parameters.
pub fn with_converted_params<F, R>(values: &Values, f: F) -> Result<R, DbError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, DbError>,
{
    let owned = convert_values(values)?;
    let params: Vec<&dyn ToSql> = owned.iter().map(|p| &**p).collect();
    f(&params)
}

fn convert_values(values: &Values) -> Result<Vec<Box<dyn ToSql>>, DbError> {
    values.iter().map(convert_value).collect()
}

// `Clone::clone` through deref coercion accepts both boxed and unboxed payloads.
fn convert_value(value: &Value) -> Result<Box<dyn ToSql>, DbError> {
    let param: Box<dyn ToSql> = match value {
        Value::Bool(v) => Box::new(*v),
        Value::SmallInt(v) => Box::new(*v),
        Value::Int(v) => Box::new(*v),
        Value::BigInt(v) => Box::new(*v),
        Value::Double(v) => Box::new(*v),
        Value::String(v) => Box::new(v.as_ref().map(|s| String::clone(s))),
        Value::Uuid(v) => Box::new(v.as_ref().map(|u| uuid::Uuid::clone(u))),
        Value::ChronoDateTimeUtc(v) => {
            Box::new(v.as_ref().map(|d| chrono::DateTime::<chrono::Utc>::clone(d)))
        }
        Value::Decimal(v) => Box::new(v.as_ref().map(|d| rust_decimal::Decimal::clone(d))),
        other => {
            return Err(DbError::Query(format!(
                "Unsupported value type in query: {other:?}"
            )))
        }
    };
    Ok(param)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::{Expr, ExprTrait, PostgresQueryBuilder, Query};

    #[test]
    fn test_converts_built_query_values() {
        let (sql, values) = Query::select()
            .column("id")
            .from("transactions")
            .and_where(Expr::col("kind").eq("entree"))
            .and_where(Expr::col("amount").gt(rust_decimal::Decimal::from(10)))
            .and_where(Expr::col("student_id").eq(uuid::Uuid::nil()))
            .to_owned()
            .build(PostgresQueryBuilder);
        assert!(sql.contains("$3"));
        let count = with_converted_params(&values, |params| Ok(params.len())).unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_unsupported_value_is_an_error() {
        let values = Values(vec![Value::Char(Some('x'))]);
        assert!(with_converted_params(&values, |_| Ok(())).is_err());
    }
}

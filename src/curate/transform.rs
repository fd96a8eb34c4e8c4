//! Raw records to typed rows.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::error::CurationError;
use super::schema::{ColumnType, TableSchema};

static NULL: Value = Value::Null;

/// A typed cell ready to bind.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// SQL `NULL`.
    Null,
    /// Integer cell.
    Integer(i64),
    /// Real cell.
    Real(f64),
    /// Text cell.
    Text(String),
}

/// One output row, cells in schema column order.
pub type Row = Vec<CellValue>;

/// Renames, casts and selects `records` into rows of `schema`.
///
/// Keys not in the schema are dropped and columns with no source key become
/// `NULL`. Merge key columns must be present.
///
/// # Errors
///
/// Returns [`CurationError::InvalidRecord`] for a record that is not an
/// object, [`CurationError::Cast`] for a value that does not fit its column
/// and [`CurationError::MissingMergeKey`] for a null merge key.
pub fn transform(schema: &TableSchema, records: &[Value]) -> Result<Vec<Row>, CurationError> {
    let renames = schema.rename_map();
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let Value::Object(fields) = record else {
                return Err(CurationError::InvalidRecord {
                    index,
                    found: record.to_string(),
                });
            };
            let renamed = rename(fields, &renames);
            select(schema, &renamed, index)
        })
        .collect()
}

fn rename<'a>(
    fields: &'a Map<String, Value>,
    renames: &HashMap<&'static str, &'static str>,
) -> HashMap<&'a str, &'a Value> {
    fields
        .iter()
        .map(|(key, value)| {
            let name = renames.get(key.as_str()).copied().unwrap_or(key.as_str());
            (name, value)
        })
        .collect()
}

fn select(
    schema: &TableSchema,
    renamed: &HashMap<&str, &Value>,
    index: usize,
) -> Result<Row, CurationError> {
    schema
        .columns()
        .iter()
        .map(|column| {
            let value = renamed.get(column.name).copied().unwrap_or(&NULL);
            let cell = cast(column.name, value, column.column_type)?;
            if column.merge_key && cell == CellValue::Null {
                return Err(CurationError::MissingMergeKey {
                    index,
                    column: column.name,
                });
            }
            Ok(cell)
        })
        .collect()
}

/// Casts one JSON value to `column_type`.
///
/// Numbers and numeric strings cast to integers (when integral) and reals.
/// Any scalar casts to text. `null` stays `NULL`.
///
/// # Errors
///
/// Returns [`CurationError::Cast`] when the value does not fit.
pub fn cast(
    column: &'static str,
    value: &Value,
    column_type: ColumnType,
) -> Result<CellValue, CurationError> {
    let cell = match (column_type, value) {
        (_, Value::Null) => Some(CellValue::Null),
        (ColumnType::Integer, Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(integral))
            .map(CellValue::Integer),
        (ColumnType::Integer, Value::String(text)) => parse_integer(text).map(CellValue::Integer),
        (ColumnType::Real, Value::Number(number)) => number.as_f64().map(CellValue::Real),
        (ColumnType::Real, Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|parsed| parsed.is_finite())
            .map(CellValue::Real),
        (ColumnType::Text, Value::String(text)) => Some(CellValue::Text(text.clone())),
        (ColumnType::Text, Value::Number(number)) => Some(CellValue::Text(number.to_string())),
        (ColumnType::Text, Value::Bool(flag)) => Some(CellValue::Text(flag.to_string())),
        _ => None,
    };
    cell.ok_or_else(|| CurationError::cast(column, value, column_type))
}

fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().and_then(integral))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integral(value: f64) -> Option<i64> {
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;
    (value.is_finite() && value.fract() == 0.0 && in_range).then_some(value as i64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::curate::schema::Column;

    fn record() -> Value {
        json!({
            "year": 2020,
            "countryCode": "4",
            "countryName": "Afghanistan",
            "shortName": "Afghanistan",
            "isoa2": "AF",
            "record": "BiocapPerCap",
            "cropLand": 0.21,
            "grazingLand": "0.17",
            "forestLand": 0.01,
            "fishingGround": null,
            "builtupLand": 0.02,
            "carbon": 0,
            "value": 0.41,
            "score": "3A",
            "extra": "dropped"
        })
    }

    #[test]
    fn test_transform_footprint_record() {
        let rows = transform(&TableSchema::carbon_footprint(), &[record()]).unwrap();
        assert_eq!(
            rows,
            vec![vec![
                CellValue::Integer(2020),
                CellValue::Integer(4),
                CellValue::Text("Afghanistan".into()),
                CellValue::Text("Afghanistan".into()),
                CellValue::Text("AF".into()),
                CellValue::Text("BiocapPerCap".into()),
                CellValue::Real(0.21),
                CellValue::Real(0.17),
                CellValue::Real(0.01),
                CellValue::Null,
                CellValue::Real(0.02),
                CellValue::Real(0.0),
                CellValue::Real(0.41),
                CellValue::Text("3A".into()),
            ]]
        );
    }

    #[test]
    fn test_absent_columns_become_null() {
        let schema = TableSchema::new(
            "t",
            vec![
                Column::new("id", ColumnType::Integer),
                Column::new("label", ColumnType::Text).renamed_from("Label"),
            ],
        );
        let rows = transform(&schema, &[json!({"id": "7"})]).unwrap();
        assert_eq!(rows, vec![vec![CellValue::Integer(7), CellValue::Null]]);
    }

    #[test]
    fn test_non_object_record_is_rejected() {
        let result = transform(&TableSchema::carbon_footprint(), &[json!([1, 2])]);
        assert!(matches!(result, Err(CurationError::InvalidRecord { index: 0, .. })));
    }

    #[test]
    fn test_null_merge_key_is_rejected() {
        let mut value = record();
        value["record"] = Value::Null;
        let result = transform(&TableSchema::carbon_footprint(), &[record(), value]);
        assert!(matches!(
            result,
            Err(CurationError::MissingMergeKey { index: 1, column: "record" })
        ));
    }

    #[test]
    fn test_uncastable_value_names_column() {
        let mut value = record();
        value["value"] = json!("not a number");
        let error = transform(&TableSchema::carbon_footprint(), &[value]).unwrap_err();
        assert!(matches!(error, CurationError::Cast { column: "value", .. }));
    }

    #[test]
    fn test_integer_casts() {
        assert_eq!(cast("c", &json!(3), ColumnType::Integer).unwrap(), CellValue::Integer(3));
        assert_eq!(cast("c", &json!(3.0), ColumnType::Integer).unwrap(), CellValue::Integer(3));
        assert_eq!(cast("c", &json!(" 12 "), ColumnType::Integer).unwrap(), CellValue::Integer(12));
        assert!(cast("c", &json!(3.5), ColumnType::Integer).is_err());
        assert!(cast("c", &json!("AFG"), ColumnType::Integer).is_err());
        assert!(cast("c", &json!(true), ColumnType::Integer).is_err());
    }

    #[test]
    fn test_text_casts_scalars_only() {
        assert_eq!(cast("c", &json!(229), ColumnType::Text).unwrap(), CellValue::Text("229".into()));
        assert_eq!(cast("c", &json!(false), ColumnType::Text).unwrap(), CellValue::Text("false".into()));
        assert!(cast("c", &json!({"a": 1}), ColumnType::Text).is_err());
    }

    #[test]
    fn test_real_rejects_non_finite_strings() {
        assert!(cast("c", &json!("NaN"), ColumnType::Real).is_err());
        assert_eq!(cast("c", &json!("1e3"), ColumnType::Real).unwrap(), CellValue::Real(1000.0));
    }
}

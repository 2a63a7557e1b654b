//! CSV decode of the raw feed and CSV encode of the output tables.
//!
//! Decoding is lenient the way the feed demands: unknown columns are ignored,
//! missing columns yield `None`, and unparseable numeric cells coerce to
//! `None` instead of failing the batch.

use lamel_types::flow::TableKind;
use lamel_types::sales::{Customer, Product, RawSalesRecord, SaleFact, Store};
use serde_json::Value;
use thiserror::Error;

/// Errors from CSV encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("csv error: {0}")]
    Csv(String),

    /// The JSON payload did not have the shape the table requires.
    #[error("table shape error: {0}")]
    Shape(String),
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Column names the feed is expected to carry. Order in the file is free;
/// the header row determines the mapping.
const RAW_COLUMNS: [&str; 9] = [
    "transaction_id",
    "day_of_week",
    "customer_name",
    "product_name",
    "product_category",
    "price",
    "quantity_sold",
    "total_sale",
    "store_location",
];

/// Parse a raw CSV batch from the feed into records.
///
/// Cells are trimmed; empty cells become `None`; numeric cells that fail to
/// parse also become `None`.
pub fn parse_raw_csv(data: &[u8]) -> Result<Vec<RawSalesRecord>, CodecError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let headers = reader
        .headers()
        .map_err(|e| CodecError::Csv(e.to_string()))?
        .clone();

    // Map each known column to its position in this file, if present.
    let positions: Vec<Option<usize>> = RAW_COLUMNS
        .iter()
        .map(|name| headers.iter().position(|h| h.trim() == *name))
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| CodecError::Csv(e.to_string()))?;
        let cell = |col: usize| -> Option<String> {
            positions[col]
                .and_then(|i| row.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        records.push(RawSalesRecord {
            transaction_id: cell(0).and_then(|s| s.parse().ok()),
            day_of_week: cell(1),
            customer_name: cell(2),
            product_name: cell(3),
            product_category: cell(4),
            price: cell(5).and_then(|s| s.parse().ok()),
            quantity_sold: cell(6).and_then(|s| s.parse().ok()),
            total_sale: cell(7).and_then(|s| s.parse().ok()),
            store_location: cell(8),
        });
    }

    Ok(records)
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

fn write_csv<T: serde::Serialize>(rows: &[T]) -> Result<Vec<u8>, CodecError> {
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(vec![]);
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| CodecError::Csv(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| CodecError::Csv(e.to_string()))
}

fn rows_from_json<T: serde::de::DeserializeOwned>(
    table: TableKind,
    value: &Value,
) -> Result<Vec<T>, CodecError> {
    serde_json::from_value(value.clone()).map_err(|e| {
        CodecError::Shape(format!(
            "step output field '{}' is not a {:?} table: {e}",
            table.output_field(),
            table
        ))
    })
}

/// Render one table (taken from a step output as JSON) to CSV bytes.
pub fn encode_table(table: TableKind, rows: &Value) -> Result<Vec<u8>, CodecError> {
    match table {
        TableKind::Customers => write_csv(&rows_from_json::<Customer>(table, rows)?),
        TableKind::Products => write_csv(&rows_from_json::<Product>(table, rows)?),
        TableKind::Stores => write_csv(&rows_from_json::<Store>(table, rows)?),
        TableKind::Sales => write_csv(&rows_from_json::<SaleFact>(table, rows)?),
        TableKind::Raw => write_csv(&rows_from_json::<RawSalesRecord>(table, rows)?),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE_CSV: &str = "\
transaction_id,day_of_week,customer_name,product_name,product_category,price,quantity_sold,total_sale,store_location
1,Monday,Debby,Apple Watch,Smartwatch,799.99,2,1599.98,Pretoria
2,,Ailsun,Samsung Phone,,not-a-number,1,,Johannesburg
,Tuesday,,, Smartphone,999.99,,,
";

    #[test]
    fn test_parse_raw_csv_basic() {
        let records = parse_raw_csv(SAMPLE_CSV.as_bytes()).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].transaction_id, Some(1));
        assert_eq!(records[0].day_of_week.as_deref(), Some("Monday"));
        assert_eq!(records[0].price, Some(799.99));
    }

    #[test]
    fn test_parse_raw_csv_coerces_bad_numbers() {
        let records = parse_raw_csv(SAMPLE_CSV.as_bytes()).unwrap();
        // "not-a-number" coerces to None rather than failing the batch
        assert_eq!(records[1].price, None);
        assert_eq!(records[1].quantity_sold, Some(1.0));
    }

    #[test]
    fn test_parse_raw_csv_empty_cells_are_none() {
        let records = parse_raw_csv(SAMPLE_CSV.as_bytes()).unwrap();
        assert_eq!(records[1].day_of_week, None);
        assert_eq!(records[2].transaction_id, None);
        assert_eq!(records[2].customer_name, None);
        // Cells are trimmed before use
        assert_eq!(records[2].product_category.as_deref(), Some("Smartphone"));
    }

    #[test]
    fn test_parse_raw_csv_shuffled_columns() {
        let csv = "\
price,product_name,transaction_id,customer_name
10.5,Widget,7,Ann
";
        let records = parse_raw_csv(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].transaction_id, Some(7));
        assert_eq!(records[0].price, Some(10.5));
        assert_eq!(records[0].product_name.as_deref(), Some("Widget"));
        // Columns absent from the file are simply missing
        assert_eq!(records[0].store_location, None);
    }

    #[test]
    fn test_encode_customers_table() {
        let rows = json!([
            {"customer_id": 1, "customer_name": "Debby"},
            {"customer_id": 2, "customer_name": "Ailsun"},
        ]);
        let bytes = encode_table(TableKind::Customers, &rows).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("customer_id,customer_name\n"));
        assert!(text.contains("1,Debby"));
        assert!(text.contains("2,Ailsun"));
    }

    #[test]
    fn test_encode_table_rejects_wrong_shape() {
        let rows = json!([{"unexpected": true}]);
        let err = encode_table(TableKind::Sales, &rows).unwrap_err();
        assert!(err.to_string().contains("table shape error"));
    }

    #[test]
    fn test_raw_roundtrip_through_json() {
        let records = parse_raw_csv(SAMPLE_CSV.as_bytes()).unwrap();
        let as_json = serde_json::to_value(&records).unwrap();
        let bytes = encode_table(TableKind::Raw, &as_json).unwrap();
        let reparsed = parse_raw_csv(&bytes).unwrap();
        assert_eq!(reparsed, records);
    }
}

//! The sales data model: raw feed rows, cleaned records, and the modelled
//! dimension/fact tables.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Raw feed rows
// ---------------------------------------------------------------------------

/// A row as it arrives from the data feed. Every field is optional: the feed
/// produces gaps and malformed values, and numeric parsing is lenient
/// (unparseable numbers become `None`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSalesRecord {
    pub transaction_id: Option<i64>,
    pub day_of_week: Option<String>,
    pub customer_name: Option<String>,
    pub product_name: Option<String>,
    pub product_category: Option<String>,
    pub price: Option<f64>,
    pub quantity_sold: Option<f64>,
    pub total_sale: Option<f64>,
    pub store_location: Option<String>,
}

impl RawSalesRecord {
    /// Number of missing (None) fields in this row.
    pub fn missing_count(&self) -> usize {
        let mut n = 0;
        if self.transaction_id.is_none() {
            n += 1;
        }
        if self.day_of_week.is_none() {
            n += 1;
        }
        if self.customer_name.is_none() {
            n += 1;
        }
        if self.product_name.is_none() {
            n += 1;
        }
        if self.product_category.is_none() {
            n += 1;
        }
        if self.price.is_none() {
            n += 1;
        }
        if self.quantity_sold.is_none() {
            n += 1;
        }
        if self.total_sale.is_none() {
            n += 1;
        }
        if self.store_location.is_none() {
            n += 1;
        }
        n
    }
}

// ---------------------------------------------------------------------------
// Cleaned records
// ---------------------------------------------------------------------------

/// A fully cleaned sales record. Produced by the transform pipeline; every
/// field is guaranteed present and typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    pub transaction_id: i64,
    pub day_of_week: String,
    pub customer_name: String,
    pub product_name: String,
    pub product_category: String,
    pub price: f64,
    pub quantity_sold: u32,
    pub total_sale: f64,
    pub store_location: String,
}

// ---------------------------------------------------------------------------
// Dimension and fact tables
// ---------------------------------------------------------------------------

/// Customer dimension row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: u32,
    pub customer_name: String,
}

/// Product dimension row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: u32,
    pub product_name: String,
    pub product_category: String,
}

/// Store dimension row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub store_id: u32,
    pub store_location: String,
}

/// Sales fact row: the cleaned record with names replaced by dimension IDs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleFact {
    pub transaction_id: i64,
    pub day_of_week: String,
    pub price: f64,
    pub quantity_sold: u32,
    pub total_sale: f64,
    pub customer_id: u32,
    pub product_id: u32,
    pub store_id: u32,
}

/// The full modelled output: three dimensions plus the fact table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesTables {
    pub customers: Vec<Customer>,
    pub products: Vec<Product>,
    pub stores: Vec<Store>,
    pub sales: Vec<SaleFact>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

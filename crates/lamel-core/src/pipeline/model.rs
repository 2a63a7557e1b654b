//! Dimensional modelling: split cleaned records into dimension and fact
//! tables.
//!
//! IDs are assigned 1-based in order of first appearance, so the same batch
//! always yields the same IDs.

use std::collections::HashMap;

use lamel_types::sales::{Customer, Product, SaleFact, SalesRecord, SalesTables, Store};

/// Split cleaned records into customers/products/stores dimensions plus the
/// sales fact table.
pub fn model_sales_data(records: &[SalesRecord]) -> SalesTables {
    let mut customer_ids: HashMap<&str, u32> = HashMap::new();
    let mut product_ids: HashMap<&str, u32> = HashMap::new();
    let mut store_ids: HashMap<&str, u32> = HashMap::new();

    let mut tables = SalesTables::default();

    for record in records {
        let next_customer = customer_ids.len() as u32 + 1;
        let customer_id = *customer_ids
            .entry(record.customer_name.as_str())
            .or_insert_with(|| {
                tables.customers.push(Customer {
                    customer_id: next_customer,
                    customer_name: record.customer_name.clone(),
                });
                next_customer
            });

        let next_product = product_ids.len() as u32 + 1;
        let product_id = *product_ids
            .entry(record.product_name.as_str())
            .or_insert_with(|| {
                tables.products.push(Product {
                    product_id: next_product,
                    product_name: record.product_name.clone(),
                    product_category: record.product_category.clone(),
                });
                next_product
            });

        let next_store = store_ids.len() as u32 + 1;
        let store_id = *store_ids
            .entry(record.store_location.as_str())
            .or_insert_with(|| {
                tables.stores.push(Store {
                    store_id: next_store,
                    store_location: record.store_location.clone(),
                });
                next_store
            });

        tables.sales.push(SaleFact {
            transaction_id: record.transaction_id,
            day_of_week: record.day_of_week.clone(),
            price: record.price,
            quantity_sold: record.quantity_sold,
            total_sale: record.total_sale,
            customer_id,
            product_id,
            store_id,
        });
    }

    tables
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

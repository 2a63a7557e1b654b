//! The sales-data cleaning pipeline.
//!
//! Raw feed rows arrive with gaps: missing identifiers, absent categories and
//! prices, unparsed numerics. Cleaning proceeds in a fixed order:
//!
//! 1. Standardize strings (trim, empty -> missing).
//! 2. Drop rows missing critical identifiers (transaction, customer, product).
//! 3. Fill missing day-of-week with the most frequent value.
//! 4. Infer missing product categories from sibling rows of the same product;
//!    drop the row when no sibling resolves it.
//! 5. Infer missing prices the same way; drop when unresolvable.
//! 6. Fill missing quantities with the rounded mean.
//! 7. Compute missing totals as price x quantity.
//! 8. Fill missing store locations with the most frequent value.
//!
//! The result is a batch of fully-populated `SalesRecord`s plus a
//! `TransformReport` describing what happened.

use std::collections::HashMap;
use std::collections::HashSet;
use std::hash::Hash;

use lamel_types::sales::{RawSalesRecord, SalesRecord};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TransformReport
// ---------------------------------------------------------------------------

/// Counters describing a cleaning pass. Serialized into the step output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub dropped_missing_identifiers: usize,
    pub dropped_unresolved_category: usize,
    pub dropped_unresolved_price: usize,
    pub dropped_incomplete: usize,
    pub filled_day_of_week: usize,
    pub filled_category: usize,
    pub filled_price: usize,
    pub filled_quantity: usize,
    pub computed_total_sale: usize,
    pub filled_store_location: usize,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Most frequent value in an iterator; ties break toward the value seen
/// first, so the result is deterministic for a given input order.
fn mode<T: Eq + Hash + Clone>(values: impl Iterator<Item = T>) -> Option<T> {
    let mut counts: HashMap<T, (usize, usize)> = HashMap::new();
    for (idx, value) in values.enumerate() {
        let entry = counts.entry(value).or_insert((idx, 0));
        entry.1 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (first_a, count_a)), (_, (first_b, count_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(value, _)| value)
}

/// Mode over f64 values, compared by bit pattern.
fn mode_f64(values: impl Iterator<Item = f64>) -> Option<f64> {
    mode(values.map(f64::to_bits)).map(f64::from_bits)
}

/// Count of rows identical to an earlier row.
pub fn duplicate_rows(records: &[RawSalesRecord]) -> usize {
    let mut seen = HashSet::new();
    let mut dupes = 0;
    for record in records {
        let key = serde_json::to_string(record).unwrap_or_default();
        if !seen.insert(key) {
            dupes += 1;
        }
    }
    dupes
}

/// Total number of missing cells across the batch.
pub fn missing_cells(records: &[RawSalesRecord]) -> usize {
    records.iter().map(RawSalesRecord::missing_count).sum()
}

// ---------------------------------------------------------------------------
// Cleaning stages
// ---------------------------------------------------------------------------

/// Trim every string field; empty strings become missing.
pub fn standardize(records: &mut [RawSalesRecord]) {
    let tidy = |field: &mut Option<String>| {
        if let Some(s) = field {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                *field = None;
            } else if trimmed.len() != s.len() {
                *field = Some(trimmed.to_string());
            }
        }
    };

    for record in records {
        tidy(&mut record.day_of_week);
        tidy(&mut record.customer_name);
        tidy(&mut record.product_name);
        tidy(&mut record.product_category);
        tidy(&mut record.store_location);
    }
}

/// Drop rows missing any critical identifier. Returns the kept rows and the
/// number dropped.
pub fn drop_invalid_rows(records: Vec<RawSalesRecord>) -> (Vec<RawSalesRecord>, usize) {
    let before = records.len();
    let kept: Vec<_> = records
        .into_iter()
        .filter(|r| {
            r.transaction_id.is_some() && r.customer_name.is_some() && r.product_name.is_some()
        })
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Fill missing `day_of_week` with the most frequent value. Returns how many
/// rows were filled.
pub fn fill_day_of_week(records: &mut [RawSalesRecord]) -> usize {
    let Some(mode_day) = mode(records.iter().filter_map(|r| r.day_of_week.clone())) else {
        return 0;
    };
    let mut filled = 0;
    for record in records.iter_mut() {
        if record.day_of_week.is_none() {
            record.day_of_week = Some(mode_day.clone());
            filled += 1;
        }
    }
    filled
}

/// Fill missing product categories from sibling rows with the same product
/// name; rows with no resolvable category are dropped.
///
/// Returns (kept rows, filled count, dropped count).
pub fn fill_product_category(
    records: Vec<RawSalesRecord>,
) -> (Vec<RawSalesRecord>, usize, usize) {
    // product name -> most frequent category among rows that have one
    let mut by_product: HashMap<String, Vec<String>> = HashMap::new();
    for record in &records {
        if let (Some(name), Some(category)) = (&record.product_name, &record.product_category) {
            by_product
                .entry(name.clone())
                .or_default()
                .push(category.clone());
        }
    }

    let mut filled = 0;
    let mut dropped = 0;
    let mut kept = Vec::with_capacity(records.len());
    for mut record in records {
        if record.product_category.is_none() {
            let resolved = record
                .product_name
                .as_ref()
                .and_then(|name| by_product.get(name))
                .and_then(|categories| mode(categories.iter().cloned()));
            match resolved {
                Some(category) => {
                    record.product_category = Some(category);
                    filled += 1;
                }
                None => {
                    dropped += 1;
                    continue;
                }
            }
        }
        kept.push(record);
    }
    (kept, filled, dropped)
}

/// Fill missing prices from sibling rows with the same product name; rows
/// with no resolvable price are dropped.
///
/// Returns (kept rows, filled count, dropped count).
pub fn fill_price(records: Vec<RawSalesRecord>) -> (Vec<RawSalesRecord>, usize, usize) {
    let mut by_product: HashMap<String, Vec<f64>> = HashMap::new();
    for record in &records {
        if let (Some(name), Some(price)) = (&record.product_name, record.price) {
            by_product.entry(name.clone()).or_default().push(price);
        }
    }

    let mut filled = 0;
    let mut dropped = 0;
    let mut kept = Vec::with_capacity(records.len());
    for mut record in records {
        if record.price.is_none() {
            let resolved = record
                .product_name
                .as_ref()
                .and_then(|name| by_product.get(name))
                .and_then(|prices| mode_f64(prices.iter().copied()));
            match resolved {
                Some(price) => {
                    record.price = Some(price);
                    filled += 1;
                }
                None => {
                    dropped += 1;
                    continue;
                }
            }
        }
        kept.push(record);
    }
    (kept, filled, dropped)
}

/// Fill missing quantities with the rounded mean of present quantities.
pub fn fill_quantity(records: &mut [RawSalesRecord]) -> usize {
    let present: Vec<f64> = records.iter().filter_map(|r| r.quantity_sold).collect();
    if present.is_empty() {
        return 0;
    }
    let mean = (present.iter().sum::<f64>() / present.len() as f64).round();

    let mut filled = 0;
    for record in records.iter_mut() {
        if record.quantity_sold.is_none() {
            record.quantity_sold = Some(mean);
            filled += 1;
        }
    }
    filled
}

/// Compute missing totals as price x quantity where both are present.
pub fn compute_total_sale(records: &mut [RawSalesRecord]) -> usize {
    let mut computed = 0;
    for record in records.iter_mut() {
        if record.total_sale.is_none() {
            if let (Some(price), Some(quantity)) = (record.price, record.quantity_sold) {
                record.total_sale = Some(price * quantity);
                computed += 1;
            }
        }
    }
    computed
}

/// Fill missing store locations with the most frequent value.
pub fn fill_store_location(records: &mut [RawSalesRecord]) -> usize {
    let Some(mode_location) = mode(records.iter().filter_map(|r| r.store_location.clone())) else {
        return 0;
    };
    let mut filled = 0;
    for record in records.iter_mut() {
        if record.store_location.is_none() {
            record.store_location = Some(mode_location.clone());
            filled += 1;
        }
    }
    filled
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Run the full cleaning pipeline over a raw batch.
pub fn clean_sales_data(raw: Vec<RawSalesRecord>) -> (Vec<SalesRecord>, TransformReport) {
    let mut report = TransformReport {
        rows_in: raw.len(),
        ..Default::default()
    };

    tracing::debug!(
        rows = raw.len(),
        missing_cells = missing_cells(&raw),
        duplicates = duplicate_rows(&raw),
        "cleaning raw sales batch"
    );

    let mut records = raw;
    standardize(&mut records);

    let (mut records, dropped) = drop_invalid_rows(records);
    report.dropped_missing_identifiers = dropped;

    report.filled_day_of_week = fill_day_of_week(&mut records);

    let (records, filled, dropped) = fill_product_category(records);
    report.filled_category = filled;
    report.dropped_unresolved_category = dropped;

    let (mut records, filled, dropped) = fill_price(records);
    report.filled_price = filled;
    report.dropped_unresolved_price = dropped;

    report.filled_quantity = fill_quantity(&mut records);
    report.computed_total_sale = compute_total_sale(&mut records);
    report.filled_store_location = fill_store_location(&mut records);

    // Finalize: every remaining row should be complete; anything still
    // missing a field is dropped rather than fabricated.
    let mut cleaned = Vec::with_capacity(records.len());
    for record in records {
        match finalize(record) {
            Some(clean) => cleaned.push(clean),
            None => report.dropped_incomplete += 1,
        }
    }

    report.rows_out = cleaned.len();
    tracing::debug!(
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        "cleaning completed"
    );
    (cleaned, report)
}

fn finalize(record: RawSalesRecord) -> Option<SalesRecord> {
    Some(SalesRecord {
        transaction_id: record.transaction_id?,
        day_of_week: record.day_of_week?,
        customer_name: record.customer_name?,
        product_name: record.product_name?,
        product_category: record.product_category?,
        price: record.price?,
        quantity_sold: record.quantity_sold?.round() as u32,
        total_sale: record.total_sale?,
        store_location: record.store_location?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        transaction_id: Option<i64>,
        day: Option<&str>,
        customer: Option<&str>,
        product: Option<&str>,
        category: Option<&str>,
        price: Option<f64>,
        quantity: Option<f64>,
        total: Option<f64>,
        store: Option<&str>,
    ) -> RawSalesRecord {
        RawSalesRecord {
            transaction_id,
            day_of_week: day.map(String::from),
            customer_name: customer.map(String::from),
            product_name: product.map(String::from),
            product_category: category.map(String::from),
            price,
            quantity_sold: quantity,
            total_sale: total,
            store_location: store.map(String::from),
        }
    }

    /// The canonical messy batch: five rows exercising every cleaning rule.
    fn sample_data() -> Vec<RawSalesRecord> {
        vec![
            record(
                Some(1),
                Some("Monday"),
                Some("Debby"),
                Some("Apple Watch"),
                Some("Smartwatch"),
                Some(799.99),
                Some(2.0),
                Some(1599.98),
                Some("Pretoria"),
            ),
            record(
                Some(2),
                None,
                Some("Ailsun"),
                Some("Samsung Phone"),
                None,
                None,
                Some(1.0),
                None,
                Some("Johannesburg"),
            ),
            record(
                Some(3),
                Some("Tuesday"),
                None,
                None,
                Some("Smartphone"),
                Some(999.99),
                None,
                None,
                None,
            ),
            record(
                None,
                Some("Monday"),
                Some("Debby"),
                Some("Apple Watch"),
                Some("Smartwatch"),
                Some(799.99),
                Some(2.0),
                Some(1599.98),
                Some("Pretoria"),
            ),
            record(
                Some(5),
                None,
                Some("Charlie"),
                Some("iPad"),
                None,
                None,
                None,
                None,
                None,
            ),
        ]
    }

    // -----------------------------------------------------------------------
    // Individual stages
    // -----------------------------------------------------------------------

    #[test]
    fn test_drop_invalid_rows() {
        let (kept, dropped) = drop_invalid_rows(sample_data());
        // Row 3 (missing customer and product) and row 4 (missing
        // transaction id) are dropped.
        assert_eq!(dropped, 2);
        assert!(kept.iter().all(|r| r.transaction_id.is_some()
            && r.customer_name.is_some()
            && r.product_name.is_some()));
    }

    #[test]
    fn test_fill_day_of_week_uses_mode() {
        let mut records = sample_data();
        let filled = fill_day_of_week(&mut records);
        assert_eq!(filled, 2);
        // "Monday" appears twice, "Tuesday" once
        assert!(records.iter().all(|r| r.day_of_week.is_some()));
        assert_eq!(records[1].day_of_week.as_deref(), Some("Monday"));
    }

    #[test]
    fn test_fill_product_category_infers_and_drops() {
        let records = vec![
            record(
                Some(1),
                None,
                Some("A"),
                Some("Apple Watch"),
                Some("Smartwatch"),
                None,
                None,
                None,
                None,
            ),
            record(
                Some(2),
                None,
                Some("B"),
                Some("Apple Watch"),
                None,
                None,
                None,
                None,
                None,
            ),
            record(
                Some(3),
                None,
                Some("C"),
                Some("iPad"),
                None,
                None,
                None,
                None,
                None,
            ),
        ];
        let (kept, filled, dropped) = fill_product_category(records);
        // The second Apple Watch row inherits "Smartwatch"; the iPad row has
        // no sibling with a category and is dropped.
        assert_eq!(filled, 1);
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|r| r.product_category.is_some()));
        assert!(!kept.iter().any(|r| r.product_name.as_deref() == Some("iPad")));
    }

    #[test]
    fn test_fill_price_infers_and_drops() {
        let records = vec![
            record(
                Some(1),
                None,
                Some("A"),
                Some("Apple Watch"),
                None,
                Some(799.99),
                None,
                None,
                None,
            ),
            record(
                Some(2),
                None,
                Some("B"),
                Some("Apple Watch"),
                None,
                None,
                None,
                None,
                None,
            ),
            record(
                Some(3),
                None,
                Some("C"),
                Some("Samsung Phone"),
                None,
                None,
                None,
                None,
                None,
            ),
        ];
        let (kept, filled, dropped) = fill_price(records);
        assert_eq!(filled, 1);
        assert_eq!(dropped, 1);
        assert!(
            kept.iter()
                .filter(|r| r.product_name.as_deref() == Some("Apple Watch"))
                .all(|r| r.price == Some(799.99))
        );
        assert!(
            !kept
                .iter()
                .any(|r| r.product_name.as_deref() == Some("Samsung Phone"))
        );
    }

    #[test]
    fn test_fill_quantity_uses_rounded_mean() {
        let mut records = sample_data();
        let filled = fill_quantity(&mut records);
        // Present quantities: 2, 1, 2 -> mean 1.67 -> rounds to 2
        assert_eq!(filled, 2);
        assert!(records.iter().all(|r| r.quantity_sold.is_some()));
        assert_eq!(records[2].quantity_sold, Some(2.0));
    }

    #[test]
    fn test_compute_total_sale() {
        let mut records = vec![record(
            Some(1),
            None,
            Some("A"),
            Some("Widget"),
            None,
            Some(10.0),
            Some(3.0),
            None,
            None,
        )];
        let computed = compute_total_sale(&mut records);
        assert_eq!(computed, 1);
        assert_eq!(records[0].total_sale, Some(30.0));
    }

    #[test]
    fn test_compute_total_sale_skips_unpriced() {
        let mut records = vec![record(
            Some(1),
            None,
            Some("A"),
            Some("Widget"),
            None,
            None,
            Some(3.0),
            None,
            None,
        )];
        let computed = compute_total_sale(&mut records);
        assert_eq!(computed, 0);
        assert_eq!(records[0].total_sale, None);
    }

    #[test]
    fn test_fill_store_location_uses_mode() {
        let mut records = sample_data();
        let filled = fill_store_location(&mut records);
        assert_eq!(filled, 2);
        // "Pretoria" appears twice, "Johannesburg" once
        assert_eq!(records[2].store_location.as_deref(), Some("Pretoria"));
    }

    #[test]
    fn test_standardize_trims_and_drops_empty() {
        let mut records = vec![record(
            Some(1),
            Some("  Monday  "),
            Some("   "),
            Some("Widget"),
            None,
            None,
            None,
            None,
            None,
        )];
        standardize(&mut records);
        assert_eq!(records[0].day_of_week.as_deref(), Some("Monday"));
        assert_eq!(records[0].customer_name, None);
    }

    // -----------------------------------------------------------------------
    // Full pipeline
    // -----------------------------------------------------------------------

    #[test]
    fn test_clean_sales_data_end_to_end() {
        let (cleaned, report) = clean_sales_data(sample_data());

        assert_eq!(report.rows_in, 5);
        // Rows 3 and 4 drop on identifiers; Samsung Phone and iPad drop on
        // category (no sibling rows carry one). Only the first row survives.
        assert_eq!(report.dropped_missing_identifiers, 2);
        assert_eq!(report.dropped_unresolved_category, 2);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(report.rows_out, 1);

        let row = &cleaned[0];
        assert_eq!(row.transaction_id, 1);
        assert_eq!(row.product_name, "Apple Watch");
        assert_eq!(row.quantity_sold, 2);
        assert_eq!(row.total_sale, 1599.98);
    }

    #[test]
    fn test_clean_sales_data_fills_instead_of_dropping_when_possible() {
        let raw = vec![
            record(
                Some(1),
                Some("Monday"),
                Some("A"),
                Some("Widget"),
                Some("Gadgets"),
                Some(10.0),
                Some(2.0),
                Some(20.0),
                Some("Pretoria"),
            ),
            // Same product: category and price are inferable, day/store
            // mode-fill, quantity mean-fills, total derives.
            record(
                Some(2),
                None,
                Some("B"),
                Some("Widget"),
                None,
                None,
                None,
                None,
                None,
            ),
        ];
        let (cleaned, report) = clean_sales_data(raw);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(report.filled_category, 1);
        assert_eq!(report.filled_price, 1);
        assert_eq!(report.filled_quantity, 1);
        assert_eq!(report.computed_total_sale, 1);

        let second = &cleaned[1];
        assert_eq!(second.product_category, "Gadgets");
        assert_eq!(second.price, 10.0);
        assert_eq!(second.quantity_sold, 2);
        assert_eq!(second.total_sale, 20.0);
        assert_eq!(second.store_location, "Pretoria");
    }

    #[test]
    fn test_clean_empty_batch() {
        let (cleaned, report) = clean_sales_data(vec![]);
        assert!(cleaned.is_empty());
        assert_eq!(report.rows_in, 0);
        assert_eq!(report.rows_out, 0);
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    #[test]
    fn test_mode_tie_breaks_toward_first_seen() {
        let values = ["b", "a", "b", "a"];
        assert_eq!(mode(values.iter().copied()), Some("b"));
    }

    #[test]
    fn test_duplicate_rows_counts_repeats() {
        let mut records = sample_data();
        records.push(records[0].clone());
        assert_eq!(duplicate_rows(&records), 1);
    }
}

#![allow(dead_code)]

use ndarray::array;
use rfm_segments::{CentroidModel, RawTable, RawValue, SegmentationEngine, StandardScaler};

pub fn rfm_names() -> Vec<String> {
    vec!["Recency".into(), "Frequency".into(), "Monetary".into()]
}

/// Scaler centred on a typical customer (30 days, 3 orders, 500 spent).
pub fn scaler() -> StandardScaler {
    StandardScaler::from_parts(
        rfm_names(),
        vec![31f64.ln(), 4f64.ln(), 501f64.ln()],
        vec![1.0, 0.5, 1.5],
    )
    .unwrap()
}

/// Four archetypes in scaled space: champions, lapsed, frequent, newcomers.
pub fn model() -> CentroidModel {
    CentroidModel::new(
        rfm_names(),
        array![
            [-2.0, 2.0, 1.5],
            [2.0, -1.0, -1.0],
            [0.0, 1.5, 0.0],
            [-1.0, -1.5, -0.5],
        ],
    )
    .unwrap()
}

pub fn engine() -> SegmentationEngine {
    SegmentationEngine::new(model(), scaler()).unwrap()
}

pub fn text(s: &str) -> Option<RawValue> {
    Some(RawValue::Text(s.to_string()))
}

pub fn num(n: f64) -> Option<RawValue> {
    Some(RawValue::Number(n))
}

pub fn retail_table() -> RawTable {
    RawTable::new(["Invoice", "Customer ID", "Quantity", "Price", "InvoiceDate"])
}

/// Append one order line: invoice, customer, quantity, price, date.
pub fn line(table: &mut RawTable, invoice: &str, customer: f64, quantity: f64, price: f64, date: &str) {
    table.push_row(vec![text(invoice), num(customer), num(quantity), num(price), text(date)]);
}

/// A small store with clearly different customer behaviours.
pub fn store_table() -> RawTable {
    let mut table = retail_table();
    // Champion: frequent, recent, high spend
    for (i, day) in (1..=28).step_by(3).enumerate() {
        let invoice = format!("9{i:03}");
        line(&mut table, &invoice, 1001.0, 20.0, 12.5, &format!("2024-03-{day:02} 10:00:00"));
    }
    // Lapsed: one small order long ago
    line(&mut table, "8001", 1002.0, 1.0, 4.0, "2023-04-02 09:00:00");
    line(&mut table, "8002", 1003.0, 2.0, 3.5, "2023-05-11 14:30:00");
    // Regular mid-spender
    for (i, month) in (1..=3).enumerate() {
        line(&mut table, &format!("70{i}"), 1004.0, 4.0, 30.0, &format!("2024-{month:02}-15 12:00:00"));
    }
    // Newcomer with a single recent order
    line(&mut table, "6001", 1005.0, 1.0, 40.0, "2024-03-25 16:45:00");
    // Noise: return, cancellation, missing customer, zero price
    line(&mut table, "8003", 1002.0, -3.0, 4.0, "2023-04-05 09:00:00");
    line(&mut table, "C9999", 1001.0, 1.0, 12.5, "2024-03-29 10:00:00");
    table.push_row(vec![text("5001"), None, num(1.0), num(9.0), text("2024-03-01")]);
    line(&mut table, "5002", 1006.0, 3.0, 0.0, "2024-03-02");
    table
}

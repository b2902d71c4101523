//! Recency / Frequency / Monetary aggregation per customer

use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDateTime};

use crate::error::{Result, SegmentError};
use crate::types::{CustomerRfm, FrequencyBasis, RfmTable, Transaction};

#[derive(Debug, Hash, PartialEq, Eq)]
enum OrderKey<'a> {
    Invoice(&'a str),
    /// A row without an order identifier is its own order.
    Row(usize),
}

#[derive(Default)]
struct CustomerAccumulator<'a> {
    last_purchase: Option<NaiveDateTime>,
    orders: HashSet<OrderKey<'a>>,
    amounts: Vec<f64>,
}

pub struct RfmAggregator;

impl RfmAggregator {
    /// Default snapshot: one day after the latest transaction, so recency is always >= 1.
    pub fn snapshot_date(transactions: &[Transaction]) -> Option<NaiveDateTime> {
        transactions
            .iter()
            .map(|t| t.timestamp)
            .max()
            .map(|latest| latest + Duration::days(1))
    }

    /// Build one RFM row per customer, sorted by customer id.
    ///
    /// `as_of` overrides the snapshot date and must be at least one day
    /// after the latest transaction. Customers whose spend is not positive
    /// or not finite are dropped; an empty outcome is an error.
    pub fn aggregate(
        transactions: &[Transaction],
        basis: FrequencyBasis,
        as_of: Option<NaiveDateTime>,
    ) -> Result<RfmTable> {
        let default_snapshot = Self::snapshot_date(transactions).ok_or(SegmentError::EmptyResult)?;
        let snapshot = match as_of {
            Some(as_of) if as_of < default_snapshot => {
                return Err(SegmentError::InvalidSnapshot {
                    as_of,
                    latest: default_snapshot - Duration::days(1),
                });
            }
            Some(as_of) => as_of,
            None => default_snapshot,
        };

        let mut customers: BTreeMap<&str, CustomerAccumulator> = BTreeMap::new();
        for (row, transaction) in transactions.iter().enumerate() {
            let acc = customers.entry(transaction.customer_id.as_str()).or_default();

            acc.last_purchase = acc.last_purchase.max(Some(transaction.timestamp));
            let key = match (basis, transaction.invoice.as_deref()) {
                (FrequencyBasis::Invoices, Some(invoice)) => OrderKey::Invoice(invoice),
                _ => OrderKey::Row(row),
            };
            acc.orders.insert(key);
            acc.amounts.push(transaction.amount());
        }

        let rows: Vec<CustomerRfm> = customers
            .into_iter()
            .filter_map(|(customer_id, mut acc)| {
                let last_purchase = acc.last_purchase?;
                // Summing in sorted order keeps the total independent of row order.
                acc.amounts.sort_by(f64::total_cmp);
                let monetary: f64 = acc.amounts.iter().sum();
                Some(CustomerRfm {
                    customer_id: customer_id.to_string(),
                    recency: (snapshot - last_purchase).num_days(),
                    frequency: acc.orders.len() as u64,
                    monetary,
                })
            })
            .filter(|rfm| {
                if !rfm.monetary.is_finite() {
                    tracing::warn!(customer = %rfm.customer_id, "Monetary total overflowed; customer dropped");
                    return false;
                }
                rfm.monetary > 0.0
            })
            .collect();

        if rows.is_empty() {
            return Err(SegmentError::EmptyResult);
        }

        tracing::info!(
            customers = rows.len(),
            snapshot = %snapshot,
            ?basis,
            "RFM table built"
        );

        Ok(RfmTable {
            rows,
            snapshot,
            frequency_basis: basis,
        })
    }
}

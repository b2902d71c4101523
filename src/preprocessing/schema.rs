//! Schema normalization: raw dataset -> validated transactions

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{Result, SegmentError};
use crate::types::{ColumnMapping, NormalizationAudit, RawTable, RawValue, Transaction};

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Validated transactions plus the audit trail of what was dropped.
#[derive(Debug, Clone)]
pub struct NormalizedTransactions {
    pub transactions: Vec<Transaction>,
    pub audit: NormalizationAudit,
    /// Whether an invoice column was mapped, i.e. Frequency can count orders.
    pub has_invoice: bool,
}

/// Reason a row was excluded. Rows are checked in this order; the first hit wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingIdentity,
    MissingQuantity,
    MissingPrice,
    MissingTimestamp,
    NonPositiveQuantity,
    NonPositivePrice,
    NonFiniteAmount,
    CancelledInvoice,
}

impl NormalizationAudit {
    fn record(&mut self, reason: DropReason) {
        match reason {
            DropReason::MissingIdentity => self.missing_identity += 1,
            DropReason::MissingQuantity => self.missing_quantity += 1,
            DropReason::MissingPrice => self.missing_price += 1,
            DropReason::MissingTimestamp => self.missing_timestamp += 1,
            DropReason::NonPositiveQuantity => self.non_positive_quantity += 1,
            DropReason::NonPositivePrice => self.non_positive_price += 1,
            DropReason::NonFiniteAmount => self.non_finite_amount += 1,
            DropReason::CancelledInvoice => self.cancelled_invoice += 1,
        }
    }
}

struct ColumnIndices {
    identity: usize,
    quantity: usize,
    price: usize,
    timestamp: usize,
    invoice: Option<usize>,
}

impl ColumnIndices {
    fn resolve(table: &RawTable, mapping: &ColumnMapping) -> Result<Self> {
        let required = [
            ("identity", &mapping.identity),
            ("quantity", &mapping.quantity),
            ("price", &mapping.price),
            ("timestamp", &mapping.timestamp),
        ];
        for (role, name) in required {
            if name.trim().is_empty() {
                return Err(SegmentError::EmptyColumnSelection(role));
            }
        }

        let find = |name: &str| {
            table
                .column_index(name)
                .ok_or_else(|| SegmentError::MissingColumn(name.to_string()))
        };

        let invoice = match mapping.invoice.as_deref() {
            Some(name) if !name.trim().is_empty() => Some(find(name)?),
            _ => None,
        };

        Ok(Self {
            identity: find(&mapping.identity)?,
            quantity: find(&mapping.quantity)?,
            price: find(&mapping.price)?,
            timestamp: find(&mapping.timestamp)?,
            invoice,
        })
    }
}

pub struct SchemaNormalizer;

impl SchemaNormalizer {
    /// Coerce the mapped columns and keep only rows usable for aggregation.
    ///
    /// Unparsable values become missing instead of failing; missing and
    /// non-positive values are then removed by an explicit filter whose
    /// outcome is reported in the audit.
    pub fn normalize(
        table: &RawTable,
        mapping: &ColumnMapping,
        cancelled_prefix: Option<&str>,
    ) -> Result<NormalizedTransactions> {
        let columns = ColumnIndices::resolve(table, mapping)?;
        let cancelled_prefix = cancelled_prefix.filter(|p| !p.is_empty());

        let mut audit = NormalizationAudit {
            total_rows: table.len(),
            ..Default::default()
        };
        let mut transactions = Vec::with_capacity(table.len());

        for row in 0..table.len() {
            match Self::screen_row(table, row, &columns, cancelled_prefix) {
                Ok(transaction) => transactions.push(transaction),
                Err(reason) => audit.record(reason),
            }
        }
        audit.kept_rows = transactions.len();

        tracing::debug!(?audit, "Normalization audit");

        if transactions.is_empty() {
            return Err(SegmentError::NoUsableRows {
                total: audit.total_rows,
                dropped: audit.dropped(),
            });
        }

        Ok(NormalizedTransactions {
            transactions,
            audit,
            has_invoice: columns.invoice.is_some(),
        })
    }

    fn screen_row(
        table: &RawTable,
        row: usize,
        columns: &ColumnIndices,
        cancelled_prefix: Option<&str>,
    ) -> std::result::Result<Transaction, DropReason> {
        let customer_id =
            coerce_identity(table.cell(row, columns.identity)).ok_or(DropReason::MissingIdentity)?;
        let quantity =
            coerce_number(table.cell(row, columns.quantity)).ok_or(DropReason::MissingQuantity)?;
        let unit_price =
            coerce_number(table.cell(row, columns.price)).ok_or(DropReason::MissingPrice)?;
        let timestamp = coerce_timestamp(table.cell(row, columns.timestamp))
            .ok_or(DropReason::MissingTimestamp)?;

        if quantity <= 0.0 {
            return Err(DropReason::NonPositiveQuantity);
        }
        if unit_price <= 0.0 {
            return Err(DropReason::NonPositivePrice);
        }
        if !(quantity * unit_price).is_finite() {
            return Err(DropReason::NonFiniteAmount);
        }

        let invoice = columns
            .invoice
            .and_then(|idx| coerce_identity(table.cell(row, idx)));
        if let (Some(prefix), Some(invoice)) = (cancelled_prefix, invoice.as_deref()) {
            if invoice.starts_with(prefix) {
                return Err(DropReason::CancelledInvoice);
            }
        }

        Ok(Transaction {
            customer_id,
            invoice,
            quantity,
            unit_price,
            timestamp,
        })
    }
}

/// Identifiers keep their text; integral numbers lose a spurious `.0`.
pub fn coerce_identity(value: Option<&RawValue>) -> Option<String> {
    match value? {
        RawValue::Text(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        RawValue::Number(n) if !n.is_finite() => None,
        RawValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
        RawValue::Number(n) => Some(n.to_string()),
        RawValue::Other(_) => None,
    }
}

pub fn coerce_number(value: Option<&RawValue>) -> Option<f64> {
    let n = match value? {
        RawValue::Number(n) => *n,
        RawValue::Text(text) => text.trim().parse::<f64>().ok()?,
        RawValue::Other(_) => return None,
    };
    n.is_finite().then_some(n)
}

/// Text is tried against RFC 3339 and a few common layouts; numbers are Unix seconds.
pub fn coerce_timestamp(value: Option<&RawValue>) -> Option<NaiveDateTime> {
    match value? {
        RawValue::Number(n) if n.is_finite() => {
            DateTime::from_timestamp(n.trunc() as i64, 0).map(|dt| dt.naive_utc())
        }
        RawValue::Number(_) | RawValue::Other(_) => None,
        RawValue::Text(text) => parse_timestamp(text.trim()),
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Option<RawValue> {
        Some(RawValue::Text(s.to_string()))
    }

    fn num(n: f64) -> Option<RawValue> {
        Some(RawValue::Number(n))
    }

    fn retail_table() -> RawTable {
        let mut table = RawTable::new(["Invoice", "Customer ID", "Quantity", "Price", "InvoiceDate"]);
        table.push_row(vec![text("536365"), num(17850.0), num(6.0), num(2.55), text("2010-12-01 08:26:00")]);
        table.push_row(vec![text("C536379"), num(17850.0), num(-1.0), num(27.5), text("2010-12-01 09:41:00")]);
        table.push_row(vec![text("536366"), None, num(6.0), num(1.85), text("2010-12-01 08:28:00")]);
        table.push_row(vec![text("536367"), num(13047.0), text("eight"), num(2.75), text("2010-12-01 08:34:00")]);
        table.push_row(vec![text("536368"), num(13047.0), num(3.0), num(0.0), text("2010-12-01 08:34:00")]);
        table.push_row(vec![text("536369"), num(13047.0), num(3.0), num(4.25), text("not a date")]);
        table.push_row(vec![text("C536370"), num(13047.0), num(1.0), num(4.25), text("2010-12-02")]);
        table
    }

    fn retail_mapping() -> ColumnMapping {
        ColumnMapping::new("Customer ID", "Quantity", "Price", "InvoiceDate").with_invoice("Invoice")
    }

    #[test]
    fn drops_unusable_rows_with_audit() {
        let normalized =
            SchemaNormalizer::normalize(&retail_table(), &retail_mapping(), Some("C")).unwrap();

        assert_eq!(normalized.transactions.len(), 1);
        assert_eq!(normalized.transactions[0].customer_id, "17850");
        assert!(normalized.has_invoice);

        let audit = normalized.audit;
        assert_eq!(audit.total_rows, 7);
        assert_eq!(audit.kept_rows, 1);
        assert_eq!(audit.non_positive_quantity, 1);
        assert_eq!(audit.missing_identity, 1);
        assert_eq!(audit.missing_quantity, 1);
        assert_eq!(audit.non_positive_price, 1);
        assert_eq!(audit.missing_timestamp, 1);
        assert_eq!(audit.cancelled_invoice, 1);
        assert_eq!(audit.dropped(), 6);
    }

    #[test]
    fn output_never_contains_invalid_rows() {
        let normalized = SchemaNormalizer::normalize(&retail_table(), &retail_mapping(), None).unwrap();
        for t in &normalized.transactions {
            assert!(!t.customer_id.is_empty());
            assert!(t.quantity > 0.0);
            assert!(t.unit_price > 0.0);
        }
        // Without a prefix the positive-quantity "C" invoice is kept.
        assert_eq!(normalized.transactions.len(), 2);
    }

    #[test]
    fn missing_column_is_a_schema_error() {
        let mapping = ColumnMapping::new("Customer ID", "Qty", "Price", "InvoiceDate");
        let err = SchemaNormalizer::normalize(&retail_table(), &mapping, None).unwrap_err();
        assert!(matches!(err, SegmentError::MissingColumn(ref c) if c == "Qty"));
    }

    #[test]
    fn blank_selection_is_rejected() {
        let mapping = ColumnMapping::new("Customer ID", "Quantity", " ", "InvoiceDate");
        let err = SchemaNormalizer::normalize(&retail_table(), &mapping, None).unwrap_err();
        assert!(matches!(err, SegmentError::EmptyColumnSelection("price")));
    }

    #[test]
    fn empty_result_surfaces_no_usable_rows() {
        let mut table = RawTable::new(["id", "qty", "price", "date"]);
        table.push_row(vec![text("1"), num(-3.0), num(10.0), text("2024-01-01")]);
        let mapping = ColumnMapping::new("id", "qty", "price", "date");

        let err = SchemaNormalizer::normalize(&table, &mapping, None).unwrap_err();
        assert!(matches!(err, SegmentError::NoUsableRows { total: 1, dropped: 1 }));
    }

    #[test]
    fn overflowing_amount_is_dropped() {
        let mut table = RawTable::new(["id", "qty", "price", "date"]);
        table.push_row(vec![text("1"), num(1e200), num(1e200), text("2024-01-01")]);
        table.push_row(vec![text("2"), num(1.0), num(5.0), text("2024-01-02")]);
        let mapping = ColumnMapping::new("id", "qty", "price", "date");

        let normalized = SchemaNormalizer::normalize(&table, &mapping, None).unwrap();
        assert_eq!(normalized.transactions.len(), 1);
        assert_eq!(normalized.transactions[0].customer_id, "2");
        assert_eq!(normalized.audit.non_finite_amount, 1);
        assert!(normalized.transactions.iter().all(|t| t.amount().is_finite()));
    }

    #[test]
    fn non_scalar_cells_coerce_to_missing() {
        let flag = Some(RawValue::Other(serde_json::Value::Bool(true)));
        assert_eq!(coerce_identity(flag.as_ref()), None);
        assert_eq!(coerce_number(flag.as_ref()), None);
        assert_eq!(coerce_timestamp(flag.as_ref()), None);

        let mut table = RawTable::new(["id", "qty", "price", "date"]);
        table.push_row(vec![text("1"), num(2.0), num(10.0), text("2024-01-01")]);
        table.push_row(vec![text("2"), num(2.0), flag, text("2024-01-02")]);
        let mapping = ColumnMapping::new("id", "qty", "price", "date");

        let normalized = SchemaNormalizer::normalize(&table, &mapping, None).unwrap();
        assert_eq!(normalized.transactions.len(), 1);
        assert_eq!(normalized.audit.missing_price, 1);
    }

    #[test]
    fn coerces_identities() {
        assert_eq!(coerce_identity(num(17850.0).as_ref()).as_deref(), Some("17850"));
        assert_eq!(coerce_identity(num(12.5).as_ref()).as_deref(), Some("12.5"));
        assert_eq!(coerce_identity(text("  A-7 ").as_ref()).as_deref(), Some("A-7"));
        assert_eq!(coerce_identity(text("   ").as_ref()), None);
        assert_eq!(coerce_identity(None), None);
    }

    #[test]
    fn coerces_numbers_missing_on_failure() {
        assert_eq!(coerce_number(text(" 2.5 ").as_ref()), Some(2.5));
        assert_eq!(coerce_number(num(3.0).as_ref()), Some(3.0));
        assert_eq!(coerce_number(text("n/a").as_ref()), None);
        assert_eq!(coerce_number(text("NaN").as_ref()), None);
    }

    #[test]
    fn coerces_timestamps_across_formats() {
        let expected = NaiveDate::from_ymd_opt(2010, 12, 1)
            .unwrap()
            .and_hms_opt(8, 26, 0)
            .unwrap();
        for raw in [
            "2010-12-01 08:26:00",
            "2010-12-01T08:26:00",
            "2010-12-01T08:26:00Z",
            "2010-12-01 08:26",
            "12/01/2010 08:26",
        ] {
            assert_eq!(coerce_timestamp(text(raw).as_ref()), Some(expected), "{raw}");
        }

        let midnight = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(coerce_timestamp(text("2024-01-01").as_ref()), Some(midnight));
        assert_eq!(coerce_timestamp(num(1_704_067_200.0).as_ref()), Some(midnight));
        assert_eq!(coerce_timestamp(text("yesterday").as_ref()), None);
    }
}

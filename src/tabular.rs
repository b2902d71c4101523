//! Delimited text in and out: CSV uploads to raw tables, segments to CSV

use std::io::Read;

use crate::error::{Result, SegmentError};
use crate::types::{ClusteredCustomer, RawTable, RawValue, SegmentationReport};

/// Read a headed CSV into a raw table. Every cell stays text; blanks are missing.
pub fn read_csv<R: Read>(reader: R) -> Result<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut table = RawTable::new(rdr.headers()?.iter());
    for record in rdr.records() {
        let record = record?;
        table.push_row(
            record
                .iter()
                .map(|cell| (!cell.is_empty()).then(|| RawValue::Text(cell.to_string())))
                .collect(),
        );
    }
    Ok(table)
}

pub fn write_customers_csv<'a>(
    customers: impl IntoIterator<Item = &'a ClusteredCustomer>,
) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for customer in customers {
        wtr.serialize(customer)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| SegmentError::Export(e.into_error().into()))?;
    String::from_utf8(bytes).map_err(|e| {
        SegmentError::Export(csv::Error::from(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            e,
        )))
    })
}

/// Member list of one segment, `customer_id,recency,frequency,monetary,cluster`.
///
/// Returns `None` when the cluster has no members in the report.
pub fn segment_csv(report: &SegmentationReport, cluster: usize) -> Result<Option<String>> {
    if report.segment(cluster).is_none() {
        return Ok(None);
    }
    write_customers_csv(report.segment_members(cluster)).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_blank_cells_as_missing() {
        let data = "Customer ID,Quantity,Price\n17850, 6 ,2.55\n,3,\n12,4\n";
        let table = read_csv(data.as_bytes()).unwrap();

        assert_eq!(table.columns, vec!["Customer ID", "Quantity", "Price"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.cell(0, 1), Some(&RawValue::Text("6".into())));
        assert_eq!(table.cell(1, 0), None);
        assert_eq!(table.cell(1, 2), None);
        // Short rows are padded on access.
        assert_eq!(table.cell(2, 2), None);
    }

    #[test]
    fn writes_customer_rows_with_header() {
        let customers = vec![ClusteredCustomer {
            customer_id: "17850".into(),
            recency: 3,
            frequency: 2,
            monetary: 25.5,
            cluster: 1,
        }];
        let csv = write_customers_csv(&customers).unwrap();
        assert_eq!(
            csv,
            "customer_id,recency,frequency,monetary,cluster\n17850,3,2,25.5,1\n"
        );
    }
}

use crate::error::{PipelineError, PipelineResult};
use crate::types::{RawRow, Transaction};
use crate::util::{
    decode_latin1, format_int, is_missing, parse_f64_safe, parse_i64_safe, parse_integral,
    parse_invoice_date,
};
use csv::ReaderBuilder;
use log::info;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::Path;

/// Countries dropped before aggregation: the unspecified sentinel, a
/// regional label that maps to no single feature, and countries with too
/// few sales to visualize.
pub static EXCLUDED_COUNTRIES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "Unspecified",
        "European Community",
        "Malta",
        "Singapore",
        "Channel Islands",
        "Bahrain",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanReport {
    pub total_rows: usize,
    pub missing_customer: usize,
    pub excluded_country: usize,
    pub kept_rows: usize,
}

pub fn load_and_clean(path: &Path) -> PipelineResult<(Vec<Transaction>, CleanReport)> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    let (records, report) = clean_csv(&decode_latin1(&bytes))?;
    info!(
        "Cleaned {}: {} rows read, {} without customer, {} excluded by country, {} kept",
        path.display(),
        format_int(report.total_rows),
        format_int(report.missing_customer),
        format_int(report.excluded_country),
        format_int(report.kept_rows)
    );
    Ok((records, report))
}

/// Clean already-decoded CSV text. Any row that cannot be coerced aborts
/// the whole load.
pub fn clean_csv(text: &str) -> PipelineResult<(Vec<Transaction>, CleanReport)> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut report = CleanReport::default();
    let mut records: Vec<Transaction> = Vec::new();

    let headers = rdr.headers()?.clone();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row: RawRow = record.deserialize(Some(&headers))?;
        report.total_rows += 1;

        // Dates are parsed for every row, including ones dropped below.
        let invoice_date = match parse_invoice_date(row.invoice_date.as_deref()) {
            Some(d) => d,
            None if is_missing(row.invoice_date.as_deref()) => {
                return Err(PipelineError::MissingField {
                    line,
                    column: "InvoiceDate",
                })
            }
            None => {
                return Err(invalid(
                    line,
                    "InvoiceDate",
                    &row.invoice_date,
                    "expected MM/DD/YYYY HH:MM",
                ))
            }
        };

        if is_missing(row.customer_id.as_deref()) {
            report.missing_customer += 1;
            continue;
        }
        if let Some(country) = row.country.as_deref() {
            if EXCLUDED_COUNTRIES.contains(country) {
                report.excluded_country += 1;
                continue;
            }
        }

        let customer_id = parse_integral(row.customer_id.as_deref())
            .ok_or_else(|| invalid(line, "CustomerID", &row.customer_id, "not an integer"))?;

        let invoice_no = required(line, "InvoiceNo", row.invoice_no)?;
        let stock_code = required(line, "StockCode", row.stock_code)?;
        let country = required(line, "Country", row.country)?;
        let quantity = required(line, "Quantity", row.quantity)?;
        let quantity = parse_i64_safe(Some(&quantity))
            .ok_or_else(|| invalid(line, "Quantity", &Some(quantity.clone()), "not an integer"))?;
        let unit_price = required(line, "UnitPrice", row.unit_price)?;
        let unit_price = parse_f64_safe(Some(&unit_price))
            .ok_or_else(|| invalid(line, "UnitPrice", &Some(unit_price.clone()), "not a number"))?;

        records.push(Transaction {
            invoice_no,
            invoice_date,
            country,
            customer_id,
            stock_code,
            quantity,
            unit_price,
        });
    }

    report.kept_rows = records.len();
    Ok((records, report))
}

fn required(line: u64, column: &'static str, value: Option<String>) -> PipelineResult<String> {
    match value {
        Some(v) if !is_missing(Some(&v)) => Ok(v),
        _ => Err(PipelineError::MissingField { line, column }),
    }
}

fn invalid(
    line: u64,
    column: &'static str,
    value: &Option<String>,
    reason: &'static str,
) -> PipelineError {
    PipelineError::InvalidField {
        line,
        column,
        value: value.clone().unwrap_or_default(),
        reason,
    }
}

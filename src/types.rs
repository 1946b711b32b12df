use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// One line of the transaction CSV exactly as it appears on disk.
/// `Description` is present in the file but never read.
#[derive(Debug, Deserialize)]
pub struct RawRow {
    #[serde(rename = "InvoiceNo")]
    pub invoice_no: Option<String>,
    #[serde(rename = "StockCode")]
    pub stock_code: Option<String>,
    #[serde(rename = "Quantity")]
    pub quantity: Option<String>,
    #[serde(rename = "InvoiceDate")]
    pub invoice_date: Option<String>,
    #[serde(rename = "UnitPrice")]
    pub unit_price: Option<String>,
    #[serde(rename = "CustomerID")]
    pub customer_id: Option<String>,
    #[serde(rename = "Country")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub invoice_no: String,
    pub invoice_date: NaiveDate,
    pub country: String,
    pub customer_id: i64,
    pub stock_code: String,
    pub quantity: i64,
    pub unit_price: f64,
}

/// Cumulative figures for one country up to and including one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SalesMetrics {
    #[serde(rename = "InvoiceCountToDate")]
    pub invoice_count: u64,
    #[serde(rename = "QuantitySoldToDate")]
    pub quantity: i64,
    #[serde(rename = "AmountPaidToDate")]
    pub amount: f64,
    #[serde(rename = "UniqueCustomerIDCountToDate")]
    pub unique_customers: usize,
    #[serde(rename = "UniqueStockCodeCountToDate")]
    pub unique_stock_codes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SalesSummary {
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
    pub maximum_total_revenue: Option<f64>,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CountrySummaryRow {
    #[serde(rename = "Country")]
    #[tabled(rename = "Country")]
    pub country: String,
    #[serde(rename = "TradingDays")]
    #[tabled(rename = "TradingDays")]
    pub trading_days: usize,
    #[serde(rename = "Invoices")]
    #[tabled(rename = "Invoices")]
    pub invoices: String,
    #[serde(rename = "Quantity")]
    #[tabled(rename = "Quantity")]
    pub quantity: String,
    #[serde(rename = "Revenue")]
    #[tabled(rename = "Revenue")]
    pub revenue: String,
    #[serde(rename = "Customers")]
    #[tabled(rename = "Customers")]
    pub customers: String,
    #[serde(rename = "Products")]
    #[tabled(rename = "Products")]
    pub products: String,
}

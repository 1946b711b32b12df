use crate::error::{PipelineError, PipelineResult};
use crate::geo::FeatureCollection;
use crate::types::{CountrySummaryRow, SalesMetrics, SalesSummary, Transaction};
use crate::util::{format_int, format_number};
use chrono::{Datelike, NaiveDate};
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// An associative combine with an identity element. Running totals are a
/// left fold of per-day values under `combine`.
pub trait Monoid {
    fn empty() -> Self;
    fn combine(&mut self, other: &Self);
}

impl Monoid for u64 {
    fn empty() -> Self {
        0
    }
    fn combine(&mut self, other: &Self) {
        *self += *other;
    }
}

// Callers bound the inputs with `check_quantity_bounds` first.
impl Monoid for i64 {
    fn empty() -> Self {
        0
    }
    fn combine(&mut self, other: &Self) {
        *self += *other;
    }
}

impl Monoid for f64 {
    fn empty() -> Self {
        0.0
    }
    fn combine(&mut self, other: &Self) {
        *self += *other;
    }
}

/// A set whose "sum" is union. Only its cardinality is ever reported.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionSet<T: Ord>(BTreeSet<T>);

impl<T: Ord> UnionSet<T> {
    pub fn insert(&mut self, value: T) -> bool {
        self.0.insert(value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Ord + Clone> Monoid for UnionSet<T> {
    fn empty() -> Self {
        UnionSet(BTreeSet::new())
    }
    fn combine(&mut self, other: &Self) {
        self.0.extend(other.0.iter().cloned());
    }
}

impl<T: Ord> FromIterator<T> for UnionSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        UnionSet(iter.into_iter().collect())
    }
}

/// Sales for one country on one day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayAggregate {
    pub invoice_count: u64,
    pub quantity: i64,
    pub amount: f64,
    pub customers: UnionSet<i64>,
    pub stock_codes: UnionSet<String>,
}

impl Monoid for DayAggregate {
    fn empty() -> Self {
        DayAggregate {
            invoice_count: Monoid::empty(),
            quantity: Monoid::empty(),
            amount: Monoid::empty(),
            customers: Monoid::empty(),
            stock_codes: Monoid::empty(),
        }
    }

    fn combine(&mut self, other: &Self) {
        self.invoice_count.combine(&other.invoice_count);
        self.quantity.combine(&other.quantity);
        self.amount.combine(&other.amount);
        self.customers.combine(&other.customers);
        self.stock_codes.combine(&other.stock_codes);
    }
}

impl DayAggregate {
    pub fn metrics(&self) -> SalesMetrics {
        SalesMetrics {
            invoice_count: self.invoice_count,
            quantity: self.quantity,
            amount: self.amount,
            unique_customers: self.customers.len(),
            unique_stock_codes: self.stock_codes.len(),
        }
    }
}

/// Fold `parts` left to right, reporting the accumulator after each step.
pub fn running_fold<'a, M, R, I, F>(parts: I, mut report: F) -> Vec<R>
where
    M: Monoid + 'a,
    I: IntoIterator<Item = &'a M>,
    F: FnMut(&M) -> R,
{
    let mut acc = M::empty();
    parts
        .into_iter()
        .map(|part| {
            acc.combine(part);
            report(&acc)
        })
        .collect()
}

/// Per-day aggregates, ordered by country and then by date.
pub type CountryDays = BTreeMap<String, BTreeMap<NaiveDate, DayAggregate>>;

/// Cumulative metrics for one country, ascending by date. Always a sequence,
/// even when the country traded on a single day.
#[derive(Debug, Clone, PartialEq)]
pub struct CountrySeries {
    pub country: String,
    pub days: Vec<(NaiveDate, SalesMetrics)>,
}

impl CountrySeries {
    pub fn last(&self) -> Option<&SalesMetrics> {
        self.days.last().map(|(_, m)| m)
    }
}

/// year -> month -> day -> metrics, serialized with numeric keys in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SalesCalendar(BTreeMap<i32, BTreeMap<u32, BTreeMap<u32, SalesMetrics>>>);

impl SalesCalendar {
    pub fn insert(&mut self, date: NaiveDate, metrics: SalesMetrics) {
        self.0
            .entry(date.year())
            .or_default()
            .entry(date.month())
            .or_default()
            .insert(date.day(), metrics);
    }

    #[cfg(test)]
    fn get(&self, date: NaiveDate) -> Option<&SalesMetrics> {
        self.0.get(&date.year())?.get(&date.month())?.get(&date.day())
    }

    #[cfg(test)]
    fn day_count(&self) -> usize {
        self.0
            .values()
            .flat_map(|months| months.values())
            .map(BTreeMap::len)
            .sum()
    }
}

impl FromIterator<(NaiveDate, SalesMetrics)> for SalesCalendar {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, SalesMetrics)>>(iter: I) -> Self {
        let mut calendar = SalesCalendar::default();
        for (date, metrics) in iter {
            calendar.insert(date, metrics);
        }
        calendar
    }
}

/// Every transaction country must exist as a feature; otherwise its sales
/// would silently vanish from the map.
pub fn check_countries_present(
    rows: &[Transaction],
    collection: &FeatureCollection,
) -> PipelineResult<()> {
    let names: HashSet<&str> = collection.features.iter().filter_map(|f| f.name()).collect();
    let missing: BTreeSet<&str> = rows
        .iter()
        .map(|r| r.country.as_str())
        .filter(|c| !names.contains(c))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(PipelineError::MissingCountries {
        countries: missing.into_iter().map(str::to_string).collect(),
    })
}

pub fn check_single_day_invoices(rows: &[Transaction]) -> PipelineResult<()> {
    let mut seen: HashMap<&str, NaiveDate> = HashMap::new();
    for r in rows {
        match seen.entry(r.invoice_no.as_str()) {
            Entry::Vacant(e) => {
                e.insert(r.invoice_date);
            }
            Entry::Occupied(e) if *e.get() != r.invoice_date => {
                return Err(PipelineError::MultiDayInvoice {
                    invoice: r.invoice_no.clone(),
                    first: *e.get(),
                    second: r.invoice_date,
                });
            }
            Entry::Occupied(_) => {}
        }
    }
    Ok(())
}

/// Quantities are summed per day and then per country in date order. If the
/// absolute values for a country fit in `i64`, so does every partial sum.
pub fn check_quantity_bounds(rows: &[Transaction]) -> PipelineResult<()> {
    let mut totals: BTreeMap<&str, i128> = BTreeMap::new();
    for r in rows {
        *totals.entry(r.country.as_str()).or_default() += i128::from(r.quantity).abs();
    }
    match totals.into_iter().find(|(_, t)| *t > i128::from(i64::MAX)) {
        Some((country, _)) => Err(PipelineError::QuantityOverflow {
            country: country.to_string(),
        }),
        None => Ok(()),
    }
}

/// Amount paid per row. Rows are independent, so this runs on the rayon
/// pool; output index `i` belongs to `rows[i]`.
pub fn compute_amounts(rows: &[Transaction]) -> Vec<f64> {
    rows.par_iter()
        .map(|r| r.unit_price * r.quantity as f64)
        .collect()
}

pub fn group_by_country_date(rows: &[Transaction], amounts: &[f64]) -> CountryDays {
    struct Bucket<'a> {
        invoices: HashSet<&'a str>,
        day: DayAggregate,
    }

    let mut buckets: BTreeMap<&str, BTreeMap<NaiveDate, Bucket>> = BTreeMap::new();
    for (r, amount) in rows.iter().zip(amounts) {
        let b = buckets
            .entry(r.country.as_str())
            .or_default()
            .entry(r.invoice_date)
            .or_insert_with(|| Bucket {
                invoices: HashSet::new(),
                day: DayAggregate::empty(),
            });
        b.invoices.insert(r.invoice_no.as_str());
        b.day.quantity += r.quantity;
        b.day.amount += amount;
        b.day.customers.insert(r.customer_id);
        b.day.stock_codes.insert(r.stock_code.clone());
    }

    buckets
        .into_iter()
        .map(|(country, days)| {
            let days = days
                .into_iter()
                .map(|(date, mut b)| {
                    b.day.invoice_count = b.invoices.len() as u64;
                    (date, b.day)
                })
                .collect();
            (country.to_string(), days)
        })
        .collect()
}

pub fn cumulative_by_country(grouped: &CountryDays) -> Vec<CountrySeries> {
    grouped
        .iter()
        .map(|(country, days)| {
            let metrics = running_fold(days.values(), DayAggregate::metrics);
            debug!("{}: {} trading days", country, metrics.len());
            CountrySeries {
                country: country.clone(),
                days: days.keys().copied().zip(metrics).collect(),
            }
        })
        .collect()
}

pub fn summarize(series: &[CountrySeries]) -> SalesSummary {
    let mut summary = SalesSummary::default();
    for (date, m) in series.iter().flat_map(|s| s.days.iter()) {
        summary.earliest_date = Some(summary.earliest_date.map_or(*date, |d| d.min(*date)));
        summary.latest_date = Some(summary.latest_date.map_or(*date, |d| d.max(*date)));
        summary.maximum_total_revenue = Some(
            summary
                .maximum_total_revenue
                .map_or(m.amount, |v| v.max(m.amount)),
        );
    }
    summary
}

/// Put each country's calendar under `properties.salesData` of every
/// feature carrying that name. Returns the number of features enriched.
pub fn attach_sales_data(
    collection: &mut FeatureCollection,
    series: &[CountrySeries],
) -> PipelineResult<usize> {
    let mut calendars: HashMap<&str, Value> = HashMap::new();
    for s in series {
        let calendar: SalesCalendar = s.days.iter().copied().collect();
        calendars.insert(s.country.as_str(), serde_json::to_value(&calendar)?);
    }

    let mut matched = 0;
    for feature in &mut collection.features {
        let Some(value) = feature.name().and_then(|n| calendars.get(n)) else {
            continue;
        };
        let value = value.clone();
        let Some(properties) = feature.properties_mut() else {
            continue;
        };
        properties.insert("salesData".to_string(), value);
        matched += 1;
    }
    Ok(matched)
}

/// Enrich `collection` in place with cumulative sales from `rows`.
///
/// Both preconditions are checked before anything is computed, so a failure
/// leaves the collection untouched.
pub fn enrich(
    rows: &[Transaction],
    collection: &mut FeatureCollection,
) -> PipelineResult<Vec<CountrySeries>> {
    check_countries_present(rows, collection)?;
    check_single_day_invoices(rows)?;
    check_quantity_bounds(rows)?;

    let amounts = compute_amounts(rows);
    let grouped = group_by_country_date(rows, &amounts);
    let series = cumulative_by_country(&grouped);

    let matched = attach_sales_data(collection, &series)?;
    let summary = summarize(&series);
    collection.earliest_date = summary.earliest_date;
    collection.latest_date = summary.latest_date;
    collection.maximum_total_revenue = summary.maximum_total_revenue;

    info!(
        "Aggregated {} rows into {} country series; {} features enriched",
        format_int(rows.len()),
        series.len(),
        matched
    );
    Ok(series)
}

/// Final cumulative figures per country, highest revenue first.
pub fn country_summaries(series: &[CountrySeries]) -> Vec<CountrySummaryRow> {
    let mut tmp: Vec<(&str, usize, SalesMetrics)> = series
        .iter()
        .filter_map(|s| s.last().map(|m| (s.country.as_str(), s.days.len(), *m)))
        .collect();
    tmp.sort_by(|a, b| {
        b.2.amount
            .partial_cmp(&a.2.amount)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    tmp.into_iter()
        .map(|(country, trading_days, m)| CountrySummaryRow {
            country: country.to_string(),
            trading_days,
            invoices: format_int(m.invoice_count),
            quantity: format_int(m.quantity),
            revenue: format_number(m.amount, 2),
            customers: format_int(m.unique_customers),
            products: format_int(m.unique_stock_codes),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tx(
        invoice: &str,
        day: NaiveDate,
        country: &str,
        customer: i64,
        stock: &str,
        qty: i64,
        price: f64,
    ) -> Transaction {
        Transaction {
            invoice_no: invoice.to_string(),
            invoice_date: day,
            country: country.to_string(),
            customer_id: customer,
            stock_code: stock.to_string(),
            quantity: qty,
            unit_price: price,
        }
    }

    fn world(names: &[&str]) -> FeatureCollection {
        let features: Vec<Value> = names
            .iter()
            .map(|n| json!({ "type": "Feature", "properties": { "name": n }, "geometry": null }))
            .collect();
        serde_json::from_value(json!({ "type": "FeatureCollection", "features": features })).unwrap()
    }

    #[test]
    fn union_set_combine_is_union() {
        let mut a: UnionSet<i64> = [1, 2].into_iter().collect();
        let b: UnionSet<i64> = [2, 3].into_iter().collect();
        a.combine(&b);
        assert_eq!(a.len(), 3);
        let mut e = UnionSet::<i64>::empty();
        e.combine(&b);
        assert_eq!(e, b);
    }

    #[test]
    fn running_fold_reports_after_each_part() {
        let parts = [1i64, 2, 3];
        assert_eq!(running_fold(parts.iter(), |acc| *acc), vec![1, 3, 6]);
    }

    #[test]
    fn same_day_rows_sum_and_carry_into_next_day() {
        let d1 = date(2011, 3, 1);
        let d2 = date(2011, 3, 2);
        let rows = vec![
            tx("1", d1, "Germany", 12345, "A", 2, 5.0),
            tx("1", d1, "Germany", 12345, "B", 1, 5.0),
            tx("2", d2, "Germany", 12346, "A", 1, 3.0),
        ];
        let mut fc = world(&["Germany"]);
        let series = enrich(&rows, &mut fc).unwrap();
        assert_eq!(series.len(), 1);
        let days = &series[0].days;
        assert_eq!(days[0].0, d1);
        assert_eq!(days[0].1.amount, 15.0);
        assert_eq!(days[0].1.quantity, 3);
        assert_eq!(days[0].1.invoice_count, 1);
        assert_eq!(days[1].1.amount, 18.0);
        assert_eq!(days[1].1.quantity, 4);
        assert_eq!(days[1].1.invoice_count, 2);
        assert_eq!(days[1].1.unique_customers, 2);
        assert_eq!(days[1].1.unique_stock_codes, 2);
    }

    #[test]
    fn cumulative_sets_match_union_of_days_and_never_shrink() {
        let rows = vec![
            tx("1", date(2011, 1, 3), "France", 1, "A", 1, 1.0),
            tx("2", date(2011, 1, 1), "France", 2, "B", 1, 1.0),
            tx("3", date(2011, 1, 2), "France", 1, "A", 1, 1.0),
            tx("4", date(2011, 1, 2), "Spain", 9, "Z", 4, 2.0),
            tx("5", date(2011, 1, 4), "France", 3, "C", 1, 1.0),
        ];
        let amounts = compute_amounts(&rows);
        let grouped = group_by_country_date(&rows, &amounts);
        let series = cumulative_by_country(&grouped);

        let france = series.iter().find(|s| s.country == "France").unwrap();
        let dates: Vec<_> = france.days.iter().map(|(d, _)| *d).collect();
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
        let customers: Vec<_> = france.days.iter().map(|(_, m)| m.unique_customers).collect();
        assert_eq!(customers, vec![1, 2, 2, 3]);
        let stock: Vec<_> = france.days.iter().map(|(_, m)| m.unique_stock_codes).collect();
        assert_eq!(stock, vec![1, 2, 2, 3]);
        for w in france.days.windows(2) {
            assert!(w[0].1.invoice_count <= w[1].1.invoice_count);
            assert!(w[0].1.quantity <= w[1].1.quantity);
            assert!(w[0].1.amount <= w[1].1.amount);
        }

        // Spain's totals never leak into France's.
        let spain = series.iter().find(|s| s.country == "Spain").unwrap();
        assert_eq!(spain.days.len(), 1);
        assert_eq!(spain.days[0].1.quantity, 4);
        assert_eq!(france.last().unwrap().quantity, 4);
    }

    #[test]
    fn single_day_country_nests_like_any_other() {
        let rows = vec![
            tx("1", date(2010, 12, 1), "Norway", 7, "A", 3, 2.0),
            tx("2", date(2010, 12, 1), "Sweden", 8, "A", 1, 1.0),
            tx("3", date(2011, 1, 5), "Sweden", 8, "B", 1, 1.0),
        ];
        let mut fc = world(&["Norway", "Sweden"]);
        enrich(&rows, &mut fc).unwrap();

        let norway = &fc.features[0].properties().unwrap()["salesData"];
        assert_eq!(norway["2010"]["12"]["1"]["AmountPaidToDate"], json!(6.0));
        assert_eq!(norway["2010"]["12"]["1"]["QuantitySoldToDate"], json!(3));
        let sweden = &fc.features[1].properties().unwrap()["salesData"];
        assert_eq!(sweden["2011"]["1"]["5"]["InvoiceCountToDate"], json!(2));
        assert!(norway.is_object() && norway["2010"].is_object() && norway["2010"]["12"].is_object());
    }

    #[test]
    fn summary_spans_all_countries() {
        let rows = vec![
            tx("1", date(2011, 2, 1), "Norway", 7, "A", 1, 100.0),
            tx("2", date(2010, 12, 1), "Sweden", 8, "A", 1, 1.0),
            tx("3", date(2011, 12, 9), "Sweden", 8, "B", 1, 1.0),
        ];
        let mut fc = world(&["Norway", "Sweden", "Finland"]);
        enrich(&rows, &mut fc).unwrap();
        assert_eq!(fc.earliest_date, Some(date(2010, 12, 1)));
        assert_eq!(fc.latest_date, Some(date(2011, 12, 9)));
        assert_eq!(fc.maximum_total_revenue, Some(100.0));
        assert!(!fc.features[2].properties().unwrap().contains_key("salesData"));
    }

    #[test]
    fn empty_input_has_no_summary() {
        let mut fc = world(&["Norway"]);
        let series = enrich(&[], &mut fc).unwrap();
        assert!(series.is_empty());
        assert_eq!(fc.earliest_date, None);
        assert_eq!(fc.maximum_total_revenue, None);
    }

    #[test]
    fn missing_country_is_fatal_and_listed() {
        let rows = vec![
            tx("1", date(2011, 1, 1), "Germany", 1, "A", 1, 1.0),
            tx("2", date(2011, 1, 1), "Atlantis", 1, "A", 1, 1.0),
            tx("3", date(2011, 1, 1), "Lemuria", 1, "A", 1, 1.0),
        ];
        let mut fc = world(&["Germany"]);
        match enrich(&rows, &mut fc) {
            Err(PipelineError::MissingCountries { countries }) => {
                assert_eq!(countries, vec!["Atlantis", "Lemuria"]);
            }
            other => panic!("expected MissingCountries, got {other:?}"),
        }
        assert!(!fc.features[0].properties().unwrap().contains_key("salesData"));
    }

    #[test]
    fn quantity_sum_past_i64_is_fatal() {
        let rows = vec![
            tx("1", date(2011, 1, 1), "Germany", 1, "A", i64::MAX, 1.0),
            tx("2", date(2011, 1, 2), "Germany", 1, "A", 1, 1.0),
        ];
        let mut fc = world(&["Germany"]);
        match enrich(&rows, &mut fc) {
            Err(PipelineError::QuantityOverflow { country }) => assert_eq!(country, "Germany"),
            other => panic!("expected QuantityOverflow, got {other:?}"),
        }
    }

    #[test]
    fn large_quantities_in_separate_countries_are_fine() {
        let rows = vec![
            tx("1", date(2011, 1, 1), "Germany", 1, "A", i64::MAX, 0.0),
            tx("2", date(2011, 1, 1), "France", 1, "A", i64::MIN + 1, 0.0),
        ];
        assert!(check_quantity_bounds(&rows).is_ok());
    }

    #[test]
    fn invoice_on_two_days_is_fatal() {
        let rows = vec![
            tx("536365", date(2011, 1, 1), "Germany", 1, "A", 1, 1.0),
            tx("536365", date(2011, 1, 2), "Germany", 1, "B", 1, 1.0),
        ];
        let err = check_single_day_invoices(&rows).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MultiDayInvoice { ref invoice, .. } if invoice == "536365"
        ));
    }

    #[test]
    fn calendar_keys_are_unpadded_numbers() {
        let m = SalesMetrics {
            invoice_count: 1,
            quantity: 1,
            amount: 1.5,
            unique_customers: 1,
            unique_stock_codes: 1,
        };
        let calendar: SalesCalendar = [(date(2011, 1, 9), m), (date(2010, 12, 1), m)]
            .into_iter()
            .collect();
        assert_eq!(calendar.day_count(), 2);
        assert_eq!(calendar.get(date(2011, 1, 9)), Some(&m));
        let text = serde_json::to_string(&calendar).unwrap();
        assert!(text.starts_with(r#"{"2010":{"12":{"1":"#));
        assert!(text.contains(r#""2011":{"1":{"9":"#));
    }

    #[test]
    fn summaries_rank_by_revenue() {
        let rows = vec![
            tx("1", date(2011, 1, 1), "Norway", 1, "A", 1, 1.0),
            tx("2", date(2011, 1, 1), "Sweden", 2, "A", 1000, 2.0),
        ];
        let grouped = group_by_country_date(&rows, &compute_amounts(&rows));
        let rows = country_summaries(&cumulative_by_country(&grouped));
        assert_eq!(rows[0].country, "Sweden");
        assert_eq!(rows[0].revenue, "2,000.00");
        assert_eq!(rows[0].quantity, "1,000");
        assert_eq!(rows[1].country, "Norway");
    }
}

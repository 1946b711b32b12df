use crate::aggregate::{self, CountrySeries};
use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::geo;
use crate::loader::{self, CleanReport};
use crate::output;
use crate::types::SalesSummary;
use log::info;

#[derive(Debug, Clone)]
pub struct RunReport {
    pub clean: CleanReport,
    pub renamed_features: usize,
    pub series: Vec<CountrySeries>,
    pub summary: SalesSummary,
}

/// Clean the transactions, normalize the map, merge the two and write the
/// enriched collection. Nothing is written unless every stage succeeds.
pub fn run(config: &PipelineConfig) -> PipelineResult<RunReport> {
    let (transactions, clean) = loader::load_and_clean(&config.transactions_path)?;

    let mut world = geo::load_geo(&config.geo_path)?;
    let renamed_features = geo::normalize_names(&mut world);

    let series = aggregate::enrich(&transactions, &mut world)?;
    let summary = SalesSummary {
        earliest_date: world.earliest_date,
        latest_date: world.latest_date,
        maximum_total_revenue: world.maximum_total_revenue,
    };

    output::write_json(&config.output_path, &world)?;
    info!("Wrote {}", config.output_path.display());

    Ok(RunReport {
        clean,
        renamed_features,
        series,
        summary,
    })
}

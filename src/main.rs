// Entry point. Takes no arguments: reads ./data/data.csv and
// ./data/world.geojson, writes ./data/processed_data.geojson, and prints a
// short summary. Any failed check aborts with a non-zero exit code.
use anyhow::{Context, Result};
use sales_geo_report::aggregate::country_summaries;
use sales_geo_report::config::PipelineConfig;
use sales_geo_report::output;
use sales_geo_report::pipeline;
use sales_geo_report::util::{format_int, format_number};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = PipelineConfig::default();
    let report = pipeline::run(&config).context("sales enrichment failed")?;

    println!(
        "Processed dataset ({} rows read, {} kept, {} feature names normalized)\n",
        format_int(report.clean.total_rows),
        format_int(report.clean.kept_rows),
        report.renamed_features
    );
    println!("Top Countries by Revenue\n");
    output::preview_table_rows(&country_summaries(&report.series), 5);

    let summary = report.summary;
    if let (Some(first), Some(last), Some(max)) = (
        summary.earliest_date,
        summary.latest_date,
        summary.maximum_total_revenue,
    ) {
        println!(
            "Sales from {} to {}; highest cumulative revenue {}",
            first,
            last,
            format_number(max, 2)
        );
    }
    println!("(Full map exported to {})", config.output_path.display());
    Ok(())
}

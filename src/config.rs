use std::path::PathBuf;

pub const TRANSACTIONS_CSV_PATH: &str = "./data/data.csv";
pub const WORLD_GEOJSON_PATH: &str = "./data/world.geojson";
pub const OUTPUT_GEOJSON_PATH: &str = "./data/processed_data.geojson";

/// Where the pipeline reads its two inputs and writes its single output.
///
/// The binary always runs with [`PipelineConfig::default`]; other paths are
/// only used by tests.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub transactions_path: PathBuf,
    pub geo_path: PathBuf,
    pub output_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            transactions_path: PathBuf::from(TRANSACTIONS_CSV_PATH),
            geo_path: PathBuf::from(WORLD_GEOJSON_PATH),
            output_path: PathBuf::from(OUTPUT_GEOJSON_PATH),
        }
    }
}

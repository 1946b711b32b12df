use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("line {line}: invalid {column} value {value:?} ({reason})")]
    InvalidField {
        line: u64,
        column: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("line {line}: missing {column} after cleaning")]
    MissingField { line: u64, column: &'static str },

    #[error("countries missing from the geographic data: {}", countries.join(", "))]
    MissingCountries { countries: Vec<String> },

    #[error("cumulative quantity for {country} does not fit in 64 bits")]
    QuantityOverflow { country: String },

    #[error("invoice {invoice} spans multiple days ({first} and {second}); not supported")]
    MultiDayInvoice {
        invoice: String,
        first: NaiveDate,
        second: NaiveDate,
    },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

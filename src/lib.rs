//! Enrich a world GeoJSON map with cumulative, per-day e-commerce sales.
//!
//! Flow: [`loader`] cleans the transaction CSV, [`geo`] aligns feature names
//! with the transaction country names, and [`aggregate`] builds the running
//! totals and attaches them to the features. [`pipeline::run`] ties the
//! three together.
pub mod aggregate;
pub mod config;
pub mod error;
pub mod geo;
pub mod loader;
pub mod output;
pub mod pipeline;
pub mod types;
pub mod util;

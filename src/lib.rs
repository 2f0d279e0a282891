//! report-ingest: commodity report ingestion
//!
//! Classifies PDF market reports by publisher and date, indexes their pages
//! in per-source Qdrant collections and runs the extraction tasks registered
//! for the source, persisting prices, inventories, news and chart analyses
//! together with an audit trail.

pub mod commands;
pub mod config;
pub mod content;
pub mod embed;
pub mod embedding_backend;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod meta;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod reader;
pub mod store;

pub use error::{Error, Result};
pub use pipeline::{Pipeline, ProcessingOutcome};

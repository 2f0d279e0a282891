//! Semantic extraction
//!
//! The `ExtractionService` seam classifies a document from its first page
//! and pulls typed records out of retrieved text or chart images.

mod http_client;
mod prompts;
mod schema;

pub use http_client::ChatExtractionClient;
pub use schema::*;

use crate::error::Result;
use crate::models::Classification;
use crate::reader::PageImage;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Typed reference to an extraction schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    MysteelInventory,
    MarketNews,
    ChartAnalysis,
    PlattsPrices,
    FastmarketsPrices,
    BalticPrices,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::MysteelInventory,
        Capability::MarketNews,
        Capability::ChartAnalysis,
        Capability::PlattsPrices,
        Capability::FastmarketsPrices,
        Capability::BalticPrices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::MysteelInventory => "mysteel_inventory",
            Capability::MarketNews => "market_news",
            Capability::ChartAnalysis => "chart_analysis",
            Capability::PlattsPrices => "platts_prices",
            Capability::FastmarketsPrices => "fastmarkets_prices",
            Capability::BalticPrices => "baltic_prices",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an extraction capability reads
#[derive(Debug, Clone)]
pub enum ExtractionInput {
    /// Retrieved chunks joined into one context
    Text(String),
    /// Images lifted from the raw document
    Images(Vec<PageImage>),
}

/// Trait for extraction backends
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Determine publisher and report date from first-page text
    async fn classify(&self, text: &str) -> Result<Classification>;

    /// Best-effort structured extraction; absent fields stay `None`
    async fn extract(&self, capability: Capability, input: ExtractionInput) -> Result<TaskOutput>;
}

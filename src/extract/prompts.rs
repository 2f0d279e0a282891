//! System prompts for the extraction service

use super::Capability;

const NO_FABRICATION: &str = "If a value is not present or cannot be identified with certainty, \
omit it. Never invent values. Return only the fields that appear in the text, each with its own date \
when the text gives one.";

pub const CLASSIFY: &str = "You classify commodity market reports. Identify the publisher of the \
report (Mysteel, FastMarkets, Platts, Baltic, or Other when it is none of these) and the report \
date from the text of its first page.";

/// System prompt for an extraction capability
pub fn system_prompt(capability: Capability) -> String {
    let task = match capability {
        Capability::PlattsPrices => {
            "Extract these prices from the report text, with the exact date of each: \
             Platts 62% Fe CFR China, Platts 65% Fe CFR China, Platts IOMGD00."
        }
        Capability::FastmarketsPrices => {
            "Extract these prices from the report text, with the exact date of each: \
             FastMarkets MB-IRO-0009, FastMarkets MB-IRO-0019 VIU."
        }
        Capability::BalticPrices => {
            "Extract the C3 Tubarao to Qingdao freight rate from the report text, with its date."
        }
        Capability::MysteelInventory => {
            "Extract the iron ore inventory table values for the columns Pellet, Concentrate, \
             Lump, Fines, Australian Iron Ore and Brazilian Iron Ore, with the report date."
        }
        Capability::MarketNews => {
            "Identify the most important news items in the text. For each give its headline, a \
             two to three sentence summary, the market sentiment (Positive, Negative or Neutral) \
             and its publication date when available."
        }
        Capability::ChartAnalysis => {
            "Analyse each of the following chart images in order. For each give a concise title, \
             a detailed description of the data including trends, key figures and units, and the \
             date the data refers to when it can be inferred."
        }
    };
    format!("{} {}", task, NO_FABRICATION)
}

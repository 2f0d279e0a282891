//! Typed extraction outputs and the JSON schemas requested for them.
//!
//! Every field the service could not find is `None` and is dropped when the
//! output is normalized, so "nothing found" normalizes to an empty object.

use super::Capability;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};
use tracing::warn;

/// A numeric observation with its own date when the report states one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedValue {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlattsPrices {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platts_62_cfr_china: Option<DatedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platts_65_cfr_china: Option<DatedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iomgd00: Option<DatedValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FastmarketsPrices {
    /// 65% Fe Brazil-origin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mb_iro_0009: Option<DatedValue>,
    /// 65% Fe value-in-use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mb_iro_0019_viu: Option<DatedValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalticPrices {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c3_tubarao_qingdao: Option<DatedValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MysteelInventory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pellet: Option<DatedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concentrate: Option<DatedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lump: Option<DatedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fines: Option<DatedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub australian_iron_ore: Option<DatedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brazilian_iron_ore: Option<DatedValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub summary: String,
    /// Positive, Negative or Neutral
    pub sentiment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketNews {
    #[serde(default)]
    pub news: Vec<NewsItem>,
}

/// What the service says about one chart image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartAnalysis {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChartAnalyses {
    #[serde(default)]
    pub charts: Vec<ChartAnalysis>,
}

/// A chart analysis paired with the image it describes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_date: Option<NaiveDate>,
    pub page: u32,
    pub mime_type: String,
    #[serde(serialize_with = "as_base64")]
    pub image: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartReport {
    pub charts: Vec<Chart>,
}

fn as_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

/// Output of one extraction capability
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    PlattsPrices(PlattsPrices),
    FastmarketsPrices(FastmarketsPrices),
    BalticPrices(BalticPrices),
    Inventory(MysteelInventory),
    News(MarketNews),
    Charts(ChartReport),
}

impl TaskOutput {
    /// Parse the service's JSON answer into the output type of `capability`.
    /// Chart analyses are paired with their images by the caller.
    pub fn from_json(capability: Capability, value: Value) -> serde_json::Result<Self> {
        Ok(match capability {
            Capability::PlattsPrices => TaskOutput::PlattsPrices(serde_json::from_value(value)?),
            Capability::FastmarketsPrices => {
                TaskOutput::FastmarketsPrices(serde_json::from_value(value)?)
            }
            Capability::BalticPrices => TaskOutput::BalticPrices(serde_json::from_value(value)?),
            Capability::MysteelInventory => TaskOutput::Inventory(serde_json::from_value(value)?),
            Capability::MarketNews => TaskOutput::News(serde_json::from_value(value)?),
            Capability::ChartAnalysis => {
                let analyses: ChartAnalyses = serde_json::from_value(value)?;
                TaskOutput::Charts(ChartReport {
                    charts: analyses
                        .charts
                        .into_iter()
                        .map(|a| Chart {
                            title: a.title,
                            description: a.description,
                            chart_date: a.chart_date,
                            page: 0,
                            mime_type: String::new(),
                            image: Vec::new(),
                        })
                        .collect(),
                })
            }
        })
    }

    /// Convert to a plain JSON tree: dates as ISO strings, bytes as base64.
    /// Never fails; a serialization problem becomes an `error` marker that
    /// the persistence step skips.
    pub fn normalize(&self) -> Value {
        let result = match self {
            TaskOutput::PlattsPrices(v) => serde_json::to_value(v),
            TaskOutput::FastmarketsPrices(v) => serde_json::to_value(v),
            TaskOutput::BalticPrices(v) => serde_json::to_value(v),
            TaskOutput::Inventory(v) => serde_json::to_value(v),
            TaskOutput::News(v) => serde_json::to_value(v),
            TaskOutput::Charts(v) => serde_json::to_value(v),
        };

        result.unwrap_or_else(|e| {
            warn!("Failed to normalize task output: {}", e);
            json!({ "error": e.to_string() })
        })
    }
}

/// Sum of the lengths of the array-valued top-level fields
pub fn count_items(normalized: &Value) -> i64 {
    normalized
        .as_object()
        .map(|map| {
            map.values()
                .filter_map(Value::as_array)
                .map(|items| items.len() as i64)
                .sum()
        })
        .unwrap_or(0)
}

/// True when the normalized value carries nothing worth persisting.
///
/// An object counts as empty when every field is empty, so `{"news": []}`
/// is as empty as `{}`.
pub fn is_empty_result(normalized: &Value) -> bool {
    match normalized {
        Value::Null => true,
        Value::Object(map) => map.values().all(is_empty_result),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn dated_value_schema() -> Value {
    json!({
        "type": ["object", "null"],
        "properties": {
            "value": { "type": "number" },
            "date": { "type": ["string", "null"], "format": "date" }
        },
        "required": ["value"]
    })
}

fn optional_values_schema(fields: &[&str]) -> Value {
    let properties: Map<String, Value> = fields
        .iter()
        .map(|name| (name.to_string(), dated_value_schema()))
        .collect();
    json!({ "type": "object", "properties": properties })
}

/// JSON schema sent as `response_format` for a capability
pub fn response_schema(capability: Capability) -> Value {
    match capability {
        Capability::PlattsPrices => {
            optional_values_schema(&["platts_62_cfr_china", "platts_65_cfr_china", "iomgd00"])
        }
        Capability::FastmarketsPrices => {
            optional_values_schema(&["mb_iro_0009", "mb_iro_0019_viu"])
        }
        Capability::BalticPrices => optional_values_schema(&["c3_tubarao_qingdao"]),
        Capability::MysteelInventory => optional_values_schema(&[
            "pellet",
            "concentrate",
            "lump",
            "fines",
            "australian_iron_ore",
            "brazilian_iron_ore",
        ]),
        Capability::MarketNews => json!({
            "type": "object",
            "properties": {
                "news": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "summary": { "type": "string" },
                            "sentiment": { "type": "string", "enum": ["Positive", "Negative", "Neutral"] },
                            "date": { "type": ["string", "null"], "format": "date" },
                            "category": { "type": ["string", "null"] },
                            "tags": { "type": "array", "items": { "type": "string" } }
                        },
                        "required": ["title", "summary", "sentiment"]
                    }
                }
            },
            "required": ["news"]
        }),
        Capability::ChartAnalysis => json!({
            "type": "object",
            "properties": {
                "charts": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "description": { "type": "string" },
                            "chart_date": { "type": ["string", "null"], "format": "date" }
                        },
                        "required": ["title", "description"]
                    }
                }
            },
            "required": ["charts"]
        }),
    }
}

/// JSON schema for document classification
pub fn classification_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "source": {
                "type": "string",
                "enum": ["Mysteel", "FastMarkets", "Platts", "Baltic", "Other"]
            },
            "date": { "type": "string", "format": "date" }
        },
        "required": ["source", "date"]
    })
}

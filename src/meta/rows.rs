//! Typed rows built from normalized task results.
//!
//! Building rows is backend-independent; the backends only bind and insert
//! them. The document date fills in for any row without its own date.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::warn;

const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_UNIT: &str = "ton";

/// Identity shared by every row persisted for one document
#[derive(Debug, Clone)]
pub struct RowContext {
    pub document_id: i64,
    pub source: String,
    pub document_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub price_type: String,
    pub value: f64,
    pub date: NaiveDate,
    pub currency: String,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryRow {
    pub inventory_type: String,
    pub value: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewsRow {
    pub title: String,
    pub summary: String,
    pub sentiment: String,
    pub date: NaiveDate,
    pub category: Option<String>,
    pub tags_json: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartRow {
    pub title: String,
    pub page: i64,
    pub mime_type: String,
    pub image: Vec<u8>,
    pub description: String,
    pub date: NaiveDate,
}

fn parse_date(value: Option<&Value>) -> Option<NaiveDate> {
    value
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn string_field(item: &Value, key: &str) -> Option<String> {
    item.get(key).and_then(Value::as_str).map(str::to_string)
}

/// `(key, value, date)` for every top-level entry shaped like a dated value
fn dated_values(normalized: &Value, fallback: NaiveDate) -> Vec<(String, &Value, f64, NaiveDate)> {
    let Some(map) = normalized.as_object() else {
        return Vec::new();
    };

    map.iter()
        .filter_map(|(key, entry)| {
            let value = entry.get("value")?.as_f64()?;
            let date = parse_date(entry.get("date")).unwrap_or(fallback);
            Some((key.clone(), entry, value, date))
        })
        .collect()
}

pub fn price_rows(normalized: &Value, fallback: NaiveDate) -> Vec<PriceRow> {
    dated_values(normalized, fallback)
        .into_iter()
        .map(|(price_type, entry, value, date)| PriceRow {
            price_type,
            value,
            date,
            currency: string_field(entry, "currency")
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            unit: string_field(entry, "unit").unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        })
        .collect()
}

pub fn inventory_rows(normalized: &Value, fallback: NaiveDate) -> Vec<InventoryRow> {
    dated_values(normalized, fallback)
        .into_iter()
        .map(|(inventory_type, _, value, date)| InventoryRow {
            inventory_type,
            value,
            date,
        })
        .collect()
}

fn items<'a>(normalized: &'a Value, key: &str) -> &'a [Value] {
    normalized
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub fn news_rows(normalized: &Value, fallback: NaiveDate) -> Vec<NewsRow> {
    items(normalized, "news")
        .iter()
        .filter_map(|item| {
            Some(NewsRow {
                title: string_field(item, "title")?,
                summary: string_field(item, "summary").unwrap_or_default(),
                sentiment: string_field(item, "sentiment").unwrap_or_default(),
                date: parse_date(item.get("date")).unwrap_or(fallback),
                category: string_field(item, "category"),
                tags_json: item
                    .get("tags")
                    .filter(|tags| tags.as_array().is_some_and(|t| !t.is_empty()))
                    .map(Value::to_string),
            })
        })
        .collect()
}

pub fn chart_rows(normalized: &Value, fallback: NaiveDate) -> Vec<ChartRow> {
    items(normalized, "charts")
        .iter()
        .filter_map(|item| {
            let title = string_field(item, "title")?;
            let image = match item.get("image").and_then(Value::as_str) {
                Some(encoded) => match STANDARD.decode(encoded) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("Skipping chart '{}': invalid image encoding: {}", title, e);
                        return None;
                    }
                },
                None => Vec::new(),
            };
            Some(ChartRow {
                page: item.get("page").and_then(Value::as_i64).unwrap_or(0),
                mime_type: string_field(item, "mime_type").unwrap_or_default(),
                image,
                description: string_field(item, "description").unwrap_or_default(),
                date: parse_date(item.get("chart_date")).unwrap_or(fallback),
                title,
            })
        })
        .collect()
}

//! Static task registry
//!
//! Each entry binds a typed task id to the source it applies to, the
//! retrieval queries that build its context, the extraction capability it
//! calls and the record-store handler its result goes to.

use crate::error::{Error, Result};
use crate::extract::Capability;
use crate::models::Source;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskId {
    GetMysteelInventory,
    GetMysteelNews,
    GetMysteelGraphs,
    GetPlattsPrices,
    GetFastmarketsPrices,
    GetBalticPrices,
}

impl TaskId {
    pub const ALL: [TaskId; 6] = [
        TaskId::GetMysteelInventory,
        TaskId::GetMysteelNews,
        TaskId::GetMysteelGraphs,
        TaskId::GetPlattsPrices,
        TaskId::GetFastmarketsPrices,
        TaskId::GetBalticPrices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskId::GetMysteelInventory => "get_mysteel_inventory",
            TaskId::GetMysteelNews => "get_mysteel_news",
            TaskId::GetMysteelGraphs => "get_mysteel_graphs",
            TaskId::GetPlattsPrices => "get_platts_prices",
            TaskId::GetFastmarketsPrices => "get_fastmarkets_prices",
            TaskId::GetBalticPrices => "get_baltic_prices",
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TaskId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| Error::UnknownTask(s.to_string()))
    }
}

/// Record-store handler a task's result is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistKind {
    Prices,
    Inventory,
    News,
    Charts,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskDefinition {
    pub id: TaskId,
    pub source: Source,
    pub queries: &'static [&'static str],
    pub capability: Capability,
    /// Reads the raw document instead of retrieved chunks
    pub needs_document: bool,
    pub persist: PersistKind,
}

const MYSTEEL_INVENTORY_QUERIES: &[&str] = &[
    "Table of iron ore inventories",
    "Iron Ore Inventories",
    "Pellet inventory",
    "Concentrate inventory",
    "Lump inventory",
    "Fines inventory",
    "Australian iron ore inventory",
    "Brazilian iron ore inventory",
];

const MYSTEEL_NEWS_QUERIES: &[&str] = &["news", "market commentary", "outlook"];

const PLATTS_PRICE_QUERIES: &[&str] = &[
    "Table or text with Iron Ore Platts 62% and 65% CFR China prices and their date",
    "Table or text with IOMGD00 prices and their date",
];

const FASTMARKETS_PRICE_QUERIES: &[&str] = &[
    "Table or text with Iron Ore MB-IRO-0009 and MB-IRO-0019 VIU prices and their publication date",
];

const BALTIC_PRICE_QUERIES: &[&str] =
    &["Table or text with the C3 Tubarao to Qingdao freight rate and its date"];

const STANDARD_TASKS: &[TaskDefinition] = &[
    TaskDefinition {
        id: TaskId::GetMysteelInventory,
        source: Source::Mysteel,
        queries: MYSTEEL_INVENTORY_QUERIES,
        capability: Capability::MysteelInventory,
        needs_document: false,
        persist: PersistKind::Inventory,
    },
    TaskDefinition {
        id: TaskId::GetMysteelNews,
        source: Source::Mysteel,
        queries: MYSTEEL_NEWS_QUERIES,
        capability: Capability::MarketNews,
        needs_document: false,
        persist: PersistKind::News,
    },
    TaskDefinition {
        id: TaskId::GetMysteelGraphs,
        source: Source::Mysteel,
        queries: &[],
        capability: Capability::ChartAnalysis,
        needs_document: true,
        persist: PersistKind::Charts,
    },
    TaskDefinition {
        id: TaskId::GetPlattsPrices,
        source: Source::Platts,
        queries: PLATTS_PRICE_QUERIES,
        capability: Capability::PlattsPrices,
        needs_document: false,
        persist: PersistKind::Prices,
    },
    TaskDefinition {
        id: TaskId::GetFastmarketsPrices,
        source: Source::FastMarkets,
        queries: FASTMARKETS_PRICE_QUERIES,
        capability: Capability::FastmarketsPrices,
        needs_document: false,
        persist: PersistKind::Prices,
    },
    TaskDefinition {
        id: TaskId::GetBalticPrices,
        source: Source::Baltic,
        queries: BALTIC_PRICE_QUERIES,
        capability: Capability::BalticPrices,
        needs_document: false,
        persist: PersistKind::Prices,
    },
];

/// Immutable, ordered table of task definitions
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    tasks: Vec<TaskDefinition>,
}

impl TaskRegistry {
    /// The production task table
    pub fn standard() -> Self {
        Self::from_slice(STANDARD_TASKS)
    }

    pub fn from_slice(tasks: &[TaskDefinition]) -> Self {
        Self {
            tasks: tasks.to_vec(),
        }
    }

    pub fn all(&self) -> &[TaskDefinition] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Tasks with affinity to `source`, in declaration order
    pub fn tasks_for(&self, source: Source) -> Vec<&TaskDefinition> {
        self.tasks.iter().filter(|t| t.source == source).collect()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

use common::{AggregateId, ItemId};
use serde::{Deserialize, Serialize};

/// Current materialized view of one inventory item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InventoryItem {
    pub aggregate_id: AggregateId,
    pub id: ItemId,
    pub item: String,
    /// No lower bound is enforced; negative stock is representable.
    pub quantity: i32,
}

impl InventoryItem {
    pub fn new(
        aggregate_id: AggregateId,
        id: ItemId,
        item: impl Into<String>,
        quantity: i32,
    ) -> Self {
        Self {
            aggregate_id,
            id,
            item: item.into(),
            quantity,
        }
    }
}

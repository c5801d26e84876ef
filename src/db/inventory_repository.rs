use async_trait::async_trait;

use crate::models::inventory::{InventoryItem, InventorySearchQuery};

#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// Unfiltered listing shown to every caller.
    async fn list_featured(&self, limit: i64) -> Result<Vec<InventoryItem>, sqlx::Error>;
    async fn search(&self, query: &InventorySearchQuery)
        -> Result<Vec<InventoryItem>, sqlx::Error>;
}

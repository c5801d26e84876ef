use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    db::inventory_repository::InventoryRepository,
    models::inventory::{InventoryItem, InventorySearchQuery},
};

pub struct PostgresInventoryRepository {
    pub pool: PgPool,
}

#[async_trait]
impl InventoryRepository for PostgresInventoryRepository {
    async fn list_featured(&self, limit: i64) -> Result<Vec<InventoryItem>, sqlx::Error> {
        sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT id, category, name, location, price_minor_units, capacity, description
            FROM inventory_items
            WHERE featured = true
            ORDER BY name
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn search(
        &self,
        query: &InventorySearchQuery,
    ) -> Result<Vec<InventoryItem>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, category, name, location, price_minor_units, capacity, description \
             FROM inventory_items WHERE true",
        );

        if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = format!("%{}%", q.replace('%', "\\%").replace('_', "\\_"));
            builder
                .push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(category) = query.category {
            builder.push(" AND category = ").push_bind(category);
        }
        if let Some(location) = query
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
        {
            builder
                .push(" AND lower(location) = lower(")
                .push_bind(location.to_string())
                .push(")");
        }
        if let Some(min) = query.min_price {
            builder.push(" AND price_minor_units >= ").push_bind(min);
        }
        if let Some(max) = query.max_price {
            builder.push(" AND price_minor_units <= ").push_bind(max);
        }
        if let Some(min) = query.min_capacity {
            builder.push(" AND capacity >= ").push_bind(min);
        }

        builder
            .push(" ORDER BY price_minor_units DESC, name LIMIT ")
            .push_bind(query.effective_limit());

        builder
            .build_query_as::<InventoryItem>()
            .fetch_all(&self.pool)
            .await
    }
}

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[sqlx(type_name = "inventory_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InventoryCategory {
    Jet,
    Yacht,
    Car,
    Helicopter,
}

#[derive(Debug, Clone, FromRow, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: Uuid,
    pub category: InventoryCategory,
    pub name: String,
    pub location: String,
    pub price_minor_units: i64,
    pub capacity: i32,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySearchQuery {
    pub q: Option<String>,
    pub category: Option<InventoryCategory>,
    pub location: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub min_capacity: Option<i32>,
    pub limit: Option<i64>,
}

pub const DEFAULT_SEARCH_LIMIT: i64 = 24;
pub const MAX_SEARCH_LIMIT: i64 = 100;

fn non_blank(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

impl InventorySearchQuery {
    /// True when anything narrows the result set beyond the default listing.
    pub fn has_filters(&self) -> bool {
        non_blank(&self.q)
            || self.category.is_some()
            || non_blank(&self.location)
            || self.min_price.is_some()
            || self.max_price.is_some()
            || self.min_capacity.is_some()
    }

    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT)
    }

    /// In-memory match used by repositories without a query engine.
    pub fn matches(&self, item: &InventoryItem) -> bool {
        if let Some(q) = self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let needle = q.to_lowercase();
            if !item.name.to_lowercase().contains(&needle)
                && !item.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if let Some(category) = self.category {
            if item.category != category {
                return false;
            }
        }
        if let Some(location) = self
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
        {
            if !item.location.eq_ignore_ascii_case(location) {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| item.price_minor_units < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| item.price_minor_units > max) {
            return false;
        }
        if self.min_capacity.is_some_and(|min| item.capacity < min) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yacht() -> InventoryItem {
        InventoryItem {
            id: Uuid::new_v4(),
            category: InventoryCategory::Yacht,
            name: "Azure Horizon".into(),
            location: "Monaco".into(),
            price_minor_units: 4_500_000,
            capacity: 12,
            description: "Superyacht with helipad".into(),
        }
    }

    #[test]
    fn blank_values_are_not_filters() {
        let query = InventorySearchQuery {
            q: Some("   ".into()),
            location: Some(String::new()),
            ..Default::default()
        };
        assert!(!query.has_filters());
        assert!(InventorySearchQuery {
            min_capacity: Some(4),
            ..Default::default()
        }
        .has_filters());
    }

    #[test]
    fn matches_on_every_filter() {
        let item = yacht();
        let query = InventorySearchQuery {
            q: Some("helipad".into()),
            category: Some(InventoryCategory::Yacht),
            location: Some("monaco".into()),
            min_price: Some(1_000_000),
            max_price: Some(5_000_000),
            min_capacity: Some(10),
            limit: None,
        };
        assert!(query.matches(&item));

        let too_small = InventorySearchQuery {
            min_capacity: Some(20),
            ..Default::default()
        };
        assert!(!too_small.matches(&item));
    }

    #[test]
    fn limit_is_clamped() {
        let query = InventorySearchQuery {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(query.effective_limit(), MAX_SEARCH_LIMIT);
        assert_eq!(
            InventorySearchQuery::default().effective_limit(),
            DEFAULT_SEARCH_LIMIT
        );
    }
}

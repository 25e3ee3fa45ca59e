//! Grocery lists and items.
//!
//! The bot works against the user's most recently created list; the
//! derivation lives in one query here so the rule stays in one place.

use super::records::{GroceryItem, GroceryList};
use super::Store;
use chrono::{DateTime, Utc};
use dhikra_core::error::DhikraError;
use uuid::Uuid;

impl Store {
    /// The user's most recently created list, if any.
    pub async fn latest_grocery_list(
        &self,
        user_id: &str,
    ) -> Result<Option<GroceryList>, DhikraError> {
        let row: Option<(String, String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, user_id, name, created_at FROM grocery_lists \
             WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DhikraError::Store(format!("latest grocery list failed: {e}")))?;

        Ok(row.map(|(id, user_id, name, created_at)| GroceryList {
            id,
            user_id,
            name,
            created_at,
        }))
    }

    /// Create a grocery list.
    pub async fn create_grocery_list(
        &self,
        user_id: &str,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> Result<String, DhikraError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO grocery_lists (id, user_id, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(user_id)
            .bind(name)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| DhikraError::Store(format!("create grocery list failed: {e}")))?;
        Ok(id)
    }

    /// Add an item to a list.
    pub async fn add_grocery_item(
        &self,
        list_id: &str,
        name: &str,
        quantity: f64,
        unit: Option<&str>,
        added_via: &str,
    ) -> Result<String, DhikraError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO grocery_items (id, list_id, name, quantity, unit, is_checked, added_via) \
             VALUES (?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(list_id)
        .bind(name)
        .bind(quantity)
        .bind(unit)
        .bind(added_via)
        .execute(&self.pool)
        .await
        .map_err(|e| DhikraError::Store(format!("add grocery item failed: {e}")))?;
        Ok(id)
    }

    /// Check off every unchecked item whose name contains `needle`,
    /// case-insensitively. Returns how many items were checked; "milk"
    /// matches "Milk" and "milk 2%" but not "Bread".
    pub async fn check_grocery_items_matching(
        &self,
        list_id: &str,
        needle: &str,
    ) -> Result<u64, DhikraError> {
        let result = sqlx::query(
            "UPDATE grocery_items SET is_checked = 1 \
             WHERE list_id = ? AND is_checked = 0 \
             AND instr(lower(name), lower(?)) > 0",
        )
        .bind(list_id)
        .bind(needle)
        .execute(&self.pool)
        .await
        .map_err(|e| DhikraError::Store(format!("check grocery items failed: {e}")))?;
        Ok(result.rows_affected())
    }

    /// Items on a list, unchecked first, then by insertion order.
    pub async fn grocery_items_unchecked_first(
        &self,
        list_id: &str,
    ) -> Result<Vec<GroceryItem>, DhikraError> {
        let rows: Vec<(String, String, String, f64, Option<String>, bool, String)> =
            sqlx::query_as(
                "SELECT id, list_id, name, quantity, unit, is_checked, added_via \
                 FROM grocery_items WHERE list_id = ? \
                 ORDER BY is_checked ASC, created_at ASC, id ASC",
            )
            .bind(list_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DhikraError::Store(format!("grocery items failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(
                |(id, list_id, name, quantity, unit, is_checked, added_via)| GroceryItem {
                    id,
                    list_id,
                    name,
                    quantity,
                    unit,
                    is_checked,
                    added_via,
                },
            )
            .collect())
    }
}

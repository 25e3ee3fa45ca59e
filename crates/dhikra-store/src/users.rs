//! The verified phone-number → user mapping.

use super::records::UserRecord;
use super::Store;
use dhikra_core::error::DhikraError;
use uuid::Uuid;

impl Store {
    /// Resolve a sender phone to its verified user, if any.
    ///
    /// Unverified rows do not resolve: an unverified phone is treated the
    /// same as an unknown one.
    pub async fn find_user_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<UserRecord>, DhikraError> {
        let row: Option<(String, String, Option<String>, bool)> = sqlx::query_as(
            "SELECT id, phone, display_name, verified FROM users \
             WHERE phone = ? AND verified = 1",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DhikraError::Store(format!("find user failed: {e}")))?;

        Ok(row.map(|(id, phone, display_name, verified)| UserRecord {
            id,
            phone,
            display_name,
            verified,
        }))
    }

    /// Phone number for a user id, used when notifying about rows that
    /// carry no phone of their own (tasks, meetings).
    pub async fn user_phone(&self, user_id: &str) -> Result<Option<String>, DhikraError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT phone FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DhikraError::Store(format!("user phone lookup failed: {e}")))?;
        Ok(row.map(|(phone,)| phone))
    }

    /// Create a user. Used by onboarding tooling and tests.
    pub async fn create_user(
        &self,
        phone: &str,
        display_name: Option<&str>,
        verified: bool,
    ) -> Result<String, DhikraError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO users (id, phone, display_name, verified) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(phone)
            .bind(display_name)
            .bind(verified)
            .execute(&self.pool)
            .await
            .map_err(|e| DhikraError::Store(format!("create user failed: {e}")))?;
        Ok(id)
    }
}

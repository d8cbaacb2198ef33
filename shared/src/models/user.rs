//! Customer Model

use serde::{Deserialize, Serialize};

/// Customer, identified by phone number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct User {
    pub id: String,
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub created_at: i64,
}

impl User {
    /// Fill profile fields that are still empty.
    ///
    /// Existing values are never overwritten. Returns `true` when something
    /// changed.
    pub fn fill_missing(&mut self, name: Option<&str>, email: Option<&str>) -> bool {
        let mut changed = false;
        if self.name.is_none()
            && let Some(n) = name.filter(|n| !n.trim().is_empty())
        {
            self.name = Some(n.trim().to_string());
            changed = true;
        }
        if self.email.is_none()
            && let Some(e) = email.filter(|e| !e.trim().is_empty())
        {
            self.email = Some(e.trim().to_string());
            changed = true;
        }
        changed
    }
}

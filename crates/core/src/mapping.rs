use serde::{Deserialize, Serialize};

use super::category::CategoryId;

/// A categorization rule: transactions whose beneficiary or purpose contains
/// `pattern` (case-insensitive) belong to `category_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub id: String,
    pub pattern: String,
    pub category_id: CategoryId,
}

impl Mapping {
    pub fn new(id: impl Into<String>, pattern: &str, category_id: impl Into<CategoryId>) -> Self {
        Mapping {
            id: id.into(),
            pattern: pattern.to_string(),
            category_id: category_id.into(),
        }
    }

    /// Lower-cased pattern, or `None` for a blank pattern, which would
    /// otherwise match every transaction.
    pub fn needle(&self) -> Option<String> {
        if self.pattern.trim().is_empty() {
            return None;
        }
        Some(self.pattern.to_lowercase())
    }
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Id of the reserved category credits fall back to when no mapping matches.
pub const INCOME_CATEGORY_ID: &str = "cat-income";
/// Id of the reserved category for transfers between the user's own accounts.
pub const INTERNAL_CATEGORY_ID: &str = "cat-internal";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub String);

impl CategoryId {
    pub fn new(id: impl Into<String>) -> Self {
        CategoryId(id.into())
    }

    pub fn income() -> Self {
        CategoryId::new(INCOME_CATEGORY_ID)
    }

    pub fn internal() -> Self {
        CategoryId::new(INTERNAL_CATEGORY_ID)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_reserved(&self) -> bool {
        self.0 == INCOME_CATEGORY_ID || self.0 == INTERNAL_CATEGORY_ID
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CategoryId {
    fn from(s: &str) -> Self {
        CategoryId::new(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    /// Display colour as `#rrggbb`.
    pub color: String,
    /// Monthly budget. Stored and displayed, never consulted by categorization.
    pub budget: Decimal,
}

impl Category {
    pub fn new(id: impl Into<String>, name: &str, color: &str) -> Self {
        Category {
            id: CategoryId::new(id),
            name: name.to_string(),
            color: color.to_string(),
            budget: Decimal::ZERO,
        }
    }
}

pub const DEFAULT_CATEGORIES: &[(&str, &str, &str)] = &[
    (INCOME_CATEGORY_ID, "Income", "#22c55e"),
    (INTERNAL_CATEGORY_ID, "Internal transfers", "#94a3b8"),
];

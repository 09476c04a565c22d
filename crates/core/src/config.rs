use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::category::{CategoryId, INCOME_CATEGORY_ID, INTERNAL_CATEGORY_ID};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Everything categorization needs besides the mappings themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorizerConfig {
    /// The user's own account identifiers. A transaction mentioning any of
    /// them is an internal transfer.
    pub ignored_accounts: Vec<String>,
    pub income_category: CategoryId,
    pub internal_category: CategoryId,
}

impl Default for CategorizerConfig {
    fn default() -> Self {
        Self {
            ignored_accounts: Vec::new(),
            income_category: CategoryId::new(INCOME_CATEGORY_ID),
            internal_category: CategoryId::new(INTERNAL_CATEGORY_ID),
        }
    }
}

impl CategorizerConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Categories that must outlive every deletion: the built-in reserved
    /// ids plus whatever this config falls back to.
    pub fn is_protected(&self, id: &CategoryId) -> bool {
        id.is_reserved() || id == &self.income_category || id == &self.internal_category
    }

    /// Ignored identifiers lower-cased and trimmed, blanks dropped.
    pub fn normalized_ignored_accounts(&self) -> Vec<String> {
        self.ignored_accounts
            .iter()
            .map(|a| normalize_account(a))
            .filter(|a| !a.is_empty())
            .collect()
    }

    /// Adds identifiers not already present (compared after normalization).
    pub fn merge_ignored_accounts<I, S>(&mut self, accounts: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for account in accounts {
            let account = account.as_ref().trim();
            let key = normalize_account(account);
            if key.is_empty() {
                continue;
            }
            let known = self.ignored_accounts.iter().any(|a| normalize_account(a) == key);
            if !known {
                self.ignored_accounts.push(account.to_string());
            }
        }
    }
}

fn normalize_account(account: &str) -> String {
    account.trim().to_lowercase()
}

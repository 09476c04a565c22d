use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::category::CategoryId;
use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Debit,
    Credit,
}

impl TransactionType {
    /// Statement flag: `C` is a credit, anything else a debit.
    pub fn from_flag(flag: &str) -> Self {
        if flag.trim() == "C" {
            TransactionType::Credit
        } else {
            TransactionType::Debit
        }
    }

    pub fn as_flag(self) -> &'static str {
        match self {
            TransactionType::Debit => "D",
            TransactionType::Credit => "C",
        }
    }
}

/// Where a transaction stands with respect to categorization.
///
/// A transaction carries either one category or a conflict set, never both.
/// `Conflict` always holds at least two distinct ids; build it through
/// [`Assignment::conflict`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "categories", rename_all = "snake_case")]
pub enum Assignment {
    #[default]
    Unassigned,
    Category(CategoryId),
    Conflict(BTreeSet<CategoryId>),
}

impl Assignment {
    /// Collapses a candidate set: none → `Unassigned`, one → `Category`,
    /// several → `Conflict`.
    pub fn conflict(ids: impl IntoIterator<Item = CategoryId>) -> Self {
        let mut set: BTreeSet<CategoryId> = ids.into_iter().collect();
        match set.len() {
            0 => Assignment::Unassigned,
            1 => set
                .pop_first()
                .map(Assignment::Category)
                .unwrap_or_default(),
            _ => Assignment::Conflict(set),
        }
    }

    pub fn category_id(&self) -> Option<&CategoryId> {
        match self {
            Assignment::Category(id) => Some(id),
            _ => None,
        }
    }

    pub fn conflicts(&self) -> Option<&BTreeSet<CategoryId>> {
        match self {
            Assignment::Conflict(set) => Some(set),
            _ => None,
        }
    }

    /// True if the assignment names `id` as its category or in its conflict set.
    pub fn references(&self, id: &CategoryId) -> bool {
        match self {
            Assignment::Unassigned => false,
            Assignment::Category(c) => c == id,
            Assignment::Conflict(set) => set.contains(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub date: NaiveDate,
    pub amount: Money,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub beneficiary: String,
    pub purpose: String,
    #[serde(default)]
    pub assignment: Assignment,
    /// Source column name → verbatim value, kept for display and audit.
    #[serde(default)]
    pub original_row: BTreeMap<String, String>,
}

impl Transaction {
    pub fn category_id(&self) -> Option<&CategoryId> {
        self.assignment.category_id()
    }

    pub fn conflicts(&self) -> Option<&BTreeSet<CategoryId>> {
        self.assignment.conflicts()
    }

    pub fn is_credit(&self) -> bool {
        self.transaction_type == TransactionType::Credit
    }

    /// Manual pick by the user. Clears any conflict set; does not consult rules.
    pub fn resolve(&mut self, category: CategoryId) {
        self.assignment = Assignment::Category(category);
    }

    /// Beneficiary and purpose joined for substring checks.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.beneficiary, self.purpose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CategoryId {
        CategoryId::new(s)
    }

    fn sample() -> Transaction {
        Transaction {
            id: "tx-1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            amount: Money::parse("9.99").unwrap(),
            transaction_type: TransactionType::Debit,
            beneficiary: "NETFLIX".to_string(),
            purpose: "SUBSCRIPTION".to_string(),
            assignment: Assignment::Unassigned,
            original_row: BTreeMap::new(),
        }
    }

    #[test]
    fn flag_parsing() {
        assert_eq!(TransactionType::from_flag("C"), TransactionType::Credit);
        assert_eq!(TransactionType::from_flag(" C "), TransactionType::Credit);
        assert_eq!(TransactionType::from_flag("D"), TransactionType::Debit);
        assert_eq!(TransactionType::from_flag(""), TransactionType::Debit);
    }

    #[test]
    fn conflict_collapses_small_sets() {
        assert_eq!(Assignment::conflict(vec![]), Assignment::Unassigned);
        assert_eq!(
            Assignment::conflict(vec![id("a"), id("a")]),
            Assignment::Category(id("a"))
        );
        let a = Assignment::conflict(vec![id("b"), id("a"), id("b")]);
        assert_eq!(a.conflicts().map(|s| s.len()), Some(2));
        assert_eq!(a.category_id(), None);
    }

    #[test]
    fn conflict_equality_ignores_order() {
        assert_eq!(
            Assignment::conflict(vec![id("a"), id("b")]),
            Assignment::conflict(vec![id("b"), id("a")])
        );
    }

    #[test]
    fn resolve_clears_conflicts() {
        let mut tx = sample();
        tx.assignment = Assignment::conflict(vec![id("a"), id("b")]);
        tx.resolve(id("c"));
        assert_eq!(tx.category_id(), Some(&id("c")));
        assert!(tx.conflicts().is_none());
    }

    #[test]
    fn references_checks_category_and_conflicts() {
        assert!(Assignment::Category(id("a")).references(&id("a")));
        assert!(Assignment::conflict(vec![id("a"), id("b")]).references(&id("b")));
        assert!(!Assignment::Unassigned.references(&id("a")));
    }

    #[test]
    fn search_text_joins_fields() {
        assert_eq!(sample().search_text(), "NETFLIX SUBSCRIPTION");
    }
}

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use thiserror::Error;

use super::category::{Category, CategoryId};
use super::config::CategorizerConfig;
use super::mapping::Mapping;
use super::transaction::{Assignment, Transaction};

#[derive(Debug, Clone, Error)]
pub enum IntegrityError {
    #[error("Category not found: {0}")]
    CategoryNotFound(CategoryId),
    #[error("Category {0} is reserved and cannot be deleted")]
    ReservedCategory(CategoryId),
    #[error("Integrity violated: {}", format_violations(.0))]
    Violated(Vec<Violation>),
}

/// A single broken reference or malformed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    DanglingTransactionCategory { transaction_id: String, category_id: CategoryId },
    DanglingConflictCategory { transaction_id: String, category_id: CategoryId },
    UndersizedConflict { transaction_id: String },
    DanglingMappingCategory { mapping_id: String, category_id: CategoryId },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DanglingTransactionCategory { transaction_id, category_id } => {
                write!(f, "transaction {transaction_id} references missing category {category_id}")
            }
            Violation::DanglingConflictCategory { transaction_id, category_id } => write!(
                f,
                "transaction {transaction_id} lists missing category {category_id} as a conflict"
            ),
            Violation::UndersizedConflict { transaction_id } => {
                write!(f, "transaction {transaction_id} has a conflict set with fewer than two categories")
            }
            Violation::DanglingMappingCategory { mapping_id, category_id } => {
                write!(f, "mapping {mapping_id} references missing category {category_id}")
            }
        }
    }
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The dependent-record changes required to delete one category.
///
/// Built from a consistent snapshot and applied in full or not at all. The
/// store executes the steps; it does not need to know why they are needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadePlan {
    pub category: CategoryId,
    /// Transaction id → assignment after the deletion. Transactions that
    /// pointed at the category become unassigned; conflict sets lose the
    /// category and collapse to unassigned if fewer than two ids remain.
    pub transaction_updates: Vec<(String, Assignment)>,
    pub removed_mappings: Vec<String>,
}

impl CascadePlan {
    /// Fails for unknown ids and for anything
    /// [`CategorizerConfig::is_protected`] covers.
    pub fn for_category(
        category: &CategoryId,
        config: &CategorizerConfig,
        categories: &[Category],
        transactions: &[Transaction],
        mappings: &[Mapping],
    ) -> Result<Self, IntegrityError> {
        if config.is_protected(category) {
            return Err(IntegrityError::ReservedCategory(category.clone()));
        }
        if !categories.iter().any(|c| &c.id == category) {
            return Err(IntegrityError::CategoryNotFound(category.clone()));
        }

        let transaction_updates = transactions
            .iter()
            .filter(|tx| tx.assignment.references(category))
            .map(|tx| (tx.id.clone(), without_category(&tx.assignment, category)))
            .collect();

        let removed_mappings = mappings
            .iter()
            .filter(|m| &m.category_id == category)
            .map(|m| m.id.clone())
            .collect();

        Ok(CascadePlan {
            category: category.clone(),
            transaction_updates,
            removed_mappings,
        })
    }

    /// Post-condition: nothing references the deleted category any more.
    pub fn verify(&self, transactions: &[Transaction], mappings: &[Mapping]) -> Result<(), IntegrityError> {
        let mut violations = Vec::new();
        for tx in transactions {
            match &tx.assignment {
                Assignment::Category(id) if id == &self.category => {
                    violations.push(Violation::DanglingTransactionCategory {
                        transaction_id: tx.id.clone(),
                        category_id: id.clone(),
                    });
                }
                Assignment::Conflict(set) if set.contains(&self.category) => {
                    violations.push(Violation::DanglingConflictCategory {
                        transaction_id: tx.id.clone(),
                        category_id: self.category.clone(),
                    });
                }
                _ => {}
            }
        }
        for m in mappings.iter().filter(|m| m.category_id == self.category) {
            violations.push(Violation::DanglingMappingCategory {
                mapping_id: m.id.clone(),
                category_id: m.category_id.clone(),
            });
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(IntegrityError::Violated(violations))
        }
    }
}

fn without_category(assignment: &Assignment, category: &CategoryId) -> Assignment {
    match assignment {
        Assignment::Conflict(set) => {
            let rest: BTreeSet<CategoryId> = set.iter().filter(|id| *id != category).cloned().collect();
            if rest.len() >= 2 {
                Assignment::Conflict(rest)
            } else {
                Assignment::Unassigned
            }
        }
        _ => Assignment::Unassigned,
    }
}

/// Checks all three reference invariants across the whole data set.
pub fn check_invariants(
    categories: &[Category],
    transactions: &[Transaction],
    mappings: &[Mapping],
) -> Vec<Violation> {
    let known: HashSet<&CategoryId> = categories.iter().map(|c| &c.id).collect();
    let mut violations = Vec::new();

    for tx in transactions {
        match &tx.assignment {
            Assignment::Unassigned => {}
            Assignment::Category(id) => {
                if !known.contains(id) {
                    violations.push(Violation::DanglingTransactionCategory {
                        transaction_id: tx.id.clone(),
                        category_id: id.clone(),
                    });
                }
            }
            Assignment::Conflict(set) => {
                if set.len() < 2 {
                    violations.push(Violation::UndersizedConflict {
                        transaction_id: tx.id.clone(),
                    });
                }
                for id in set.iter().filter(|id| !known.contains(id)) {
                    violations.push(Violation::DanglingConflictCategory {
                        transaction_id: tx.id.clone(),
                        category_id: id.clone(),
                    });
                }
            }
        }
    }

    for m in mappings {
        if !known.contains(&m.category_id) {
            violations.push(Violation::DanglingMappingCategory {
                mapping_id: m.id.clone(),
                category_id: m.category_id.clone(),
            });
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::transaction::TransactionType;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn cid(s: &str) -> CategoryId {
        CategoryId::new(s)
    }

    fn plan_for(id: &str, config: &CategorizerConfig) -> Result<CascadePlan, IntegrityError> {
        let (categories, transactions, mappings) = fixture();
        CascadePlan::for_category(&cid(id), config, &categories, &transactions, &mappings)
    }

    fn after(plan: &CascadePlan) -> (Vec<Category>, Vec<Transaction>, Vec<Mapping>) {
        let (mut categories, mut transactions, mut mappings) = fixture();
        categories.retain(|c| c.id != plan.category);
        for t in transactions.iter_mut() {
            if let Some((_, a)) = plan.transaction_updates.iter().find(|(id, _)| id == &t.id) {
                t.assignment = a.clone();
            }
        }
        mappings.retain(|m| !plan.removed_mappings.contains(&m.id));
        (categories, transactions, mappings)
    }

    fn tx(id: &str, assignment: Assignment) -> Transaction {
        Transaction {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            amount: Money::parse("10").unwrap(),
            transaction_type: TransactionType::Debit,
            beneficiary: String::new(),
            purpose: String::new(),
            assignment,
            original_row: BTreeMap::new(),
        }
    }

    fn fixture() -> (Vec<Category>, Vec<Transaction>, Vec<Mapping>) {
        let categories = vec![
            Category::new("cat-income", "Income", "#000000"),
            Category::new("cat-food", "Food", "#111111"),
            Category::new("cat-fun", "Fun", "#222222"),
            Category::new("cat-car", "Car", "#333333"),
        ];
        let transactions = vec![
            tx("t1", Assignment::Category(cid("cat-food"))),
            tx("t2", Assignment::Category(cid("cat-fun"))),
            tx("t3", Assignment::conflict(vec![cid("cat-food"), cid("cat-fun")])),
            tx("t4", Assignment::conflict(vec![cid("cat-food"), cid("cat-fun"), cid("cat-car")])),
            tx("t5", Assignment::Unassigned),
        ];
        let mappings = vec![
            Mapping::new("m1", "RIMI", "cat-food"),
            Mapping::new("m2", "MAXIMA", "cat-food"),
            Mapping::new("m3", "CINEMA", "cat-fun"),
        ];
        (categories, transactions, mappings)
    }

    #[test]
    fn plan_lists_every_dependent_record() {
        let plan = plan_for("cat-food", &CategorizerConfig::default()).unwrap();
        let ids: Vec<&str> = plan.transaction_updates.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t3", "t4"]);
        assert_eq!(plan.removed_mappings, vec!["m1".to_string(), "m2".to_string()]);
    }

    #[test]
    fn cascade_leaves_no_references() {
        let plan = plan_for("cat-food", &CategorizerConfig::default()).unwrap();
        let (categories, transactions, mappings) = after(&plan);

        plan.verify(&transactions, &mappings).unwrap();
        assert!(categories.iter().all(|c| c.id != cid("cat-food")));
        assert!(transactions.iter().all(|t| !t.assignment.references(&cid("cat-food"))));
        assert!(check_invariants(&categories, &transactions, &mappings).is_empty());
    }

    #[test]
    fn cascade_clears_without_re_resolving() {
        let plan = plan_for("cat-food", &CategorizerConfig::default()).unwrap();
        let (_, transactions, mappings) = after(&plan);

        assert_eq!(transactions[0].assignment, Assignment::Unassigned);
        // Two-way conflict loses a side: nothing left to pick automatically.
        assert_eq!(transactions[2].assignment, Assignment::Unassigned);
        assert_eq!(
            transactions[3].assignment,
            Assignment::conflict(vec![cid("cat-fun"), cid("cat-car")])
        );
        assert_eq!(transactions[1].assignment, Assignment::Category(cid("cat-fun")));
        assert_eq!(mappings.len(), 1);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let err = plan_for("nope", &CategorizerConfig::default()).unwrap_err();
        assert!(matches!(err, IntegrityError::CategoryNotFound(_)));
    }

    #[test]
    fn reserved_category_is_protected() {
        let err = plan_for("cat-income", &CategorizerConfig::default()).unwrap_err();
        assert!(matches!(err, IntegrityError::ReservedCategory(_)));
    }

    #[test]
    fn configured_income_category_is_protected() {
        let config = CategorizerConfig {
            income_category: cid("cat-car"),
            ..Default::default()
        };
        let err = plan_for("cat-car", &config).unwrap_err();
        assert!(matches!(err, IntegrityError::ReservedCategory(id) if id == cid("cat-car")));
        assert!(plan_for("cat-car", &CategorizerConfig::default()).is_ok());
    }

    #[test]
    fn verify_reports_leftovers() {
        let (_, transactions, mappings) = fixture();
        let plan = plan_for("cat-fun", &CategorizerConfig::default()).unwrap();
        let err = plan.verify(&transactions, &mappings).unwrap_err();
        match err {
            IntegrityError::Violated(v) => assert_eq!(v.len(), 4),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn check_invariants_finds_dangling_and_undersized() {
        let (categories, _, _) = fixture();
        let mut single = BTreeSet::new();
        single.insert(cid("cat-food"));
        let transactions = vec![
            tx("a", Assignment::Category(cid("gone"))),
            tx("b", Assignment::Conflict(single)),
        ];
        let mappings = vec![Mapping::new("m", "X", "gone")];
        let v = check_invariants(&categories, &transactions, &mappings);
        assert_eq!(v.len(), 3);
        assert!(v.contains(&Violation::UndersizedConflict { transaction_id: "b".into() }));
    }
}

use spendmap_core::{Assignment, CategorizerConfig, CategoryId, Mapping, Transaction};
use std::collections::BTreeSet;

/// Result of evaluating one transaction against the rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Beneficiary or purpose names one of the user's own accounts.
    Internal(CategoryId),
    Single(CategoryId),
    /// Two or more distinct categories matched.
    Conflict(BTreeSet<CategoryId>),
    NoMatch,
}

/// Mapping with its pattern lower-cased once up front.
struct CompiledMapping {
    needle: String,
    category_id: CategoryId,
}

pub struct MappingMatcher {
    mappings: Vec<CompiledMapping>,
    ignored_accounts: Vec<String>,
    internal_category: CategoryId,
    income_category: CategoryId,
}

impl MappingMatcher {
    pub fn new(mappings: &[Mapping], config: &CategorizerConfig) -> Self {
        let compiled = mappings
            .iter()
            .filter_map(|m| {
                m.needle().map(|needle| CompiledMapping {
                    needle,
                    category_id: m.category_id.clone(),
                })
            })
            .collect();
        Self {
            mappings: compiled,
            ignored_accounts: config.normalized_ignored_accounts(),
            internal_category: config.internal_category.clone(),
            income_category: config.income_category.clone(),
        }
    }

    /// Internal-transfer check first, then every mapping. The outcome does
    /// not depend on mapping order.
    pub fn match_transaction(&self, tx: &Transaction) -> MatchOutcome {
        let haystack = tx.search_text().to_lowercase();
        if self.ignored_accounts.iter().any(|a| haystack.contains(a.as_str())) {
            return MatchOutcome::Internal(self.internal_category.clone());
        }

        let beneficiary = tx.beneficiary.to_lowercase();
        let purpose = tx.purpose.to_lowercase();
        let mut matched: BTreeSet<CategoryId> = self
            .mappings
            .iter()
            .filter(|m| beneficiary.contains(&m.needle) || purpose.contains(&m.needle))
            .map(|m| m.category_id.clone())
            .collect();

        match matched.len() {
            0 => MatchOutcome::NoMatch,
            1 => matched
                .pop_first()
                .map(MatchOutcome::Single)
                .unwrap_or(MatchOutcome::NoMatch),
            _ => MatchOutcome::Conflict(matched),
        }
    }

    /// Turns an outcome into the assignment a transaction should carry,
    /// applying the no-match fallback: credits go to income, debits stay
    /// unassigned.
    pub fn assignment_for(&self, tx: &Transaction, outcome: MatchOutcome) -> Assignment {
        match outcome {
            MatchOutcome::Internal(id) | MatchOutcome::Single(id) => Assignment::Category(id),
            MatchOutcome::Conflict(ids) => Assignment::conflict(ids),
            MatchOutcome::NoMatch if tx.is_credit() => Assignment::Category(self.income_category.clone()),
            MatchOutcome::NoMatch => Assignment::Unassigned,
        }
    }

    /// Rule-derived assignment for `tx`, fallback included.
    pub fn categorize(&self, tx: &Transaction) -> Assignment {
        let outcome = self.match_transaction(tx);
        self.assignment_for(tx, outcome)
    }

    /// Import-time categorization: fills in transactions that are not stored
    /// yet and leaves the rest alone. `is_known` reports whether an id is
    /// already persisted.
    pub fn categorize_new<F>(&self, transactions: &mut [Transaction], is_known: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut categorized = 0;
        for tx in transactions.iter_mut().filter(|tx| !is_known(&tx.id)) {
            tx.assignment = self.categorize(tx);
            categorized += 1;
        }
        categorized
    }
}

use spendmap_core::{CategorizerConfig, Mapping, Transaction};
use std::collections::HashSet;

use crate::rules::MappingMatcher;

#[derive(Debug, Clone, Default)]
pub struct RecomputeOutcome {
    /// Every input transaction, in input order, carrying its recomputed
    /// assignment.
    pub transactions: Vec<Transaction>,
    /// Ids whose assignment differs from what was stored.
    pub changed_ids: HashSet<String>,
}

impl RecomputeOutcome {
    pub fn change_count(&self) -> usize {
        self.changed_ids.len()
    }

    /// Only the transactions that need to be written back.
    pub fn changed(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions
            .iter()
            .filter(|tx| self.changed_ids.contains(&tx.id))
    }
}

/// Re-derives every transaction's category from the rules alone.
///
/// Strict overwrite: a manual choice that no current rule produces is
/// replaced, credits without a match go to income, and debits without a
/// match end up unassigned. Callers must obtain the user's confirmation
/// before persisting the result.
pub fn reapply(
    transactions: Vec<Transaction>,
    mappings: &[Mapping],
    config: &CategorizerConfig,
) -> RecomputeOutcome {
    let matcher = MappingMatcher::new(mappings, config);
    let mut changed_ids = HashSet::new();

    let transactions = transactions
        .into_iter()
        .map(|mut tx| {
            let assignment = matcher.categorize(&tx);
            if assignment != tx.assignment {
                changed_ids.insert(tx.id.clone());
                tx.assignment = assignment;
            }
            tx
        })
        .collect();

    RecomputeOutcome {
        transactions,
        changed_ids,
    }
}

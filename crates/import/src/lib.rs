pub mod interchange;
pub mod recompute;
pub mod rules;
pub mod statement;

pub use interchange::{InterchangeError, RuleMerge, RuleRecord};
pub use recompute::RecomputeOutcome;
pub use rules::{MappingMatcher, MatchOutcome};
pub use statement::{
    NormalizedStatement, RowError, RowErrorKind, StatementError, StatementNormalizer,
    StatementProfile,
};

pub mod import {
    use crate::*;
    use spendmap_core::{CategorizerConfig, Mapping, Transaction};

    pub fn import_statement<R: std::io::Read>(
        data: R,
        profile: &StatementProfile,
    ) -> Result<NormalizedStatement, StatementError> {
        crate::statement::normalize(data, profile)
    }

    pub fn create_matcher(mappings: &[Mapping], config: &CategorizerConfig) -> MappingMatcher {
        MappingMatcher::new(mappings, config)
    }

    pub fn reapply_rules(
        transactions: Vec<Transaction>,
        mappings: &[Mapping],
        config: &CategorizerConfig,
    ) -> RecomputeOutcome {
        crate::recompute::reapply(transactions, mappings, config)
    }
}

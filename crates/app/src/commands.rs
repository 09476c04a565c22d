use anyhow::{Context, Result};
use spendmap_core::{
    check_invariants, Assignment, CategorizerConfig, Category, CategoryId, Mapping, Violation,
};
use spendmap_import::import as pipeline;
use spendmap_import::{interchange, RowError, StatementProfile};
use spendmap_storage::{self as storage, CascadeReport, DbPool};
use std::io::Read;

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub parsed: usize,
    pub imported: usize,
    /// Rows whose id is already stored. Their stored state is left as is.
    pub duplicates: usize,
    pub skipped: usize,
    pub conflicts: usize,
    pub unassigned: usize,
    pub errors: Vec<RowError>,
}

/// Normalizes a statement, categorizes the transactions not seen before and
/// stores them.
pub async fn import_statement<R: Read>(
    db: &DbPool,
    data: R,
    profile: &StatementProfile,
    config: &CategorizerConfig,
) -> Result<ImportSummary> {
    let statement = pipeline::import_statement(data, profile).context("Failed to read statement")?;
    let known = storage::get_transaction_ids(db).await?;
    let mappings = storage::get_mappings(db).await?;
    let matcher = pipeline::create_matcher(&mappings, config);

    let mut transactions = statement.transactions;
    let parsed = transactions.len();
    matcher.categorize_new(&mut transactions, |id| known.contains(id));
    let fresh: Vec<_> = transactions
        .into_iter()
        .filter(|tx| !known.contains(&tx.id))
        .collect();

    storage::save_transactions(db, &fresh).await?;

    let summary = ImportSummary {
        parsed,
        imported: fresh.len(),
        duplicates: parsed - fresh.len(),
        skipped: statement.skipped,
        conflicts: fresh
            .iter()
            .filter(|tx| matches!(tx.assignment, Assignment::Conflict(_)))
            .count(),
        unassigned: fresh
            .iter()
            .filter(|tx| tx.assignment == Assignment::Unassigned)
            .count(),
        errors: statement.errors,
    };
    tracing::info!(
        imported = summary.imported,
        duplicates = summary.duplicates,
        errors = summary.errors.len(),
        "statement imported"
    );
    Ok(summary)
}

/// Strict recompute over every stored transaction. Returns the number of
/// transactions whose assignment changed.
pub async fn reapply_rules(db: &DbPool, config: &CategorizerConfig) -> Result<usize> {
    let transactions = storage::get_all_transactions(db).await?;
    let mappings = storage::get_mappings(db).await?;
    let outcome = pipeline::reapply_rules(transactions, &mappings, config);

    let changed: Vec<_> = outcome.changed().cloned().collect();
    storage::save_transactions(db, &changed).await?;

    tracing::info!(changed = outcome.change_count(), "rules reapplied");
    Ok(outcome.change_count())
}

pub async fn add_category(db: &DbPool, id: Option<String>, name: &str, color: &str) -> Result<Category> {
    let id = id.unwrap_or_else(|| format!("cat-{}", uuid::Uuid::new_v4()));
    let category = Category::new(id, name, color);
    storage::add_category(db, &category)
        .await
        .with_context(|| format!("Failed to add category {}", category.id))?;
    Ok(category)
}

pub async fn delete_category(db: &DbPool, id: &str, config: &CategorizerConfig) -> Result<CascadeReport> {
    Ok(storage::delete_category(db, &CategoryId::new(id), config).await?)
}

pub async fn add_mapping(db: &DbPool, pattern: &str, category_id: &str) -> Result<Mapping> {
    let mapping = Mapping::new(uuid::Uuid::new_v4().to_string(), pattern, category_id);
    storage::add_mapping(db, &mapping).await?;
    Ok(mapping)
}

pub async fn resolve(db: &DbPool, transaction_id: &str, category_id: &str) -> Result<()> {
    storage::resolve_transaction(db, transaction_id, &CategoryId::new(category_id)).await?;
    Ok(())
}

pub async fn export_rules(db: &DbPool) -> Result<String> {
    let mappings = storage::get_mappings(db).await?;
    Ok(interchange::export_rules(&mappings)?)
}

#[derive(Debug, Default)]
pub struct RuleImportSummary {
    pub added: usize,
    pub skipped_existing: usize,
    pub skipped_unknown_category: usize,
}

/// Merges a rules file into the stored mappings. A malformed file aborts
/// before anything is written.
pub async fn import_rules(db: &DbPool, json: &str) -> Result<RuleImportSummary> {
    let incoming = interchange::parse_rules(json).context("Rules import aborted")?;
    let existing = storage::get_mappings(db).await?;
    let categories = storage::get_categories(db).await?;
    let merge = interchange::merge_rules(&existing, &categories, incoming);

    storage::add_mappings(db, &merge.added).await?;

    Ok(RuleImportSummary {
        added: merge.added.len(),
        skipped_existing: merge.skipped_existing.len(),
        skipped_unknown_category: merge.skipped_unknown_category.len(),
    })
}

pub async fn ignore_account(db: &DbPool, account: &str) -> Result<Vec<String>> {
    let mut config = CategorizerConfig {
        ignored_accounts: storage::get_ignored_accounts(db).await?,
        ..Default::default()
    };
    config.merge_ignored_accounts([account]);
    storage::set_ignored_accounts(db, &config.ignored_accounts).await?;
    Ok(config.ignored_accounts)
}

pub async fn check(db: &DbPool) -> Result<Vec<Violation>> {
    let categories = storage::get_categories(db).await?;
    let transactions = storage::get_all_transactions(db).await?;
    let mappings = storage::get_mappings(db).await?;
    Ok(check_invariants(&categories, &transactions, &mappings))
}

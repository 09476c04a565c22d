use spendmap_core::{CascadePlan, CategorizerConfig, CategoryId};
use sqlx::SqliteConnection;

use crate::db::{load_categories, load_mappings, load_transactions, update_assignment, DbPool};
use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    pub category: CategoryId,
    pub transactions_updated: usize,
    pub mappings_removed: usize,
}

/// Deletes a category together with everything that depends on it.
///
/// All steps run in one write transaction. Referencing transactions lose the
/// category (they are not re-resolved), referencing mappings are deleted, and
/// the result is re-checked before commit. On any failure the transaction is
/// rolled back and nothing is visible to readers. Categories the config
/// falls back to are refused.
pub async fn delete_category(
    pool: &DbPool,
    category: &CategoryId,
    config: &CategorizerConfig,
) -> Result<CascadeReport, StorageError> {
    let mut tx = pool.begin().await?;

    let plan = {
        let categories = load_categories(&mut tx).await?;
        let transactions = load_transactions(&mut tx).await?;
        let mappings = load_mappings(&mut tx).await?;
        CascadePlan::for_category(category, config, &categories, &transactions, &mappings)?
    };

    if let Err(e) = execute_plan(&mut tx, &plan).await {
        tracing::error!(category = %category, "category cascade failed, rolling back: {e}");
        tx.rollback().await?;
        return Err(StorageError::InconsistentCascade {
            category: category.clone(),
            reason: e.to_string(),
        });
    }

    tx.commit().await?;

    let report = CascadeReport {
        category: category.clone(),
        transactions_updated: plan.transaction_updates.len(),
        mappings_removed: plan.removed_mappings.len(),
    };
    tracing::info!(
        category = %report.category,
        transactions = report.transactions_updated,
        mappings = report.mappings_removed,
        "category deleted"
    );
    Ok(report)
}

async fn execute_plan(conn: &mut SqliteConnection, plan: &CascadePlan) -> Result<(), StorageError> {
    for (transaction_id, assignment) in &plan.transaction_updates {
        update_assignment(conn, transaction_id, assignment).await?;
    }

    for mapping_id in &plan.removed_mappings {
        sqlx::query("DELETE FROM mappings WHERE id = ?")
            .bind(mapping_id)
            .execute(&mut *conn)
            .await?;
    }

    // Last, so the foreign keys above never point at a missing row.
    let removed = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(plan.category.as_str())
        .execute(&mut *conn)
        .await?;
    if removed.rows_affected() != 1 {
        return Err(StorageError::CategoryNotFound(plan.category.clone()));
    }

    let transactions = load_transactions(conn).await?;
    let mappings = load_mappings(conn).await?;
    plan.verify(&transactions, &mappings)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{test_db, tx};
    use crate::db::{add_category, add_mapping, get_all_transactions, get_categories, get_mappings, save_transactions};
    use spendmap_core::{check_invariants, Assignment, Category, IntegrityError, Mapping};

    fn cid(s: &str) -> CategoryId {
        CategoryId::new(s)
    }

    async fn delete(pool: &DbPool, id: &CategoryId) -> Result<CascadeReport, StorageError> {
        delete_category(pool, id, &CategorizerConfig::default()).await
    }

    async fn seeded() -> (tempfile::TempDir, DbPool) {
        let (dir, pool) = test_db().await;
        for (id, name) in [("cat-food", "Food"), ("cat-fun", "Fun"), ("cat-car", "Car")] {
            add_category(&pool, &Category::new(id, name, "#123456")).await.unwrap();
        }
        add_mapping(&pool, &Mapping::new("m1", "RIMI", "cat-food")).await.unwrap();
        add_mapping(&pool, &Mapping::new("m2", "MAXIMA", "cat-food")).await.unwrap();
        add_mapping(&pool, &Mapping::new("m3", "CINEMA", "cat-fun")).await.unwrap();
        save_transactions(
            &pool,
            &[
                tx("t1", "rimi", Assignment::Category(cid("cat-food"))),
                tx("t2", "cinema", Assignment::Category(cid("cat-fun"))),
                tx("t3", "both", Assignment::conflict(vec![cid("cat-food"), cid("cat-fun")])),
                tx("t4", "three", Assignment::conflict(vec![cid("cat-food"), cid("cat-fun"), cid("cat-car")])),
                tx("t5", "none", Assignment::Unassigned),
            ],
        )
        .await
        .unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn cascade_removes_every_reference() {
        let (_dir, pool) = seeded().await;
        let report = delete(&pool, &cid("cat-food")).await.unwrap();
        assert_eq!(report.transactions_updated, 3);
        assert_eq!(report.mappings_removed, 2);

        let categories = get_categories(&pool).await.unwrap();
        let transactions = get_all_transactions(&pool).await.unwrap();
        let mappings = get_mappings(&pool).await.unwrap();

        assert!(categories.iter().all(|c| c.id != cid("cat-food")));
        assert!(transactions.iter().all(|t| !t.assignment.references(&cid("cat-food"))));
        assert!(mappings.iter().all(|m| m.category_id != cid("cat-food")));
        assert!(check_invariants(&categories, &transactions, &mappings).is_empty());
    }

    #[tokio::test]
    async fn cascade_does_not_re_resolve() {
        let (_dir, pool) = seeded().await;
        delete(&pool, &cid("cat-food")).await.unwrap();

        let transactions = get_all_transactions(&pool).await.unwrap();
        let by_id = |id: &str| transactions.iter().find(|t| t.id == id).unwrap().assignment.clone();
        assert_eq!(by_id("t1"), Assignment::Unassigned);
        assert_eq!(by_id("t2"), Assignment::Category(cid("cat-fun")));
        assert_eq!(by_id("t3"), Assignment::Unassigned);
        assert_eq!(by_id("t4"), Assignment::conflict(vec![cid("cat-fun"), cid("cat-car")]));
    }

    #[tokio::test]
    async fn unknown_category_changes_nothing() {
        let (_dir, pool) = seeded().await;
        let err = delete(&pool, &cid("cat-nope")).await.unwrap_err();
        assert!(matches!(err, StorageError::Integrity(IntegrityError::CategoryNotFound(_))));
        assert_eq!(get_mappings(&pool).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn reserved_category_is_refused() {
        let (_dir, pool) = seeded().await;
        let err = delete(&pool, &CategoryId::income()).await.unwrap_err();
        assert!(matches!(err, StorageError::Integrity(IntegrityError::ReservedCategory(_))));
        assert!(get_categories(&pool).await.unwrap().iter().any(|c| c.id == CategoryId::income()));
    }

    #[tokio::test]
    async fn deleting_twice_reports_not_found() {
        let (_dir, pool) = seeded().await;
        delete(&pool, &cid("cat-car")).await.unwrap();
        assert!(delete(&pool, &cid("cat-car")).await.is_err());
    }

    #[tokio::test]
    async fn configured_fallback_category_is_refused() {
        let (_dir, pool) = seeded().await;
        add_category(&pool, &Category::new("salary", "Salary", "#00ff00")).await.unwrap();
        let config = CategorizerConfig {
            income_category: cid("salary"),
            ..Default::default()
        };

        let err = delete_category(&pool, &cid("salary"), &config).await.unwrap_err();
        assert!(matches!(err, StorageError::Integrity(IntegrityError::ReservedCategory(_))));
        assert!(get_categories(&pool).await.unwrap().iter().any(|c| c.id == cid("salary")));
    }

    #[tokio::test]
    async fn failure_midway_rolls_everything_back() {
        let (_dir, pool) = seeded().await;
        let before_transactions = get_all_transactions(&pool).await.unwrap();
        let before_mappings = get_mappings(&pool).await.unwrap();

        // Transaction updates succeed, then mapping removal aborts.
        sqlx::query(
            "CREATE TRIGGER lock_mappings BEFORE DELETE ON mappings BEGIN SELECT RAISE(ABORT, 'mappings locked'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let err = delete(&pool, &cid("cat-food")).await.unwrap_err();
        match err {
            StorageError::InconsistentCascade { category, reason } => {
                assert_eq!(category, cid("cat-food"));
                assert!(reason.contains("mappings locked"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(get_categories(&pool).await.unwrap().iter().any(|c| c.id == cid("cat-food")));
        assert_eq!(get_mappings(&pool).await.unwrap(), before_mappings);
        assert_eq!(get_all_transactions(&pool).await.unwrap(), before_transactions);
    }
}

use chrono::NaiveDate;
use rust_decimal::Decimal;
use spendmap_core::{
    Assignment, CategorizerConfig, Category, CategoryId, Mapping, Money, Transaction,
    TransactionType, DEFAULT_CATEGORIES,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::str::FromStr;

use crate::error::StorageError;

pub type DbPool = Pool<Sqlite>;

pub const IGNORED_ACCOUNTS_KEY: &str = "ignored_accounts";

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true);

    // A single connection serialises every write, so a cascade can never
    // interleave with another mutation.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            color TEXT NOT NULL,
            budget TEXT NOT NULL DEFAULT '0',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mappings (
            id TEXT PRIMARY KEY,
            pattern TEXT NOT NULL,
            category_id TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (category_id) REFERENCES categories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            date TEXT NOT NULL,
            amount TEXT NOT NULL,
            transaction_type TEXT NOT NULL,
            beneficiary TEXT NOT NULL,
            purpose TEXT NOT NULL,
            category_id TEXT,
            conflicts TEXT,
            original_row TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (category_id) REFERENCES categories(id),
            CHECK (category_id IS NULL OR conflicts IS NULL)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(category_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_mappings_category ON mappings(category_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn seed_default_categories(pool: &DbPool) -> Result<(), sqlx::Error> {
    for (id, name, color) in DEFAULT_CATEGORIES {
        sqlx::query("INSERT OR IGNORE INTO categories (id, name, color) VALUES (?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(color)
            .execute(pool)
            .await?;
    }

    Ok(())
}

// ── Categories ────────────────────────────────────────────────────────────────

pub(crate) async fn load_categories(conn: &mut SqliteConnection) -> Result<Vec<Category>, StorageError> {
    let rows = sqlx::query_as::<_, (String, String, String, String)>(
        "SELECT id, name, color, budget FROM categories ORDER BY name",
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|(id, name, color, budget)| {
            let budget = Decimal::from_str(&budget).map_err(|e| StorageError::Corrupt {
                table: "categories",
                id: id.clone(),
                detail: format!("budget '{budget}': {e}"),
            })?;
            Ok(Category {
                id: CategoryId(id),
                name,
                color,
                budget,
            })
        })
        .collect()
}

pub(crate) async fn category_exists(conn: &mut SqliteConnection, id: &CategoryId) -> Result<bool, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM categories WHERE id = ?")
        .bind(id.as_str())
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.0 > 0)
}

pub async fn get_categories(pool: &DbPool) -> Result<Vec<Category>, StorageError> {
    let mut conn = pool.acquire().await?;
    load_categories(&mut conn).await
}

pub async fn add_category(pool: &DbPool, category: &Category) -> Result<(), StorageError> {
    sqlx::query("INSERT INTO categories (id, name, color, budget) VALUES (?, ?, ?, ?)")
        .bind(category.id.as_str())
        .bind(&category.name)
        .bind(&category.color)
        .bind(category.budget.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

// ── Mappings ──────────────────────────────────────────────────────────────────

pub(crate) async fn load_mappings(conn: &mut SqliteConnection) -> Result<Vec<Mapping>, StorageError> {
    let rows = sqlx::query_as::<_, (String, String, String)>(
        "SELECT id, pattern, category_id FROM mappings ORDER BY created_at, id",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, pattern, category_id)| Mapping {
            id,
            pattern,
            category_id: CategoryId(category_id),
        })
        .collect())
}

pub async fn get_mappings(pool: &DbPool) -> Result<Vec<Mapping>, StorageError> {
    let mut conn = pool.acquire().await?;
    load_mappings(&mut conn).await
}

pub async fn add_mapping(pool: &DbPool, mapping: &Mapping) -> Result<(), StorageError> {
    add_mappings(pool, std::slice::from_ref(mapping)).await
}

/// Inserts all mappings or none. Every target category must exist.
pub async fn add_mappings(pool: &DbPool, mappings: &[Mapping]) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;

    for mapping in mappings {
        if !category_exists(&mut tx, &mapping.category_id).await? {
            return Err(StorageError::CategoryNotFound(mapping.category_id.clone()));
        }
        sqlx::query("INSERT INTO mappings (id, pattern, category_id) VALUES (?, ?, ?)")
            .bind(&mapping.id)
            .bind(&mapping.pattern)
            .bind(mapping.category_id.as_str())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Returns whether a mapping was removed.
pub async fn delete_mapping(pool: &DbPool, id: &str) -> Result<bool, StorageError> {
    let result = sqlx::query("DELETE FROM mappings WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ── Transactions ──────────────────────────────────────────────────────────────

type TransactionRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
);

fn corrupt(id: &str, detail: String) -> StorageError {
    StorageError::Corrupt {
        table: "transactions",
        id: id.to_string(),
        detail,
    }
}

fn transaction_from_row(row: TransactionRow) -> Result<Transaction, StorageError> {
    let (id, date, amount, transaction_type, beneficiary, purpose, category_id, conflicts, original_row) = row;

    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|e| corrupt(&id, format!("date '{date}': {e}")))?;
    let amount = Money::parse(&amount).ok_or_else(|| corrupt(&id, format!("amount '{amount}'")))?;
    let transaction_type = match transaction_type.as_str() {
        "D" => TransactionType::Debit,
        "C" => TransactionType::Credit,
        other => return Err(corrupt(&id, format!("transaction type '{other}'"))),
    };

    let assignment = match (category_id, conflicts) {
        (Some(category), None) => Assignment::Category(CategoryId(category)),
        (None, Some(conflicts)) => {
            let set: BTreeSet<CategoryId> = serde_json::from_str(&conflicts)
                .map_err(|e| corrupt(&id, format!("conflicts: {e}")))?;
            if set.len() < 2 {
                return Err(corrupt(&id, format!("conflict set with {} categories", set.len())));
            }
            Assignment::Conflict(set)
        }
        (None, None) => Assignment::Unassigned,
        (Some(_), Some(_)) => return Err(corrupt(&id, "both category and conflicts set".to_string())),
    };

    let original_row: BTreeMap<String, String> = serde_json::from_str(&original_row)
        .map_err(|e| corrupt(&id, format!("original row: {e}")))?;

    Ok(Transaction {
        id,
        date,
        amount,
        transaction_type,
        beneficiary,
        purpose,
        assignment,
        original_row,
    })
}

pub(crate) fn encode_assignment(
    assignment: &Assignment,
) -> Result<(Option<String>, Option<String>), StorageError> {
    Ok(match assignment {
        Assignment::Unassigned => (None, None),
        Assignment::Category(id) => (Some(id.0.clone()), None),
        Assignment::Conflict(set) => (None, Some(serde_json::to_string(set)?)),
    })
}

pub(crate) async fn load_transactions(conn: &mut SqliteConnection) -> Result<Vec<Transaction>, StorageError> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        "SELECT id, date, amount, transaction_type, beneficiary, purpose, category_id, conflicts, original_row FROM transactions ORDER BY date, rowid",
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(transaction_from_row).collect()
}

pub(crate) async fn update_assignment(
    conn: &mut SqliteConnection,
    transaction_id: &str,
    assignment: &Assignment,
) -> Result<u64, StorageError> {
    let (category_id, conflicts) = encode_assignment(assignment)?;
    let result = sqlx::query("UPDATE transactions SET category_id = ?, conflicts = ? WHERE id = ?")
        .bind(category_id)
        .bind(conflicts)
        .bind(transaction_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn get_all_transactions(pool: &DbPool) -> Result<Vec<Transaction>, StorageError> {
    let mut conn = pool.acquire().await?;
    load_transactions(&mut conn).await
}

pub async fn get_transaction_ids(pool: &DbPool) -> Result<HashSet<String>, StorageError> {
    let rows = sqlx::query_as::<_, (String,)>("SELECT id FROM transactions")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Upserts by id in one write transaction. Rejects the whole batch if any
/// transaction names a category that does not exist.
pub async fn save_transactions(pool: &DbPool, transactions: &[Transaction]) -> Result<usize, StorageError> {
    let mut tx = pool.begin().await?;
    let known: HashSet<CategoryId> = load_categories(&mut tx)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect();

    for t in transactions {
        let missing = match &t.assignment {
            Assignment::Unassigned => None,
            Assignment::Category(id) => (!known.contains(id)).then_some(id),
            Assignment::Conflict(set) => set.iter().find(|id| !known.contains(*id)),
        };
        if let Some(id) = missing {
            return Err(StorageError::CategoryNotFound(id.clone()));
        }

        let (category_id, conflicts) = encode_assignment(&t.assignment)?;
        sqlx::query(
            r#"
            INSERT INTO transactions (id, date, amount, transaction_type, beneficiary, purpose, category_id, conflicts, original_row)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                date = excluded.date,
                amount = excluded.amount,
                transaction_type = excluded.transaction_type,
                beneficiary = excluded.beneficiary,
                purpose = excluded.purpose,
                category_id = excluded.category_id,
                conflicts = excluded.conflicts,
                original_row = excluded.original_row
            "#,
        )
        .bind(&t.id)
        .bind(t.date.format("%Y-%m-%d").to_string())
        .bind(t.amount.as_decimal().to_string())
        .bind(t.transaction_type.as_flag())
        .bind(&t.beneficiary)
        .bind(&t.purpose)
        .bind(category_id)
        .bind(conflicts)
        .bind(serde_json::to_string(&t.original_row)?)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(transactions.len())
}

/// Manual resolution: sets the category and clears any conflict set.
pub async fn resolve_transaction(
    pool: &DbPool,
    transaction_id: &str,
    category_id: &CategoryId,
) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;
    if !category_exists(&mut tx, category_id).await? {
        return Err(StorageError::CategoryNotFound(category_id.clone()));
    }
    let updated = update_assignment(&mut tx, transaction_id, &Assignment::Category(category_id.clone())).await?;
    if updated == 0 {
        return Err(StorageError::TransactionNotFound(transaction_id.to_string()));
    }
    tx.commit().await?;
    Ok(())
}

// ── Settings ──────────────────────────────────────────────────────────────────

pub async fn get_setting(pool: &DbPool, key: &str) -> Result<Option<String>, StorageError> {
    let row = sqlx::query_as::<_, (String,)>("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.0))
}

pub async fn set_setting(pool: &DbPool, key: &str, value: &str) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_ignored_accounts(pool: &DbPool) -> Result<Vec<String>, StorageError> {
    match get_setting(pool, IGNORED_ACCOUNTS_KEY).await? {
        Some(value) => Ok(serde_json::from_str(&value)?),
        None => Ok(Vec::new()),
    }
}

pub async fn set_ignored_accounts(pool: &DbPool, accounts: &[String]) -> Result<(), StorageError> {
    set_setting(pool, IGNORED_ACCOUNTS_KEY, &serde_json::to_string(accounts)?).await
}

/// `base` with the persisted ignored-account list merged in.
pub async fn load_categorizer_config(
    pool: &DbPool,
    base: CategorizerConfig,
) -> Result<CategorizerConfig, StorageError> {
    let mut config = base;
    config.merge_ignored_accounts(get_ignored_accounts(pool).await?);
    Ok(config)
}

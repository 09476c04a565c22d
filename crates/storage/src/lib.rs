pub mod cascade;
pub mod db;
pub mod error;

pub use cascade::{delete_category, CascadeReport};
pub use db::{
    add_category, add_mapping, add_mappings, create_db, delete_mapping, get_all_transactions,
    get_categories, get_ignored_accounts, get_mappings, get_setting, get_transaction_ids,
    load_categorizer_config, resolve_transaction, save_transactions, seed_default_categories,
    set_ignored_accounts, set_setting, DbPool, IGNORED_ACCOUNTS_KEY,
};
pub use error::StorageError;

pub mod category;
pub mod config;
pub mod integrity;
pub mod mapping;
pub mod money;
pub mod transaction;

pub use category::{
    Category, CategoryId, DEFAULT_CATEGORIES, INCOME_CATEGORY_ID, INTERNAL_CATEGORY_ID,
};
pub use config::{CategorizerConfig, ConfigError};
pub use integrity::{check_invariants, CascadePlan, IntegrityError, Violation};
pub use mapping::Mapping;
pub use money::Money;
pub use transaction::{Assignment, Transaction, TransactionType};

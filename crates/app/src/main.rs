use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use spendmap_core::CategorizerConfig;
use spendmap_import::StatementProfile;
use std::fs::File;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "spendmap", version, about = "Categorize bank statement transactions")]
struct Cli {
    /// SQLite database file. Defaults to the platform data directory.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// TOML file with categorizer settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a bank statement export.
    Import {
        file: PathBuf,
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
    /// Recompute every transaction's category from the current rules.
    /// Overwrites manual choices.
    Reapply {
        #[arg(long)]
        yes: bool,
    },
    Categories,
    AddCategory {
        name: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value = "#64748b")]
        color: String,
    },
    /// Delete a category, clearing it from transactions and dropping its rules.
    DeleteCategory { id: String },
    Mappings,
    AddMapping { pattern: String, category: String },
    DeleteMapping { id: String },
    /// Assign a category to a transaction by hand.
    Resolve { transaction: String, category: String },
    ExportRules { file: Option<PathBuf> },
    ImportRules { file: PathBuf },
    /// Mark an account identifier as one of your own.
    IgnoreAccount { account: String },
    /// Report broken category references.
    Check,
}

fn default_db_path() -> Result<PathBuf> {
    let project_dirs = directories::ProjectDirs::from("com", "spendmap", "Spendmap")
        .context("Failed to get app directory")?;
    let data_dir = project_dirs.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
    Ok(data_dir.join("spendmap.db"))
}

fn load_config(path: Option<&PathBuf>) -> Result<CategorizerConfig> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(CategorizerConfig::from_toml(&content)?)
        }
        None => Ok(CategorizerConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    let db = spendmap_storage::create_db(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    spendmap_storage::seed_default_categories(&db).await?;

    let config = spendmap_storage::load_categorizer_config(&db, load_config(cli.config.as_ref())?).await?;

    match cli.command {
        Command::Import { file, delimiter } => {
            if !delimiter.is_ascii() {
                bail!("Delimiter must be a single ASCII character");
            }
            let profile = StatementProfile {
                delimiter: delimiter as u8,
                ..Default::default()
            };
            let data = File::open(&file).with_context(|| format!("Failed to open {}", file.display()))?;
            let summary = commands::import_statement(&db, data, &profile, &config).await?;
            println!(
                "Imported {} of {} transactions ({} already known, {} blank rows skipped)",
                summary.imported, summary.parsed, summary.duplicates, summary.skipped
            );
            println!(
                "{} need a manual pick between rules, {} have no category",
                summary.conflicts, summary.unassigned
            );
            for error in &summary.errors {
                println!("  {error}");
            }
        }
        Command::Reapply { yes } => {
            if !yes {
                bail!("Reapplying rules overwrites manual categories; rerun with --yes to confirm");
            }
            let changed = commands::reapply_rules(&db, &config).await?;
            println!("{changed} transactions changed");
        }
        Command::Categories => {
            for c in spendmap_storage::get_categories(&db).await? {
                println!("{}\t{}\t{}\t{}", c.id, c.name, c.color, c.budget);
            }
        }
        Command::AddCategory { name, id, color } => {
            let category = commands::add_category(&db, id, &name, &color).await?;
            println!("{}", category.id);
        }
        Command::DeleteCategory { id } => {
            let report = commands::delete_category(&db, &id, &config).await?;
            println!(
                "Deleted {}: {} transactions cleared, {} rules removed",
                report.category, report.transactions_updated, report.mappings_removed
            );
        }
        Command::Mappings => {
            for m in spendmap_storage::get_mappings(&db).await? {
                println!("{}\t{}\t{}", m.id, m.pattern, m.category_id);
            }
        }
        Command::AddMapping { pattern, category } => {
            let mapping = commands::add_mapping(&db, &pattern, &category).await?;
            println!("{}", mapping.id);
        }
        Command::DeleteMapping { id } => {
            if !spendmap_storage::delete_mapping(&db, &id).await? {
                bail!("No mapping with id {id}");
            }
        }
        Command::Resolve { transaction, category } => {
            commands::resolve(&db, &transaction, &category).await?;
        }
        Command::ExportRules { file } => {
            let json = commands::export_rules(&db).await?;
            match file {
                Some(path) => std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => println!("{json}"),
            }
        }
        Command::ImportRules { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let summary = commands::import_rules(&db, &json).await?;
            println!(
                "Added {} rules ({} already present, {} for unknown categories)",
                summary.added, summary.skipped_existing, summary.skipped_unknown_category
            );
        }
        Command::IgnoreAccount { account } => {
            let accounts = commands::ignore_account(&db, &account).await?;
            println!("Ignored accounts: {}", accounts.join(", "));
        }
        Command::Check => {
            let violations = commands::check(&db).await?;
            if violations.is_empty() {
                println!("No problems found");
            } else {
                for v in &violations {
                    println!("{v}");
                }
                bail!("{} integrity problems", violations.len());
            }
        }
    }

    Ok(())
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use spendmap_core::{Assignment, Money, Transaction, TransactionType};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::io::Read;
use thiserror::Error;

pub const COL_ACCOUNT_NUMBER: &str = "Account number";
pub const COL_PAYMENT_NO: &str = "Payment No.";
pub const COL_VALUE_DATE: &str = "Value date";
pub const COL_BENEFICIARY_ACCOUNT: &str = "Beneficiary/payer's account number";
pub const COL_BENEFICIARY: &str = "Beneficiary/ Payer";
pub const COL_DEBIT_CREDIT: &str = "Debit/Credit";
pub const COL_AMOUNT: &str = "Amount";
pub const COL_TRANSACTION_NO: &str = "Transaction No.";
pub const COL_PURPOSE: &str = "Purpose of payment";
pub const COL_CURRENCY: &str = "Currency";
pub const COL_REGISTRATION_NO: &str = "Registration number/Personal ID";

pub const STATEMENT_COLUMNS: &[&str] = &[
    COL_ACCOUNT_NUMBER,
    COL_PAYMENT_NO,
    COL_VALUE_DATE,
    COL_BENEFICIARY_ACCOUNT,
    COL_BENEFICIARY,
    COL_DEBIT_CREDIT,
    COL_AMOUNT,
    COL_TRANSACTION_NO,
    COL_PURPOSE,
    COL_CURRENCY,
    COL_REGISTRATION_NO,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementProfile {
    pub delimiter: u8,
    pub date_format: String,
}

impl Default for StatementProfile {
    fn default() -> Self {
        Self {
            delimiter: b',',
            date_format: "%d.%m.%Y".to_string(),
        }
    }
}

/// File-level failures. Nothing is imported when one of these occurs.
#[derive(Error, Debug)]
pub enum StatementError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowErrorKind {
    InvalidDate(String),
    InvalidAmount(String),
    /// A `Transaction No.` already used by an earlier row of the same file.
    DuplicateId(String),
    Unreadable(String),
}

/// A data row that could not be turned into a transaction. `row` is the
/// 1-based index among data rows (the header is not counted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub row: usize,
    pub kind: RowErrorKind,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RowErrorKind::InvalidDate(s) => write!(f, "row {}: invalid date '{s}'", self.row),
            RowErrorKind::InvalidAmount(s) => write!(f, "row {}: invalid amount '{s}'", self.row),
            RowErrorKind::DuplicateId(id) => write!(f, "row {}: duplicate transaction id '{id}'", self.row),
            RowErrorKind::Unreadable(msg) => write!(f, "row {}: {msg}", self.row),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedStatement {
    /// In source order.
    pub transactions: Vec<Transaction>,
    pub errors: Vec<RowError>,
    /// Rows dropped for lacking a date or amount (blank or footer lines).
    pub skipped: usize,
}

struct Columns {
    headers: Vec<String>,
    date: usize,
    amount: usize,
    flag: Option<usize>,
    beneficiary: Option<usize>,
    beneficiary_account: Option<usize>,
    purpose: Option<usize>,
    reference: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, StatementError> {
        let headers: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
        let find = |name: &str| headers.iter().position(|h| h == name);

        Ok(Columns {
            date: find(COL_VALUE_DATE).ok_or(StatementError::MissingColumn(COL_VALUE_DATE))?,
            amount: find(COL_AMOUNT).ok_or(StatementError::MissingColumn(COL_AMOUNT))?,
            flag: find(COL_DEBIT_CREDIT),
            beneficiary: find(COL_BENEFICIARY),
            beneficiary_account: find(COL_BENEFICIARY_ACCOUNT),
            purpose: find(COL_PURPOSE),
            reference: find(COL_TRANSACTION_NO),
            headers,
        })
    }
}

fn field(record: &csv::StringRecord, col: Option<usize>) -> &str {
    col.and_then(|c| record.get(c)).map(str::trim).unwrap_or_default()
}

enum RowOutcome {
    Parsed(Transaction),
    Skipped,
    Failed(RowErrorKind),
}

pub struct StatementNormalizer {
    profile: StatementProfile,
}

impl StatementNormalizer {
    pub fn new(profile: StatementProfile) -> Self {
        Self { profile }
    }

    pub fn normalize<R: Read>(&self, data: R) -> Result<NormalizedStatement, StatementError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(self.profile.delimiter)
            .from_reader(data);

        let columns = Columns::resolve(reader.headers()?)?;
        let mut ids = SyntheticIds::default();
        let mut seen = HashSet::new();
        let mut out = NormalizedStatement::default();

        for (index, result) in reader.records().enumerate() {
            let row = index + 1;
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(row, "unreadable statement row: {e}");
                    out.errors.push(RowError {
                        row,
                        kind: RowErrorKind::Unreadable(e.to_string()),
                    });
                    continue;
                }
            };

            let outcome = match self.parse_row(&record, &columns, &mut ids) {
                RowOutcome::Parsed(tx) if !seen.insert(tx.id.clone()) => {
                    RowOutcome::Failed(RowErrorKind::DuplicateId(tx.id))
                }
                outcome => outcome,
            };

            match outcome {
                RowOutcome::Parsed(tx) => out.transactions.push(tx),
                RowOutcome::Skipped => {
                    tracing::debug!(row, "skipping row without date or amount");
                    out.skipped += 1;
                }
                RowOutcome::Failed(kind) => {
                    let error = RowError { row, kind };
                    tracing::warn!("{error}");
                    out.errors.push(error);
                }
            }
        }

        Ok(out)
    }

    fn parse_row(
        &self,
        record: &csv::StringRecord,
        columns: &Columns,
        ids: &mut SyntheticIds,
    ) -> RowOutcome {
        let date_field = field(record, Some(columns.date));
        let amount_field = field(record, Some(columns.amount));
        if date_field.is_empty() || amount_field.is_empty() {
            return RowOutcome::Skipped;
        }

        let Ok(date) = NaiveDate::parse_from_str(date_field, &self.profile.date_format) else {
            return RowOutcome::Failed(RowErrorKind::InvalidDate(date_field.to_string()));
        };
        let Some(amount) = Money::parse(amount_field) else {
            return RowOutcome::Failed(RowErrorKind::InvalidAmount(amount_field.to_string()));
        };

        let reference = field(record, columns.reference);
        let id = if reference.is_empty() {
            ids.next(record)
        } else {
            reference.to_string()
        };

        let name = field(record, columns.beneficiary);
        let account = field(record, columns.beneficiary_account);
        let beneficiary = if account.is_empty() {
            name.to_string()
        } else {
            format!("{name} ({account})")
        };

        let original_row: BTreeMap<String, String> = columns
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), record.get(i).unwrap_or_default().to_string()))
            .collect();

        RowOutcome::Parsed(Transaction {
            id,
            date,
            amount,
            transaction_type: TransactionType::from_flag(field(record, columns.flag)),
            beneficiary,
            purpose: field(record, columns.purpose).to_string(),
            assignment: Assignment::Unassigned,
            original_row,
        })
    }
}

/// Content-derived ids for rows without a bank reference. Identical rows in
/// one file are told apart by their occurrence count, so re-importing the
/// same file reproduces the same ids.
#[derive(Default)]
struct SyntheticIds {
    seen: HashMap<[u8; 32], usize>,
}

impl SyntheticIds {
    fn next(&mut self, record: &csv::StringRecord) -> String {
        let mut hasher = Sha256::new();
        for value in record.iter() {
            hasher.update(value.trim().as_bytes());
            hasher.update([0x1f]);
        }
        let content: [u8; 32] = hasher.finalize().into();

        let occurrence = self.seen.entry(content).or_insert(0);
        *occurrence += 1;

        let mut hasher = Sha256::new();
        hasher.update(content);
        hasher.update(occurrence.to_le_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        let hex: String = digest[..12].iter().map(|b| format!("{b:02x}")).collect();
        format!("row-{hex}")
    }
}

pub fn normalize<R: Read>(
    data: R,
    profile: &StatementProfile,
) -> Result<NormalizedStatement, StatementError> {
    StatementNormalizer::new(profile.clone()).normalize(data)
}

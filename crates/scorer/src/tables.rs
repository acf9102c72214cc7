//! Tabular input and output: wallet lists, feature tables, score tables.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use calamine::Reader;
use common::error::{ConfigurationError, DataIntegrityError};

use crate::wallet_features::{FeatureRecord, FEATURE_COLUMNS};

pub const WALLET_KEY_COLUMN: &str = "wallet";
pub const SCORE_HEADER: [&str; 2] = ["wallet_id", "credit_score"];

/// How a wallet list is read, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Delimited text with the given field separator.
    Delimited(u8),
    /// Spreadsheet; the first sheet is read.
    Workbook,
}

pub fn input_format(path: &Path) -> Result<InputFormat, ConfigurationError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "csv" => Ok(InputFormat::Delimited(b',')),
        "tsv" | "txt" => Ok(InputFormat::Delimited(b'\t')),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(InputFormat::Workbook),
        _ => Err(ConfigurationError::UnsupportedExtension {
            path: path.display().to_string(),
            extension,
        }),
    }
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

fn wallet_column<I>(path: &Path, column: &str, mut headers: I) -> Result<usize, ConfigurationError>
where
    I: Iterator<Item = String>,
{
    headers
        .position(|h| h.trim() == column)
        .ok_or_else(|| ConfigurationError::MissingColumn {
            path: path.display().to_string(),
            column: column.to_string(),
        })
}

fn push_wallet(wallets: &mut Vec<String>, cell: Option<&str>) {
    if let Some(w) = cell.map(str::trim).filter(|w| !w.is_empty()) {
        wallets.push(w.to_string());
    }
}

/// Wallet identifiers from `column`, in file order. Blank cells are dropped.
pub fn read_wallet_list(path: &Path, column: &str) -> Result<Vec<String>> {
    match input_format(path)? {
        InputFormat::Delimited(delimiter) => read_delimited_wallets(path, delimiter, column),
        InputFormat::Workbook => read_workbook_wallets(path, column),
    }
}

fn read_delimited_wallets(path: &Path, delimiter: u8, column: &str) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open wallet list {}", path.display()))?;

    let idx = wallet_column(path, column, rdr.headers()?.iter().map(String::from))?;

    let mut wallets = Vec::new();
    for record in rdr.records() {
        push_wallet(&mut wallets, record?.get(idx));
    }
    Ok(wallets)
}

fn read_workbook_wallets(path: &Path, column: &str) -> Result<Vec<String>> {
    let mut workbook = calamine::open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow::anyhow!("workbook {} has no sheets", path.display()))?
        .with_context(|| format!("failed to read first sheet of {}", path.display()))?;

    let mut rows = range.rows();
    let header = rows.next().unwrap_or_default();
    let idx = wallet_column(path, column, header.iter().map(ToString::to_string))?;

    let mut wallets = Vec::new();
    for row in rows {
        push_wallet(&mut wallets, row.get(idx).map(ToString::to_string).as_deref());
    }
    Ok(wallets)
}

/// Header is always written, so an empty table is a header-only file.
pub fn write_features_csv(path: &Path, records: &[FeatureRecord]) -> Result<()> {
    create_parent_dir(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    wtr.write_record(std::iter::once(WALLET_KEY_COLUMN).chain(FEATURE_COLUMNS))?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a feature table written by `write_features_csv`. Extra columns are ignored.
pub fn read_features_csv(path: &Path) -> Result<Vec<FeatureRecord>> {
    let source_name = path.display().to_string();
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open feature table {source_name}"))?;

    let headers = rdr.headers()?.clone();
    for column in std::iter::once(WALLET_KEY_COLUMN).chain(FEATURE_COLUMNS) {
        if !headers.iter().any(|h| h == column) {
            return Err(DataIntegrityError::MissingColumn {
                source_name,
                column: column.to_string(),
            }
            .into());
        }
    }

    let mut records = Vec::new();
    for (i, row) in rdr.deserialize::<FeatureRecord>().enumerate() {
        let record = row.map_err(|e| DataIntegrityError::BadRow {
            source_name: source_name.clone(),
            row: i + 1,
            reason: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Heuristic scores are whole numbers; model scores carry two decimals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CreditScore {
    Heuristic(u32),
    Model(f64),
}

impl fmt::Display for CreditScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heuristic(s) => write!(f, "{s}"),
            Self::Model(s) => write!(f, "{s:.2}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRow {
    pub wallet_id: String,
    pub credit_score: CreditScore,
}

/// Two-column score table. Written only once scoring has finished.
pub fn write_scores_csv(path: &Path, rows: &[ScoreRow]) -> Result<()> {
    create_parent_dir(path)?;
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    wtr.write_record(SCORE_HEADER)?;
    for row in rows {
        let score = row.credit_score.to_string();
        wtr.write_record([row.wallet_id.as_str(), score.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

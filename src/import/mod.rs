//! Batch import of Notion exports.
//!
//! Two formats are understood: the JSON written by the workspace exporter
//! (`notion`) and Notion's "Export as CSV" (`csv`). Each `(format, kind)`
//! pair is an [`ImportJob`]; [`run_import`] wraps a job with checkpointing
//! and a single transaction, so a failed file leaves the database as it was.
//!
//! # Checkpoints
//!
//! The SHA-256 of each successfully imported file is stored in
//! `import_checkpoints` under `<format>:<kind>`. Importing the same bytes
//! again is skipped unless `--force` is given. `--dry-run` runs the job and
//! rolls the transaction back.

mod csv_jobs;
mod notion_jobs;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{SqliteConnection, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::exports;

pub use csv_jobs::{parse_notion_links, CsvImport};
pub use notion_jobs::NotionImport;

/// What an export file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImportKind {
    Distributors,
    Lps,
    Gps,
    People,
    PersonLinks,
    Funds,
    Notes,
}

impl ImportKind {
    /// Every kind, in the order `crm import all` runs them: each kind only
    /// refers to kinds before it.
    pub const ALL: [ImportKind; 7] = [
        ImportKind::Distributors,
        ImportKind::Lps,
        ImportKind::Gps,
        ImportKind::People,
        ImportKind::PersonLinks,
        ImportKind::Funds,
        ImportKind::Notes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::Distributors => "distributors",
            ImportKind::Lps => "lps",
            ImportKind::Gps => "gps",
            ImportKind::People => "people",
            ImportKind::PersonLinks => "person-links",
            ImportKind::Funds => "funds",
            ImportKind::Notes => "notes",
        }
    }

    /// Discovery glob used when `import.patterns` has no entry for the kind.
    pub fn default_pattern(&self) -> String {
        match self {
            ImportKind::PersonLinks => "**/*person-links*.csv".to_string(),
            kind => format!("**/*{}*.json", kind.as_str()),
        }
    }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ImportKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown import kind: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportFormat {
    Notion,
    Csv,
}

impl ImportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportFormat::Notion => "notion",
            ImportFormat::Csv => "csv",
        }
    }

    /// `csv` for `.csv` files, `notion` for everything else.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ImportFormat::Csv,
            _ => ImportFormat::Notion,
        }
    }
}

impl fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "notion" | "json" => Ok(ImportFormat::Notion),
            "csv" => Ok(ImportFormat::Csv),
            other => Err(format!("unknown import format: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    pub dry_run: bool,
    pub force: bool,
}

/// Counts for one imported file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub kind: ImportKind,
    pub format: ImportFormat,
    /// Rows or pages read from the file.
    pub rows: u64,
    pub imported: u64,
    pub updated: u64,
    pub skipped: u64,
    pub links: u64,
    /// The file matched its checkpoint and nothing ran.
    pub unchanged: bool,
    pub dry_run: bool,
}

impl ImportReport {
    pub fn new(kind: ImportKind, format: ImportFormat) -> Self {
        Self {
            kind,
            format,
            rows: 0,
            imported: 0,
            updated: 0,
            skipped: 0,
            links: 0,
            unchanged: false,
            dry_run: false,
        }
    }

    /// Count an upsert result.
    pub fn record(&mut self, created: bool) {
        if created {
            self.imported += 1;
        } else {
            self.updated += 1;
        }
    }

    pub fn print(&self, path: &Path) {
        let suffix = if self.dry_run { " (dry-run)" } else { "" };
        println!("import {} {}{}", self.format, self.kind, suffix);
        println!("  file: {}", path.display());
        if self.unchanged {
            println!("  unchanged since last import, skipped (use --force to re-import)");
            println!("ok");
            return;
        }
        println!("  rows: {}", self.rows);
        println!("  imported: {}", self.imported);
        println!("  updated: {}", self.updated);
        println!("  skipped: {}", self.skipped);
        println!("  links created: {}", self.links);
        println!("ok");
    }
}

/// One `(format, kind)` importer.
#[async_trait]
pub trait ImportJob: Send + Sync {
    fn kind(&self) -> ImportKind;

    fn format(&self) -> ImportFormat;

    /// Apply `data` (the raw file) to the database, filling in `report`.
    async fn run(
        &self,
        conn: &mut SqliteConnection,
        data: &[u8],
        report: &mut ImportReport,
    ) -> Result<()>;
}

/// The job for a format and kind, if that combination exists.
pub fn job_for(format: ImportFormat, kind: ImportKind) -> Result<Box<dyn ImportJob>> {
    match format {
        ImportFormat::Notion => {
            if kind == ImportKind::PersonLinks {
                bail!("person-links can only be imported from CSV");
            }
            Ok(Box::new(NotionImport::new(kind)))
        }
        ImportFormat::Csv => match kind {
            ImportKind::Funds | ImportKind::Notes => {
                bail!("{} can only be imported from a Notion JSON export", kind)
            }
            _ => Ok(Box::new(CsvImport::new(kind))),
        },
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

async fn get_checkpoint(pool: &SqlitePool, source: &str) -> Result<Option<String>> {
    let hash: Option<String> =
        sqlx::query_scalar("SELECT file_hash FROM import_checkpoints WHERE source = ?")
            .bind(source)
            .fetch_optional(pool)
            .await?;
    Ok(hash)
}

async fn set_checkpoint(
    conn: &mut SqliteConnection,
    source: &str,
    file_hash: &str,
    rows: u64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO import_checkpoints (source, file_hash, row_count, imported_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(source) DO UPDATE SET
            file_hash = excluded.file_hash,
            row_count = excluded.row_count,
            imported_at = excluded.imported_at
        "#,
    )
    .bind(source)
    .bind(file_hash)
    .bind(rows as i64)
    .bind(chrono::Utc::now().naive_utc())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Import one file.
pub async fn run_import(
    pool: &SqlitePool,
    kind: ImportKind,
    path: &Path,
    format: ImportFormat,
    opts: ImportOptions,
) -> Result<ImportReport> {
    let job = job_for(format, kind)?;
    let data =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let source = format!("{}:{}", format, kind);
    let file_hash = sha256_hex(&data);

    let mut report = ImportReport::new(kind, format);
    report.dry_run = opts.dry_run;

    if !opts.force && !opts.dry_run {
        if let Some(previous) = get_checkpoint(pool, &source).await? {
            if previous == file_hash {
                tracing::info!(%source, file = %path.display(), "unchanged, skipping");
                report.unchanged = true;
                return Ok(report);
            }
        }
    }

    let mut tx = db::begin_write(pool).await?;
    job.run(&mut *tx, &data, &mut report)
        .await
        .with_context(|| format!("Failed to import {} from {}", kind, path.display()))?;

    if opts.dry_run {
        tx.rollback().await?;
    } else {
        set_checkpoint(&mut *tx, &source, &file_hash, report.rows).await?;
        tx.commit().await?;
    }

    tracing::info!(
        %source,
        rows = report.rows,
        imported = report.imported,
        updated = report.updated,
        skipped = report.skipped,
        links = report.links,
        dry_run = opts.dry_run,
        "import finished"
    );
    Ok(report)
}

/// Import the newest export of every kind found under `dir`, in
/// dependency order.
pub async fn run_all(
    config: &Config,
    pool: &SqlitePool,
    dir: &Path,
    opts: ImportOptions,
) -> Result<Vec<ImportReport>> {
    let found = exports::discover(dir, &config.import)?;
    if found.is_empty() {
        bail!("No export files found under {}", dir.display());
    }

    let mut reports = Vec::new();
    for kind in ImportKind::ALL {
        let Some(file) = exports::newest(&found, kind) else {
            tracing::debug!(%kind, "no export file");
            continue;
        };
        let report = run_import(pool, kind, &file.path, file.format, opts).await?;
        report.print(&file.path);
        reports.push(report);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in ImportKind::ALL {
            assert_eq!(kind.as_str().parse::<ImportKind>(), Ok(kind));
        }
        assert!("todos".parse::<ImportKind>().is_err());
    }

    #[test]
    fn test_kinds_run_in_dependency_order() {
        let order: Vec<&str> = ImportKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(
            order,
            ["distributors", "lps", "gps", "people", "person-links", "funds", "notes"]
        );
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ImportFormat::from_path(&PathBuf::from("exports/People.CSV")),
            ImportFormat::Csv
        );
        assert_eq!(
            ImportFormat::from_path(&PathBuf::from("exports/notes_2025.json")),
            ImportFormat::Notion
        );
    }

    #[test]
    fn test_unsupported_jobs() {
        assert!(job_for(ImportFormat::Csv, ImportKind::Notes).is_err());
        assert!(job_for(ImportFormat::Notion, ImportKind::PersonLinks).is_err());
        let job = job_for(ImportFormat::Csv, ImportKind::PersonLinks).unwrap();
        assert_eq!(job.kind(), ImportKind::PersonLinks);
        assert_eq!(job.format(), ImportFormat::Csv);
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}

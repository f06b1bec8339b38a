//! Export file discovery.
//!
//! Walks `import.export_dir` and classifies files by the glob patterns
//! configured per import kind. A file may match more than one kind.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{Config, ImportConfig};
use crate::import::{ImportFormat, ImportKind};

#[derive(Debug, Clone, PartialEq)]
pub struct ExportFile {
    pub kind: ImportKind,
    pub format: ImportFormat,
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
}

/// Every export file under `dir`, sorted by kind, then path.
pub fn discover(dir: &Path, config: &ImportConfig) -> Result<Vec<ExportFile>> {
    if !dir.exists() {
        bail!("Export directory does not exist: {}", dir.display());
    }

    let mut matchers = Vec::new();
    for kind in ImportKind::ALL {
        matchers.push((kind, build_globset(&config.patterns_for(kind))?));
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        for (kind, set) in &matchers {
            if !set.is_match(&rel_str) {
                continue;
            }
            found.push(ExportFile {
                kind: *kind,
                format: ImportFormat::from_path(path),
                path: path.to_path_buf(),
                modified: modified_at(path)?,
            });
        }
    }

    found.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.path.cmp(&b.path)));
    Ok(found)
}

/// Most recently modified file of `kind`; ties go to the later path.
pub fn newest(files: &[ExportFile], kind: ImportKind) -> Option<&ExportFile> {
    files
        .iter()
        .filter(|f| f.kind == kind)
        .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)))
}

fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)?
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    Ok(DateTime::<Utc>::from(modified))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// `crm exports`: what `crm import all` would pick up.
pub fn list_exports(config: &Config) -> Result<()> {
    let dir = &config.import.export_dir;
    let found = discover(dir, &config.import)?;

    println!("{:<14} {:<8} {:<20} PATH", "KIND", "FORMAT", "MODIFIED");
    for kind in ImportKind::ALL {
        match newest(&found, kind) {
            Some(file) => println!(
                "{:<14} {:<8} {:<20} {}",
                kind,
                file.format,
                file.modified.format("%Y-%m-%d %H:%M"),
                file.path.display()
            ),
            None => println!("{:<14} {:<8} {:<20} -", kind, "-", "-"),
        }
    }

    let total = found.len();
    println!();
    println!("{} file(s) under {}", total, dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn import_config(dir: &Path, patterns: &[(&str, &str)]) -> ImportConfig {
        let mut map = BTreeMap::new();
        for (kind, pattern) in patterns {
            map.insert(kind.to_string(), vec![pattern.to_string()]);
        }
        ImportConfig {
            export_dir: dir.to_path_buf(),
            patterns: map,
        }
    }

    #[test]
    fn test_discover_classifies_by_pattern() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("2025-06")).unwrap();
        fs::write(tmp.path().join("lps.json"), "{}").unwrap();
        fs::write(tmp.path().join("2025-06/notes_export.json"), "{}").unwrap();
        fs::write(tmp.path().join("2025-06/person-links.csv"), "Name\n").unwrap();
        fs::write(tmp.path().join("readme.txt"), "x").unwrap();

        let config = import_config(tmp.path(), &[]);
        let found = discover(tmp.path(), &config).unwrap();
        let kinds: Vec<(ImportKind, ImportFormat)> =
            found.iter().map(|f| (f.kind, f.format)).collect();
        assert_eq!(
            kinds,
            vec![
                (ImportKind::Lps, ImportFormat::Notion),
                (ImportKind::PersonLinks, ImportFormat::Csv),
                (ImportKind::Notes, ImportFormat::Notion),
            ]
        );
    }

    #[test]
    fn test_configured_patterns_replace_defaults() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("CRM GPs.csv"), "Name\n").unwrap();
        fs::write(tmp.path().join("gps.json"), "{}").unwrap();

        let config = import_config(tmp.path(), &[("gps", "*GPs*.csv")]);
        let found = discover(tmp.path(), &config).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].format, ImportFormat::Csv);
        assert!(found[0].path.ends_with("CRM GPs.csv"));
    }

    #[test]
    fn test_newest_prefers_latest_modification() {
        let older = ExportFile {
            kind: ImportKind::Funds,
            format: ImportFormat::Notion,
            path: PathBuf::from("a/funds.json"),
            modified: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        let newer = ExportFile {
            path: PathBuf::from("b/funds.json"),
            modified: DateTime::<Utc>::from_timestamp(1_800_000_000, 0).unwrap(),
            ..older.clone()
        };
        let files = vec![newer.clone(), older];
        assert_eq!(newest(&files, ImportKind::Funds), Some(&newer));
        assert_eq!(newest(&files, ImportKind::Notes), None);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        let config = import_config(&missing, &[]);
        assert!(discover(&missing, &config).is_err());
    }
}

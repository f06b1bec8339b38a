//! Notion "Export as CSV" importers.
//!
//! CSV exports carry no page ids, so rows are matched by exact name and
//! relation cells (`Acme Capital (https://www.notion.so/…), Other (…)`) are
//! resolved by name too.

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use sqlx::SqliteConnection;

use super::{ImportFormat, ImportJob, ImportKind, ImportReport};
use crate::gps;
use crate::links::{self, Link};
use crate::models::{Distributor, Gp, Lp, Person};
use crate::repo::{self, Entity};

/// Names in a Notion relation cell, deduplicated, in order of appearance.
pub fn parse_notion_links(cell: &str) -> Vec<String> {
    static LINK_RE: OnceLock<Regex> = OnceLock::new();
    let re = LINK_RE.get_or_init(|| {
        Regex::new(r"([^,(]+?)\s*\(https://www\.notion\.so/[^)]+\)").expect("valid link regex")
    });

    let mut names: Vec<String> = Vec::new();
    for cap in re.captures_iter(cell) {
        let name = cap[1].trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// `1,250.5` → `1250.5`; blanks and garbage are `None`.
fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().replace(',', "").parse().ok()
}

/// One CSV record with header lookup by trimmed column name.
struct Row<'a> {
    columns: &'a HashMap<String, usize>,
    record: csv::StringRecord,
}

impl Row<'_> {
    fn get(&self, column: &str) -> Option<String> {
        let idx = *self.columns.get(column)?;
        let value = self.record.get(idx)?.trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    fn number(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(|v| parse_number(&v))
    }

    fn names(&self, column: &str) -> Vec<String> {
        self.get(column)
            .map(|cell| parse_notion_links(&cell))
            .unwrap_or_default()
    }
}

pub struct CsvImport {
    kind: ImportKind,
}

impl CsvImport {
    pub fn new(kind: ImportKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl ImportJob for CsvImport {
    fn kind(&self) -> ImportKind {
        self.kind
    }

    fn format(&self) -> ImportFormat {
        ImportFormat::Csv
    }

    async fn run(
        &self,
        conn: &mut SqliteConnection,
        data: &[u8],
        report: &mut ImportReport,
    ) -> Result<()> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(data);

        let columns: HashMap<String, usize> = reader
            .headers()
            .context("CSV export has no header row")?
            .iter()
            .enumerate()
            .map(|(idx, h)| (h.trim_start_matches('\u{feff}').trim().to_string(), idx))
            .collect();
        if !columns.contains_key("Name") {
            bail!("CSV export has no 'Name' column");
        }

        for (line, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Malformed CSV record {}", line + 1))?;
            report.rows += 1;

            let row = Row {
                columns: &columns,
                record,
            };
            let Some(name) = row.get("Name") else {
                report.skipped += 1;
                tracing::debug!(line = line + 1, "skipping row without a name");
                continue;
            };

            match self.kind {
                ImportKind::Lps => import_lp(conn, &row, name, report).await?,
                ImportKind::Gps => import_gp(conn, &row, name, report).await?,
                ImportKind::People => import_person(conn, &row, name, report).await?,
                ImportKind::Distributors => import_distributor(conn, &row, name, report).await?,
                ImportKind::PersonLinks => import_person_links(conn, &row, name, report).await?,
                ImportKind::Funds | ImportKind::Notes => {
                    bail!("{} can only be imported from a Notion JSON export", self.kind)
                }
            }
        }
        Ok(())
    }
}

/// Insert `row`, or update the row already carrying `name`.
///
/// An update keeps the stored Notion id so a later JSON import still
/// matches the row. Columns in `keep_when_empty` are only overwritten when
/// this row has a value; other exports may have set them.
async fn upsert_by_name<T: Entity>(
    conn: &mut SqliteConnection,
    row: &T,
    name: &str,
    keep_when_empty: &[&str],
) -> Result<(i64, bool)> {
    match repo::id_by_name::<T>(conn, name).await? {
        Some(id) => {
            let mut fields = serde_json::to_value(row)?;
            if let Value::Object(ref mut map) = fields {
                map.remove("notion_id");
                for column in keep_when_empty {
                    if map.get(*column).is_some_and(Value::is_null) {
                        map.remove(*column);
                    }
                }
            }
            repo::patch::<T>(conn, id, fields).await?;
            Ok((id, false))
        }
        None => Ok((T::insert(conn, row).await?, true)),
    }
}

/// Row id for `name`, inserting a bare row when there is none.
async fn find_or_create<T: Entity>(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    if let Some(id) = repo::id_by_name::<T>(conn, name).await? {
        return Ok(id);
    }

    let mut fields = Map::new();
    fields.insert(T::NAME_COLUMN.to_string(), Value::String(name.to_string()));
    let row: T = serde_json::from_value(Value::Object(fields))?;
    let id = T::insert(conn, &row).await?;
    tracing::debug!(table = T::TABLE, id, name, "created from relation cell");
    Ok(id)
}

async fn import_lp(
    conn: &mut SqliteConnection,
    row: &Row<'_>,
    name: String,
    report: &mut ImportReport,
) -> Result<()> {
    let lp = Lp {
        id: 0,
        name,
        aum_billions: row.number("AUM (B)"),
        advisor: row.get("Advisor"),
        intl_alts: row.get("Intl. Atls."),
        intl_mf: row.get("Intl. MF"),
        local_alts: row.get("Local Alts."),
        local_mf: row.get("Local MF"),
        investment_high: row.number("Investment HIGH"),
        investment_low: row.number("Investment LOW"),
        location: row.get("Location"),
        priority: row.get("Priority"),
        type_of_group: row.get("Type of Group"),
        text: row.get("Text"),
        notion_id: None,
    };
    let (id, created) = upsert_by_name(conn, &lp, &lp.name, &[]).await?;
    report.record(created);
    tracing::debug!(id, created, name = %lp.name, "lp");
    Ok(())
}

async fn import_gp(
    conn: &mut SqliteConnection,
    row: &Row<'_>,
    name: String,
    report: &mut ImportReport,
) -> Result<()> {
    let distributor_id = match row.names("👞 CRM Distributor").first() {
        Some(dist_name) => Some(find_or_create::<Distributor>(conn, dist_name).await?),
        None => None,
    };

    let gp = Gp {
        id: 0,
        name,
        location: row.get("Location"),
        contact_level: row.get("Contact Level"),
        flagship_strategy: row.get("Flagship"),
        other_strategies: row.get("Others"),
        note: row.get("Note"),
        distributor_id,
        notion_id: None,
    };
    let (gp_id, created) = upsert_by_name(conn, &gp, &gp.name, &["distributor_id"]).await?;
    report.record(created);

    for lp_name in row.names("💰 CRM LPs") {
        let lp_id = find_or_create::<Lp>(conn, &lp_name).await?;
        if links::link(conn, Link::GpLp, gp_id, lp_id).await? {
            report.links += 1;
        }
    }
    for person_name in row.names("🕴️ CRM People") {
        let person_id = find_or_create::<Person>(conn, &person_name).await?;
        if links::link(conn, Link::GpPerson, gp_id, person_id).await? {
            report.links += 1;
        }
    }

    tracing::debug!(id = gp_id, created, name = %gp.name, "gp");
    Ok(())
}

async fn import_person(
    conn: &mut SqliteConnection,
    row: &Row<'_>,
    name: String,
    report: &mut ImportReport,
) -> Result<()> {
    let person = Person {
        id: 0,
        name,
        position: row.get("Position"),
        email: row.get("Email"),
        cell_phone: row.get("Cell"),
        office_phone: row.get("Office"),
        location: row.get("Location"),
        people_type: row.get("People Type"),
        personal_note: row.get("Personal"),
        notion_id: None,
    };
    let (id, created) = upsert_by_name(conn, &person, &person.name, &[]).await?;
    report.record(created);
    tracing::debug!(id, created, name = %person.name, "person");
    Ok(())
}

async fn import_distributor(
    conn: &mut SqliteConnection,
    row: &Row<'_>,
    name: String,
    report: &mut ImportReport,
) -> Result<()> {
    let distributor = Distributor {
        id: 0,
        name,
        headquarter: row.get("Headquarter"),
        mexico: row.get("Mex"),
        text: row.get("Text"),
        notion_id: None,
    };
    let (distributor_id, created) = upsert_by_name(conn, &distributor, &distributor.name, &[]).await?;
    report.record(created);

    for gp_name in row.names("Managers") {
        match repo::id_by_name::<Gp>(conn, &gp_name).await? {
            Some(gp_id) => {
                if gps::set_distributor(conn, gp_id, distributor_id).await? {
                    report.links += 1;
                }
            }
            None => tracing::debug!(gp = %gp_name, "manager not imported, skipping"),
        }
    }
    for person_name in row.names("🕴️ CRM People") {
        match repo::id_by_name::<Person>(conn, &person_name).await? {
            Some(person_id) => {
                if links::link(conn, Link::DistributorPerson, distributor_id, person_id).await? {
                    report.links += 1;
                }
            }
            None => tracing::debug!(person = %person_name, "person not imported, skipping"),
        }
    }

    tracing::debug!(id = distributor_id, created, name = %distributor.name, "distributor");
    Ok(())
}

/// People export used only for its relation columns.
async fn import_person_links(
    conn: &mut SqliteConnection,
    row: &Row<'_>,
    name: String,
    report: &mut ImportReport,
) -> Result<()> {
    let Some(person_id) = repo::id_by_name::<Person>(conn, &name).await? else {
        report.skipped += 1;
        tracing::debug!(person = %name, "person not imported, skipping");
        return Ok(());
    };
    report.updated += 1;

    for gp_name in row.names("🌆 CRM GPs") {
        if let Some(gp_id) = repo::id_by_name::<Gp>(conn, &gp_name).await? {
            if links::link(conn, Link::GpPerson, gp_id, person_id).await? {
                report.links += 1;
            }
        }
    }
    for lp_name in row.names("💰 CRM LPs") {
        if let Some(lp_id) = repo::id_by_name::<Lp>(conn, &lp_name).await? {
            if links::link(conn, Link::LpPerson, lp_id, person_id).await? {
                report.links += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notion_links() {
        let cell = "Acme Capital (https://www.notion.so/Acme-Capital-1a2b), \
                    Río Partners (https://www.notion.so/Rio-3c4d)";
        assert_eq!(parse_notion_links(cell), vec!["Acme Capital", "Río Partners"]);
    }

    #[test]
    fn test_parse_notion_links_dedupes_and_ignores_plain_text() {
        let cell = "Jane Roe (https://www.notion.so/a), Jane Roe (https://www.notion.so/a)";
        assert_eq!(parse_notion_links(cell), vec!["Jane Roe"]);
        assert!(parse_notion_links("just text, no links").is_empty());
        assert!(parse_notion_links("").is_empty());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1,250.5"), Some(1250.5));
        assert_eq!(parse_number(" 42 "), Some(42.0));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("n/a"), None);
    }

    #[test]
    fn test_row_lookup_trims_headers_and_cells() {
        let columns: HashMap<String, usize> = [("Name".to_string(), 0), ("🕴️ CRM People".to_string(), 1)]
            .into_iter()
            .collect();
        let row = Row {
            columns: &columns,
            record: csv::StringRecord::from(vec![" Acme ", "Ann (https://www.notion.so/x)"]),
        };
        assert_eq!(row.get("Name").as_deref(), Some("Acme"));
        assert_eq!(row.names("🕴️ CRM People"), vec!["Ann"]);
        assert_eq!(row.get("Missing"), None);
    }
}

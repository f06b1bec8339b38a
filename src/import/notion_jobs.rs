//! Notion JSON export importers.
//!
//! Rows are upserted by page id, so re-running an export updates in place.
//! Relations point at other pages by id; targets that have not been
//! imported yet are skipped.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::SqliteConnection;

use super::{ImportFormat, ImportJob, ImportKind, ImportReport};
use crate::funds;
use crate::links::{self, Link, NoteRelationships};
use crate::models::{parse_flexible_datetime, Distributor, Fund, Gp, Lp, Note, Person};
use crate::notion::{self, Export, Page, PropertyValue};
use crate::repo::{self, Entity};

pub struct NotionImport {
    kind: ImportKind,
}

impl NotionImport {
    pub fn new(kind: ImportKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl ImportJob for NotionImport {
    fn kind(&self) -> ImportKind {
        self.kind
    }

    fn format(&self) -> ImportFormat {
        ImportFormat::Notion
    }

    async fn run(
        &self,
        conn: &mut SqliteConnection,
        data: &[u8],
        report: &mut ImportReport,
    ) -> Result<()> {
        let export: Export =
            serde_json::from_slice(data).context("Not a Notion JSON export")?;

        for page in &export.pages {
            report.rows += 1;
            match self.kind {
                ImportKind::Distributors => import_distributor(conn, page, report).await?,
                ImportKind::Lps => import_lp(conn, page, report).await?,
                ImportKind::Gps => import_gp(conn, page, report).await?,
                ImportKind::People => import_person(conn, page, report).await?,
                ImportKind::Funds => import_fund(conn, page, report).await?,
                ImportKind::Notes => import_note(conn, page, report).await?,
                ImportKind::PersonLinks => bail!("person-links can only be imported from CSV"),
            }
        }

        if self.kind == ImportKind::Gps {
            let linked = funds::link_gps_by_notion_id(conn).await?;
            if linked > 0 {
                tracing::info!(funds = linked, "linked funds to newly imported GPs");
            }
        }
        Ok(())
    }
}

/// Trimmed name property, or `None` (and a skip) when blank.
fn page_name(page: &Page, property: &str, report: &mut ImportReport) -> Option<String> {
    let name = page.text(property).map(|s| s.trim().to_string());
    if name.is_none() {
        report.skipped += 1;
        tracing::debug!(page = %page.id, "skipping page without a name");
    }
    name
}

/// Local ids of the already-imported pages a relation points at.
async fn resolve<T: Entity>(conn: &mut SqliteConnection, notion_ids: &[String]) -> Result<Vec<i64>> {
    let mut ids = Vec::with_capacity(notion_ids.len());
    for notion_id in notion_ids {
        match repo::id_by_notion_id::<T>(conn, notion_id).await? {
            Some(id) => ids.push(id),
            None => tracing::debug!(
                target_table = T::TABLE,
                notion_id = %notion_id,
                "relation target not imported, skipping"
            ),
        }
    }
    Ok(ids)
}

async fn import_distributor(
    conn: &mut SqliteConnection,
    page: &Page,
    report: &mut ImportReport,
) -> Result<()> {
    let Some(name) = page_name(page, "Name", report) else {
        return Ok(());
    };

    let mut row = Distributor {
        id: 0,
        name,
        headquarter: page.text("Headquarter"),
        mexico: page.text("Mex"),
        text: page.text("Text"),
        notion_id: Some(page.id.clone()),
    };
    let (id, created) = repo::upsert_by_notion_id(conn, &mut row).await?;
    report.record(created);
    tracing::debug!(id, created, name = %row.name, "distributor");
    Ok(())
}

async fn import_lp(conn: &mut SqliteConnection, page: &Page, report: &mut ImportReport) -> Result<()> {
    let Some(name) = page_name(page, "Name", report) else {
        return Ok(());
    };

    let mut row = Lp {
        id: 0,
        name,
        aum_billions: page.number("AUM (B)"),
        advisor: page.text("Advisor"),
        intl_alts: page.text("Intl. Atls."),
        intl_mf: page.text("Intl. MF"),
        local_alts: page.text("Local Alts."),
        local_mf: page.text("Local MF"),
        investment_high: page.number("Investment HIGH"),
        investment_low: page.number("Investment LOW"),
        location: page.text("Location"),
        priority: page.text("Priority"),
        type_of_group: page.text("Type of Group"),
        text: page.text("Text"),
        notion_id: Some(page.id.clone()),
    };
    let (id, created) = repo::upsert_by_notion_id(conn, &mut row).await?;
    report.record(created);
    tracing::debug!(id, created, name = %row.name, "lp");
    Ok(())
}

async fn import_gp(conn: &mut SqliteConnection, page: &Page, report: &mut ImportReport) -> Result<()> {
    let Some(name) = page_name(page, "Name", report) else {
        return Ok(());
    };

    let distributors = resolve::<Distributor>(conn, &page.relation("👞 CRM Distributor")).await?;
    let distributor_id = distributors.first().copied();
    if distributor_id.is_some() {
        report.links += 1;
    }

    let mut row = Gp {
        id: 0,
        name,
        location: page.text("Location"),
        contact_level: page.text("Contact Level"),
        flagship_strategy: page.text("Flagship"),
        other_strategies: page.text("Others"),
        note: page.text("Note"),
        distributor_id,
        notion_id: Some(page.id.clone()),
    };
    let (id, created) = repo::upsert_by_notion_id(conn, &mut row).await?;
    report.record(created);
    tracing::debug!(id, created, name = %row.name, "gp");
    Ok(())
}

async fn import_person(
    conn: &mut SqliteConnection,
    page: &Page,
    report: &mut ImportReport,
) -> Result<()> {
    let Some(name) = page_name(page, "Name", report) else {
        return Ok(());
    };

    let mut row = Person {
        id: 0,
        name,
        position: page.text("Position"),
        email: page.text("Email"),
        cell_phone: page.text("Cell"),
        office_phone: page.text("Office"),
        location: page.text("Location"),
        people_type: page.text("People Type"),
        personal_note: page.text("Personal"),
        notion_id: Some(page.id.clone()),
    };
    let (person_id, created) = repo::upsert_by_notion_id(conn, &mut row).await?;
    report.record(created);

    for lp_id in resolve::<Lp>(conn, &page.relation("💰 CRM LPs")).await? {
        if links::link(conn, Link::LpPerson, lp_id, person_id).await? {
            report.links += 1;
        }
    }
    for gp_id in resolve::<Gp>(conn, &page.relation("🌆 CRM GPs")).await? {
        if links::link(conn, Link::GpPerson, gp_id, person_id).await? {
            report.links += 1;
        }
    }
    for distributor_id in resolve::<Distributor>(conn, &page.relation("👞 CRM Distributor")).await? {
        if links::link(conn, Link::DistributorPerson, distributor_id, person_id).await? {
            report.links += 1;
        }
    }

    tracing::debug!(id = person_id, created, name = %row.name, "person");
    Ok(())
}

async fn import_fund(
    conn: &mut SqliteConnection,
    page: &Page,
    report: &mut ImportReport,
) -> Result<()> {
    let Some(fund_name) = page_name(page, "Fund Name", report) else {
        return Ok(());
    };

    let gp_notion_id = page.relation("GP").into_iter().next();
    let gp_id = match &gp_notion_id {
        Some(notion_id) => repo::id_by_notion_id::<Gp>(conn, notion_id).await?,
        None => None,
    };
    if gp_id.is_some() {
        report.links += 1;
    }

    let mut row = Fund {
        id: 0,
        fund_name,
        gp_id,
        gp_notion_id,
        geography: page.text("Geography"),
        target_multiple: page.number("Target Multiple"),
        status: page.text("Status"),
        days_to_rs: page.number("Days to RS"),
        target_irr: page.text("Target IRR"),
        hard_cap_mn: page.number("Hard Cap mn"),
        target_mn: page.number("Target mn"),
        roadshow_date: page.text("Roadshow Date"),
        sectors: page.text("Sectors"),
        note: page.text("Note"),
        potential: page.text("Potential"),
        asset_class: page.text("Asset Class"),
        current_lps: page.text("Current LPs"),
        launch: page.text("Launch"),
        roadshows: page.text("Roadshows"),
        final_close: page.text("Final Close"),
        closed: page.checkbox("Closed"),
        notion_id: Some(page.id.clone()),
    };
    let (id, created) = repo::upsert_by_notion_id(conn, &mut row).await?;
    report.record(created);
    tracing::debug!(id, created, name = %row.fund_name, "fund");
    Ok(())
}

/// Note date: the `Date` property, else the page's creation time, else
/// 1900-01-01 so undated notes sort last.
fn note_date(page: &Page) -> NaiveDateTime {
    page.text("Date")
        .and_then(|d| parse_flexible_datetime(&d))
        .or_else(|| page.created_time.as_deref().and_then(parse_flexible_datetime))
        .unwrap_or_else(undated)
}

fn undated() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

async fn import_note(
    conn: &mut SqliteConnection,
    page: &Page,
    report: &mut ImportReport,
) -> Result<()> {
    let content_json = if page.blocks.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&page.blocks)?)
    };
    let rendered = notion::render_blocks(&page.blocks);
    let ai_summary = page.text("AI summary");

    let existing = match repo::id_by_notion_id::<Note>(conn, &page.id).await? {
        Some(id) => Some(repo::get_in::<Note>(conn, id).await?),
        None => None,
    };

    let mut row = Note {
        id: 0,
        name: page.text("Name").map(|s| s.trim().to_string()),
        date: note_date(page),
        raw_notes: content_json.clone().unwrap_or_default(),
        summary: ai_summary.clone().unwrap_or_default(),
        content_text: Some(rendered.text).filter(|t| !t.is_empty()),
        content_json,
        image_paths: Some(rendered.image_paths.join(",")).filter(|p| !p.is_empty()),
        fundraise: match page.property("Fundraise") {
            PropertyValue::Relation(_) => None,
            other => other.into_text(),
        },
        interest: page.text("Interest"),
        contact_type: page.text("Contact Type"),
        local_mf: page.text("Local MF"),
        local_alts: page.text("Local Alts."),
        intl_mf: page.text("Intl. MF"),
        intl_alts: page.text("Intl. Alts"),
        roadshows: page.text("Roadshows"),
        useful: page.checkbox("Useful") || page.property("PIN").is_set(),
        ai_summary,
        // Recorded locally, never part of an export.
        audio_path: existing.as_ref().and_then(|n| n.audio_path.clone()),
        transcription_path: existing.as_ref().and_then(|n| n.transcription_path.clone()),
        notion_id: Some(page.id.clone()),
    };
    let (note_id, created) = repo::upsert_by_notion_id(conn, &mut row).await?;
    report.record(created);

    let rels = NoteRelationships {
        lp_ids: resolve::<Lp>(conn, &page.relation("CRM LPs")).await?,
        gp_ids: resolve::<Gp>(conn, &page.relation("CRM GPs")).await?,
        participant_ids: links::child_ids(conn, Link::NotePerson, note_id).await?,
        fund_ids: resolve::<Fund>(conn, &page.relation("Fundraise")).await?,
        distributor_ids: resolve::<Distributor>(conn, &page.relation("CRM Distributors")).await?,
    };
    report.links += (rels.lp_ids.len() + rels.gp_ids.len() + rels.fund_ids.len()
        + rels.distributor_ids.len()) as u64;
    links::replace_note_relationships(conn, note_id, &rels).await?;

    tracing::debug!(id = note_id, created, "note");
    Ok(())
}

//! Sales funnel and roadshow status tracking.
//!
//! `fund_lp_interest` and `roadshow_lp_status` hold the stage a person set by
//! hand plus two denormalized columns, `last_contact_date` and
//! `last_note_id`, pointing at the most recent note linked to both the LP and
//! the fund (ties go to the higher note id). Anything that changes a note's
//! links, date or existence calls [`note_changed`] inside the same
//! transaction so those columns never go stale.
//!
//! LPs without a record are reported as `inactive` with a live-computed last
//! contact.

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::error::{CrmError, Result};
use crate::models::{Fund, InterestStage, Lp, Roadshow, RoadshowStatus};
use crate::repo;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FunnelEntry {
    pub lp_id: i64,
    pub lp_name: String,
    pub interest: InterestStage,
    pub last_contact_date: Option<NaiveDateTime>,
    pub last_note_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RoadshowEntry {
    pub lp_id: i64,
    pub lp_name: String,
    pub status: RoadshowStatus,
    pub last_contact_date: Option<NaiveDateTime>,
    pub last_note_id: Option<i64>,
}

/// One LP's funnel record for one fund.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LpInterest {
    pub fund_id: i64,
    pub fund_name: String,
    pub interest: InterestStage,
    pub last_contact_date: Option<NaiveDateTime>,
    pub last_note_id: Option<i64>,
    pub updated_at: NaiveDateTime,
}

#[derive(FromRow)]
struct BoardRow {
    lp_id: i64,
    lp_name: String,
    stage: String,
    last_contact_date: Option<NaiveDateTime>,
    last_note_id: Option<i64>,
}

#[derive(FromRow)]
struct InterestRow {
    fund_id: i64,
    fund_name: String,
    interest: String,
    last_contact_date: Option<NaiveDateTime>,
    last_note_id: Option<i64>,
    updated_at: NaiveDateTime,
}

/// Counts reported by [`refresh_all`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub created: u64,
    pub interests: u64,
    pub roadshow_statuses: u64,
}

/// Newest note linked to both `fund_expr` and `lp_expr`.
fn latest_note_sql(fund_expr: &str, lp_expr: &str) -> String {
    format!(
        "SELECT n.id FROM note n \
         JOIN note_fund_link nf ON nf.note_id = n.id \
         JOIN note_lp_link nl ON nl.note_id = n.id \
         WHERE nf.fund_id = {fund_expr} AND nl.lp_id = {lp_expr} \
         ORDER BY n.date DESC, n.id DESC LIMIT 1"
    )
}

/// Board query shared by the fund funnel and the roadshow board.
///
/// Binds: `?1` fund id, `?2` show every LP, `?3` status table key (fund id
/// or roadshow id).
fn board_sql(table: &str, key_column: &str, stage_column: &str) -> String {
    let live = latest_note_sql("?1", "l.id");
    format!(
        r#"
        SELECT base.lp_id, base.lp_name, base.stage, base.last_note_id,
               (SELECT date FROM note WHERE id = base.last_note_id) AS last_contact_date
        FROM (
            SELECT l.id AS lp_id,
                   l.name AS lp_name,
                   COALESCE(s.{stage_column}, 'inactive') AS stage,
                   CASE WHEN s.lp_id IS NOT NULL THEN s.last_note_id ELSE ({live}) END
                       AS last_note_id
            FROM lp l
            LEFT JOIN {table} s ON s.{key_column} = ?3 AND s.lp_id = l.id
            WHERE ?2
               OR s.lp_id IS NOT NULL
               OR EXISTS (
                   SELECT 1 FROM note_fund_link nf
                   JOIN note_lp_link nl ON nl.note_id = nf.note_id
                   WHERE nf.fund_id = ?1 AND nl.lp_id = l.id
               )
        ) base
        "#
    )
}

async fn board_rows(
    pool: &SqlitePool,
    table: &str,
    key_column: &str,
    stage_column: &str,
    fund_id: i64,
    key: i64,
    all: bool,
) -> Result<Vec<BoardRow>> {
    let rows = sqlx::query_as::<_, BoardRow>(&board_sql(table, key_column, stage_column))
        .bind(fund_id)
        .bind(all)
        .bind(key)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn fund_funnel(pool: &SqlitePool, fund_id: i64, all: bool) -> Result<Vec<FunnelEntry>> {
    repo::get::<Fund>(pool, fund_id).await?;

    let rows = board_rows(
        pool,
        "fund_lp_interest",
        "fund_id",
        "interest",
        fund_id,
        fund_id,
        all,
    )
    .await?;

    let mut entries: Vec<FunnelEntry> = rows
        .into_iter()
        .map(|row| FunnelEntry {
            lp_id: row.lp_id,
            lp_name: row.lp_name,
            interest: InterestStage::parse(&row.stage).unwrap_or_default(),
            last_contact_date: row.last_contact_date,
            last_note_id: row.last_note_id,
        })
        .collect();
    entries.sort_by(|a, b| {
        a.interest
            .rank()
            .cmp(&b.interest.rank())
            .then_with(|| a.lp_name.to_lowercase().cmp(&b.lp_name.to_lowercase()))
    });
    Ok(entries)
}

pub async fn roadshow_board(
    pool: &SqlitePool,
    roadshow_id: i64,
    all: bool,
) -> Result<Vec<RoadshowEntry>> {
    let roadshow = repo::get::<Roadshow>(pool, roadshow_id).await?;

    let rows = board_rows(
        pool,
        "roadshow_lp_status",
        "roadshow_id",
        "status",
        roadshow.fund_id,
        roadshow_id,
        all,
    )
    .await?;

    let mut entries: Vec<RoadshowEntry> = rows
        .into_iter()
        .map(|row| RoadshowEntry {
            lp_id: row.lp_id,
            lp_name: row.lp_name,
            status: RoadshowStatus::parse(&row.stage).unwrap_or_default(),
            last_contact_date: row.last_contact_date,
            last_note_id: row.last_note_id,
        })
        .collect();
    entries.sort_by(|a, b| {
        a.status
            .rank()
            .cmp(&b.status.rank())
            .then_with(|| a.lp_name.to_lowercase().cmp(&b.lp_name.to_lowercase()))
    });
    Ok(entries)
}

/// Every funnel record of an LP, most advanced stage first.
pub async fn lp_interests(pool: &SqlitePool, lp_id: i64) -> Result<Vec<LpInterest>> {
    repo::get::<Lp>(pool, lp_id).await?;

    let rows = sqlx::query_as::<_, InterestRow>(
        r#"
        SELECT i.fund_id, f.fund_name, i.interest, i.last_contact_date, i.last_note_id,
               i.updated_at
        FROM fund_lp_interest i
        JOIN fund f ON f.id = i.fund_id
        WHERE i.lp_id = ?
        "#,
    )
    .bind(lp_id)
    .fetch_all(pool)
    .await?;

    let mut interests: Vec<LpInterest> = rows
        .into_iter()
        .map(|row| LpInterest {
            fund_id: row.fund_id,
            fund_name: row.fund_name,
            interest: InterestStage::parse(&row.interest).unwrap_or_default(),
            last_contact_date: row.last_contact_date,
            last_note_id: row.last_note_id,
            updated_at: row.updated_at,
        })
        .collect();
    interests.sort_by(|a, b| {
        a.interest
            .rank()
            .cmp(&b.interest.rank())
            .then_with(|| a.fund_name.to_lowercase().cmp(&b.fund_name.to_lowercase()))
    });
    Ok(interests)
}

async fn ensure_lp(conn: &mut SqliteConnection, lp_id: i64) -> Result<()> {
    if !repo::exists::<Lp>(conn, lp_id).await? {
        return Err(CrmError::not_found("lp", lp_id));
    }
    Ok(())
}

/// Set an LP's stage for a fund, creating the record if needed.
pub async fn set_interest(
    conn: &mut SqliteConnection,
    fund_id: i64,
    lp_id: i64,
    stage: InterestStage,
) -> Result<()> {
    if !repo::exists::<Fund>(conn, fund_id).await? {
        return Err(CrmError::not_found("fund", fund_id));
    }
    ensure_lp(conn, lp_id).await?;

    sqlx::query(
        r#"
        INSERT INTO fund_lp_interest (fund_id, lp_id, interest, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (fund_id, lp_id)
        DO UPDATE SET interest = excluded.interest, updated_at = excluded.updated_at
        "#,
    )
    .bind(fund_id)
    .bind(lp_id)
    .bind(stage.as_str())
    .bind(Utc::now().naive_utc())
    .execute(&mut *conn)
    .await?;

    refresh_interest_rows(conn, Scope::Pair(fund_id, lp_id)).await?;
    tracing::debug!(fund_id, lp_id, interest = stage.as_str(), "interest set");
    Ok(())
}

/// Drop an LP's funnel record for a fund; it then reads as `inactive`.
pub async fn reset_interest(conn: &mut SqliteConnection, fund_id: i64, lp_id: i64) -> Result<()> {
    if !repo::exists::<Fund>(conn, fund_id).await? {
        return Err(CrmError::not_found("fund", fund_id));
    }
    ensure_lp(conn, lp_id).await?;

    sqlx::query("DELETE FROM fund_lp_interest WHERE fund_id = ? AND lp_id = ?")
        .bind(fund_id)
        .bind(lp_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn set_roadshow_status(
    conn: &mut SqliteConnection,
    roadshow_id: i64,
    lp_id: i64,
    status: RoadshowStatus,
) -> Result<()> {
    if !repo::exists::<Roadshow>(conn, roadshow_id).await? {
        return Err(CrmError::not_found("roadshow", roadshow_id));
    }
    ensure_lp(conn, lp_id).await?;

    sqlx::query(
        r#"
        INSERT INTO roadshow_lp_status (roadshow_id, lp_id, status, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (roadshow_id, lp_id)
        DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at
        "#,
    )
    .bind(roadshow_id)
    .bind(lp_id)
    .bind(status.as_str())
    .bind(Utc::now().naive_utc())
    .execute(&mut *conn)
    .await?;

    refresh_status_rows(conn, Scope::Pair(roadshow_id, lp_id)).await?;
    tracing::debug!(roadshow_id, lp_id, status = status.as_str(), "roadshow status set");
    Ok(())
}

pub async fn reset_roadshow_status(
    conn: &mut SqliteConnection,
    roadshow_id: i64,
    lp_id: i64,
) -> Result<()> {
    if !repo::exists::<Roadshow>(conn, roadshow_id).await? {
        return Err(CrmError::not_found("roadshow", roadshow_id));
    }
    ensure_lp(conn, lp_id).await?;

    sqlx::query("DELETE FROM roadshow_lp_status WHERE roadshow_id = ? AND lp_id = ?")
        .bind(roadshow_id)
        .bind(lp_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Funds a note is currently linked to.
pub async fn note_fund_ids(conn: &mut SqliteConnection, note_id: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar("SELECT fund_id FROM note_fund_link WHERE note_id = ?")
        .bind(note_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(ids)
}

/// Bring funnel records up to date after a note was created, edited,
/// relinked or deleted.
///
/// `funds_before` are the funds the note was linked to before the change
/// (empty for a new note). Every fund the note touches now gets an
/// `inactive` record for each of the note's LPs, and the last-contact
/// columns of every affected fund and its roadshows are recomputed.
pub async fn note_changed(
    conn: &mut SqliteConnection,
    note_id: i64,
    funds_before: &[i64],
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO fund_lp_interest (fund_id, lp_id, interest, updated_at)
        SELECT nf.fund_id, nl.lp_id, 'inactive', ?
        FROM note_fund_link nf
        JOIN note_lp_link nl ON nl.note_id = nf.note_id
        WHERE nf.note_id = ?
        "#,
    )
    .bind(Utc::now().naive_utc())
    .bind(note_id)
    .execute(&mut *conn)
    .await?;

    let mut funds = note_fund_ids(conn, note_id).await?;
    funds.extend_from_slice(funds_before);
    funds.sort_unstable();
    funds.dedup();

    for fund_id in funds {
        refresh_fund(conn, fund_id).await?;
    }
    Ok(())
}

/// Recompute the last-contact columns of one fund's records and of the
/// records of its roadshows.
pub async fn refresh_fund(conn: &mut SqliteConnection, fund_id: i64) -> Result<()> {
    refresh_interest_rows(conn, Scope::Fund(fund_id)).await?;
    refresh_status_rows(conn, Scope::Fund(fund_id)).await?;
    Ok(())
}

/// Which records a refresh touches. `Pair` is `(fund_id, lp_id)` for
/// interests and `(roadshow_id, lp_id)` for roadshow statuses.
#[derive(Debug, Clone, Copy)]
enum Scope {
    All,
    Fund(i64),
    Pair(i64, i64),
}

impl Scope {
    fn bind_to<'q>(
        self,
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        match self {
            Scope::All => query,
            Scope::Fund(fund_id) => query.bind(fund_id),
            Scope::Pair(key, lp_id) => query.bind(key).bind(lp_id),
        }
    }
}

async fn refresh_interest_rows(conn: &mut SqliteConnection, scope: Scope) -> Result<u64> {
    let live = latest_note_sql("fund_lp_interest.fund_id", "fund_lp_interest.lp_id");
    let filter = match scope {
        Scope::All => "",
        Scope::Fund(_) => "WHERE fund_id = ?",
        Scope::Pair(..) => "WHERE fund_id = ? AND lp_id = ?",
    };
    let sql = format!(
        "UPDATE fund_lp_interest SET last_note_id = ({live}), \
         last_contact_date = (SELECT date FROM note WHERE id = ({live})) {filter}"
    );
    let result = scope.bind_to(sqlx::query(&sql)).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

async fn refresh_status_rows(conn: &mut SqliteConnection, scope: Scope) -> Result<u64> {
    let fund_of_roadshow =
        "(SELECT fund_id FROM roadshow WHERE id = roadshow_lp_status.roadshow_id)";
    let live = latest_note_sql(fund_of_roadshow, "roadshow_lp_status.lp_id");
    let filter = match scope {
        Scope::All => "",
        Scope::Fund(_) => "WHERE roadshow_id IN (SELECT id FROM roadshow WHERE fund_id = ?)",
        Scope::Pair(..) => "WHERE roadshow_id = ? AND lp_id = ?",
    };
    let sql = format!(
        "UPDATE roadshow_lp_status SET last_note_id = ({live}), \
         last_contact_date = (SELECT date FROM note WHERE id = ({live})) {filter}"
    );
    let result = scope.bind_to(sqlx::query(&sql)).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Rebuild every funnel record from the note links (`crm funnel refresh`).
pub async fn refresh_all(conn: &mut SqliteConnection) -> Result<RefreshReport> {
    let created = sqlx::query(
        r#"
        INSERT OR IGNORE INTO fund_lp_interest (fund_id, lp_id, interest, updated_at)
        SELECT DISTINCT nf.fund_id, nl.lp_id, 'inactive', ?
        FROM note_fund_link nf
        JOIN note_lp_link nl ON nl.note_id = nf.note_id
        "#,
    )
    .bind(Utc::now().naive_utc())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let interests = refresh_interest_rows(conn, Scope::All).await?;
    let roadshow_statuses = refresh_status_rows(conn, Scope::All).await?;

    Ok(RefreshReport {
        created,
        interests,
        roadshow_statuses,
    })
}

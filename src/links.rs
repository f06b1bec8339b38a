//! Junction tables.
//!
//! Every many-to-many relation is a two-column table with a composite
//! primary key. [`Link`] names the table and its two sides; `children` walks
//! left → right (an LP's people) and `parents` walks right → left (a
//! person's LPs).
//!
//! Changes to a note's LP or fund links feed the sales funnel through
//! [`funnel::note_changed`].

use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{CrmError, Result};
use crate::funnel;
use crate::repo::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    GpLp,
    GpPerson,
    LpPerson,
    DistributorPerson,
    NoteLp,
    NoteGp,
    NoteFund,
    NoteDistributor,
    NotePerson,
    TodoLp,
}

impl Link {
    pub fn table(self) -> &'static str {
        match self {
            Link::GpLp => "gp_lp_link",
            Link::GpPerson => "gp_person_link",
            Link::LpPerson => "lp_person_link",
            Link::DistributorPerson => "distributor_person_link",
            Link::NoteLp => "note_lp_link",
            Link::NoteGp => "note_gp_link",
            Link::NoteFund => "note_fund_link",
            Link::NoteDistributor => "note_distributor_link",
            Link::NotePerson => "note_person_link",
            Link::TodoLp => "todo_lp_link",
        }
    }

    /// `(left table, right table)`; the columns are `<table>_id`.
    pub fn sides(self) -> (&'static str, &'static str) {
        match self {
            Link::GpLp => ("gp", "lp"),
            Link::GpPerson => ("gp", "person"),
            Link::LpPerson => ("lp", "person"),
            Link::DistributorPerson => ("distributor", "person"),
            Link::NoteLp => ("note", "lp"),
            Link::NoteGp => ("note", "gp"),
            Link::NoteFund => ("note", "fund"),
            Link::NoteDistributor => ("note", "distributor"),
            Link::NotePerson => ("note", "person"),
            Link::TodoLp => ("todo", "lp"),
        }
    }

    fn touches_funnel(self) -> bool {
        matches!(self, Link::NoteLp | Link::NoteFund)
    }
}

async fn row_exists(conn: &mut SqliteConnection, table: &'static str, id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

/// Link `left` to `right`. Returns `false` if the link already existed.
///
/// Both rows must exist; a missing one is reported as not found.
pub async fn link(conn: &mut SqliteConnection, kind: Link, left: i64, right: i64) -> Result<bool> {
    let (left_table, right_table) = kind.sides();
    if !row_exists(conn, left_table, left).await? {
        return Err(CrmError::not_found(left_table, left));
    }
    if !row_exists(conn, right_table, right).await? {
        return Err(CrmError::not_found(right_table, right));
    }

    let funds_before = if kind.touches_funnel() {
        funnel::note_fund_ids(conn, left).await?
    } else {
        Vec::new()
    };

    let result = sqlx::query(&format!(
        "INSERT OR IGNORE INTO {} ({left_table}_id, {right_table}_id) VALUES (?, ?)",
        kind.table()
    ))
    .bind(left)
    .bind(right)
    .execute(&mut *conn)
    .await?;
    let created = result.rows_affected() > 0;

    if created && kind.touches_funnel() {
        funnel::note_changed(conn, left, &funds_before).await?;
    }
    Ok(created)
}

/// Remove a link. Returns `false` if there was nothing to remove.
pub async fn unlink(
    conn: &mut SqliteConnection,
    kind: Link,
    left: i64,
    right: i64,
) -> Result<bool> {
    let (left_table, right_table) = kind.sides();

    let funds_before = if kind.touches_funnel() {
        funnel::note_fund_ids(conn, left).await?
    } else {
        Vec::new()
    };

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE {left_table}_id = ? AND {right_table}_id = ?",
        kind.table()
    ))
    .bind(left)
    .bind(right)
    .execute(&mut *conn)
    .await?;
    let removed = result.rows_affected() > 0;

    if removed && kind.touches_funnel() {
        funnel::note_changed(conn, left, &funds_before).await?;
    }
    Ok(removed)
}

/// Rows on the right side linked to `left_id`.
pub async fn children<T: Entity>(pool: &SqlitePool, kind: Link, left_id: i64) -> Result<Vec<T>> {
    let (left_table, right_table) = kind.sides();
    let rows = sqlx::query_as::<_, T>(&format!(
        "SELECT t.* FROM {table} t JOIN {link} j ON j.{right_table}_id = t.id \
         WHERE j.{left_table}_id = ? ORDER BY {order}",
        table = T::TABLE,
        link = kind.table(),
        order = T::ORDER_BY,
    ))
    .bind(left_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Rows on the left side linked to `right_id`.
pub async fn parents<T: Entity>(pool: &SqlitePool, kind: Link, right_id: i64) -> Result<Vec<T>> {
    let (left_table, right_table) = kind.sides();
    let rows = sqlx::query_as::<_, T>(&format!(
        "SELECT t.* FROM {table} t JOIN {link} j ON j.{left_table}_id = t.id \
         WHERE j.{right_table}_id = ? ORDER BY {order}",
        table = T::TABLE,
        link = kind.table(),
        order = T::ORDER_BY,
    ))
    .bind(right_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Ids on the right side linked to `left_id`.
pub async fn child_ids(conn: &mut SqliteConnection, kind: Link, left_id: i64) -> Result<Vec<i64>> {
    let (left_table, right_table) = kind.sides();
    let ids = sqlx::query_scalar(&format!(
        "SELECT {right_table}_id FROM {} WHERE {left_table}_id = ? ORDER BY {right_table}_id",
        kind.table()
    ))
    .bind(left_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

/// Body of `POST /notes/{id}/relationships`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NoteRelationships {
    pub lp_ids: Vec<i64>,
    pub gp_ids: Vec<i64>,
    pub participant_ids: Vec<i64>,
    pub fund_ids: Vec<i64>,
    pub distributor_ids: Vec<i64>,
}

impl NoteRelationships {
    fn by_link(&self) -> [(Link, &[i64]); 5] {
        [
            (Link::NoteLp, self.lp_ids.as_slice()),
            (Link::NoteGp, self.gp_ids.as_slice()),
            (Link::NotePerson, self.participant_ids.as_slice()),
            (Link::NoteFund, self.fund_ids.as_slice()),
            (Link::NoteDistributor, self.distributor_ids.as_slice()),
        ]
    }
}

/// Replace every LP, GP, participant, fund and distributor link of a note.
///
/// Run inside a transaction: an unknown id fails with a foreign-key
/// conflict and the caller's rollback keeps the previous links.
pub async fn replace_note_relationships(
    conn: &mut SqliteConnection,
    note_id: i64,
    rels: &NoteRelationships,
) -> Result<()> {
    if !row_exists(conn, "note", note_id).await? {
        return Err(CrmError::not_found("note", note_id));
    }

    let funds_before = funnel::note_fund_ids(conn, note_id).await?;

    for (kind, ids) in rels.by_link() {
        let (_, right_table) = kind.sides();
        sqlx::query(&format!("DELETE FROM {} WHERE note_id = ?", kind.table()))
            .bind(note_id)
            .execute(&mut *conn)
            .await?;

        let insert = format!(
            "INSERT OR IGNORE INTO {} (note_id, {right_table}_id) VALUES (?, ?)",
            kind.table()
        );
        for id in ids {
            sqlx::query(&insert)
                .bind(note_id)
                .bind(*id)
                .execute(&mut *conn)
                .await?;
        }
    }

    funnel::note_changed(conn, note_id, &funds_before).await?;
    tracing::debug!(
        note_id,
        lps = rels.lp_ids.len(),
        gps = rels.gp_ids.len(),
        funds = rels.fund_ids.len(),
        "note relationships replaced"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationships_default_to_empty() {
        let rels: NoteRelationships = serde_json::from_str(r#"{"lp_ids": [3]}"#).unwrap();
        assert_eq!(rels.lp_ids, vec![3]);
        assert!(rels.gp_ids.is_empty());
        assert!(rels.participant_ids.is_empty());
        assert!(rels.distributor_ids.is_empty());
    }

    #[test]
    fn test_only_note_lp_and_fund_links_touch_funnel() {
        assert!(Link::NoteLp.touches_funnel());
        assert!(Link::NoteFund.touches_funnel());
        assert!(!Link::NoteGp.touches_funnel());
        assert!(!Link::TodoLp.touches_funnel());
    }

    #[test]
    fn test_link_columns_follow_table_names() {
        for kind in [Link::GpLp, Link::DistributorPerson, Link::TodoLp] {
            let (left, right) = kind.sides();
            assert!(kind.table().starts_with(left));
            assert!(kind.table().contains(right));
        }
    }
}

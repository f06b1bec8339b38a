//! Roadshows: marketing trips for a fund.

use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::Result;
use crate::funnel;
use crate::models::Roadshow;
use crate::repo::Entity;

#[async_trait]
impl Entity for Roadshow {
    const TABLE: &'static str = "roadshow";
    const LABEL: &'static str = "roadshow";
    const NAME_COLUMN: &'static str = "name";
    const ORDER_BY: &'static str = "start_date IS NULL, start_date, name COLLATE NOCASE, id";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn notion_id(&self) -> Option<&str> {
        None
    }

    async fn insert(conn: &mut SqliteConnection, rs: &Self) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO roadshow (fund_id, name, location, start_date, end_date, notes)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(rs.fund_id)
        .bind(&rs.name)
        .bind(&rs.location)
        .bind(rs.start_date)
        .bind(rs.end_date)
        .bind(&rs.notes)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Moving a roadshow to another fund re-derives its LPs' last contact.
    async fn update(conn: &mut SqliteConnection, rs: &Self) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE roadshow SET
                fund_id = ?, name = ?, location = ?, start_date = ?, end_date = ?, notes = ?
            WHERE id = ?
            "#,
        )
        .bind(rs.fund_id)
        .bind(&rs.name)
        .bind(&rs.location)
        .bind(rs.start_date)
        .bind(rs.end_date)
        .bind(&rs.notes)
        .bind(rs.id)
        .execute(&mut *conn)
        .await?;

        funnel::refresh_fund(conn, rs.fund_id).await
    }
}

pub async fn for_fund(pool: &SqlitePool, fund_id: i64) -> Result<Vec<Roadshow>> {
    let roadshows = sqlx::query_as::<_, Roadshow>(&format!(
        "SELECT * FROM roadshow WHERE fund_id = ? ORDER BY {}",
        Roadshow::ORDER_BY
    ))
    .bind(fund_id)
    .fetch_all(pool)
    .await?;
    Ok(roadshows)
}

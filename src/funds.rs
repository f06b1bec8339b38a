//! Funds being raised.

use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::Result;
use crate::models::Fund;
use crate::repo::Entity;

#[async_trait]
impl Entity for Fund {
    const TABLE: &'static str = "fund";
    const LABEL: &'static str = "fund";
    const NAME_COLUMN: &'static str = "fund_name";
    const ORDER_BY: &'static str = "fund_name COLLATE NOCASE, id";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn notion_id(&self) -> Option<&str> {
        self.notion_id.as_deref()
    }

    async fn insert(conn: &mut SqliteConnection, f: &Self) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO fund (notion_id, fund_name, gp_id, gp_notion_id, geography, target_multiple,
                              status, days_to_rs, target_irr, hard_cap_mn, target_mn, roadshow_date,
                              sectors, note, potential, asset_class, current_lps, launch, roadshows,
                              final_close, closed)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&f.notion_id)
        .bind(&f.fund_name)
        .bind(f.gp_id)
        .bind(&f.gp_notion_id)
        .bind(&f.geography)
        .bind(f.target_multiple)
        .bind(&f.status)
        .bind(f.days_to_rs)
        .bind(&f.target_irr)
        .bind(f.hard_cap_mn)
        .bind(f.target_mn)
        .bind(&f.roadshow_date)
        .bind(&f.sectors)
        .bind(&f.note)
        .bind(&f.potential)
        .bind(&f.asset_class)
        .bind(&f.current_lps)
        .bind(&f.launch)
        .bind(&f.roadshows)
        .bind(&f.final_close)
        .bind(f.closed)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update(conn: &mut SqliteConnection, f: &Self) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE fund SET
                notion_id = ?, fund_name = ?, gp_id = ?, gp_notion_id = ?, geography = ?,
                target_multiple = ?, status = ?, days_to_rs = ?, target_irr = ?, hard_cap_mn = ?,
                target_mn = ?, roadshow_date = ?, sectors = ?, note = ?, potential = ?,
                asset_class = ?, current_lps = ?, launch = ?, roadshows = ?, final_close = ?,
                closed = ?
            WHERE id = ?
            "#,
        )
        .bind(&f.notion_id)
        .bind(&f.fund_name)
        .bind(f.gp_id)
        .bind(&f.gp_notion_id)
        .bind(&f.geography)
        .bind(f.target_multiple)
        .bind(&f.status)
        .bind(f.days_to_rs)
        .bind(&f.target_irr)
        .bind(f.hard_cap_mn)
        .bind(f.target_mn)
        .bind(&f.roadshow_date)
        .bind(&f.sectors)
        .bind(&f.note)
        .bind(&f.potential)
        .bind(&f.asset_class)
        .bind(&f.current_lps)
        .bind(&f.launch)
        .bind(&f.roadshows)
        .bind(&f.final_close)
        .bind(f.closed)
        .bind(f.id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

/// Funds managed by a GP.
pub async fn for_gp(pool: &SqlitePool, gp_id: i64) -> Result<Vec<Fund>> {
    let funds = sqlx::query_as::<_, Fund>(
        "SELECT * FROM fund WHERE gp_id = ? ORDER BY fund_name COLLATE NOCASE, id",
    )
    .bind(gp_id)
    .fetch_all(pool)
    .await?;
    Ok(funds)
}

/// Resolve `gp_id` from `gp_notion_id` for funds imported before their GP.
pub async fn link_gps_by_notion_id(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE fund SET gp_id = (SELECT gp.id FROM gp WHERE gp.notion_id = fund.gp_notion_id)
        WHERE gp_id IS NULL
          AND gp_notion_id IS NOT NULL
          AND EXISTS (SELECT 1 FROM gp WHERE gp.notion_id = fund.gp_notion_id)
        "#,
    )
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

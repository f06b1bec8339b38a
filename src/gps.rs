//! General partners.

use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::Result;
use crate::models::Gp;
use crate::repo::Entity;

#[async_trait]
impl Entity for Gp {
    const TABLE: &'static str = "gp";
    const LABEL: &'static str = "gp";
    const NAME_COLUMN: &'static str = "name";
    const ORDER_BY: &'static str = "name COLLATE NOCASE, id";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn notion_id(&self) -> Option<&str> {
        self.notion_id.as_deref()
    }

    async fn insert(conn: &mut SqliteConnection, gp: &Self) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO gp (notion_id, name, location, contact_level, flagship_strategy,
                            other_strategies, note, distributor_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&gp.notion_id)
        .bind(&gp.name)
        .bind(&gp.location)
        .bind(&gp.contact_level)
        .bind(&gp.flagship_strategy)
        .bind(&gp.other_strategies)
        .bind(&gp.note)
        .bind(gp.distributor_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update(conn: &mut SqliteConnection, gp: &Self) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE gp SET
                notion_id = ?, name = ?, location = ?, contact_level = ?, flagship_strategy = ?,
                other_strategies = ?, note = ?, distributor_id = ?
            WHERE id = ?
            "#,
        )
        .bind(&gp.notion_id)
        .bind(&gp.name)
        .bind(&gp.location)
        .bind(&gp.contact_level)
        .bind(&gp.flagship_strategy)
        .bind(&gp.other_strategies)
        .bind(&gp.note)
        .bind(gp.distributor_id)
        .bind(gp.id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

/// Point a GP at a distributor (CSV `Managers` column).
///
/// Returns `true` when the GP's distributor actually changed.
pub async fn set_distributor(
    conn: &mut SqliteConnection,
    gp_id: i64,
    distributor_id: i64,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE gp SET distributor_id = ? WHERE id = ? AND (distributor_id IS NULL OR distributor_id != ?)",
    )
    .bind(distributor_id)
    .bind(gp_id)
    .bind(distributor_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// GPs placed by a distributor.
pub async fn for_distributor(pool: &SqlitePool, distributor_id: i64) -> Result<Vec<Gp>> {
    let gps = sqlx::query_as::<_, Gp>(
        "SELECT * FROM gp WHERE distributor_id = ? ORDER BY name COLLATE NOCASE, id",
    )
    .bind(distributor_id)
    .fetch_all(pool)
    .await?;
    Ok(gps)
}

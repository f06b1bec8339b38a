//! Limited partners.

use async_trait::async_trait;
use sqlx::SqliteConnection;

use crate::error::Result;
use crate::models::Lp;
use crate::repo::Entity;

#[async_trait]
impl Entity for Lp {
    const TABLE: &'static str = "lp";
    const LABEL: &'static str = "lp";
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

    async fn insert(conn: &mut SqliteConnection, lp: &Self) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO lp (notion_id, name, aum_billions, advisor, intl_alts, intl_mf,
                            local_alts, local_mf, investment_high, investment_low, location,
                            priority, type_of_group, text)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&lp.notion_id)
        .bind(&lp.name)
        .bind(lp.aum_billions)
        .bind(&lp.advisor)
        .bind(&lp.intl_alts)
        .bind(&lp.intl_mf)
        .bind(&lp.local_alts)
        .bind(&lp.local_mf)
        .bind(lp.investment_high)
        .bind(lp.investment_low)
        .bind(&lp.location)
        .bind(&lp.priority)
        .bind(&lp.type_of_group)
        .bind(&lp.text)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update(conn: &mut SqliteConnection, lp: &Self) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE lp SET
                notion_id = ?, name = ?, aum_billions = ?, advisor = ?, intl_alts = ?,
                intl_mf = ?, local_alts = ?, local_mf = ?, investment_high = ?,
                investment_low = ?, location = ?, priority = ?, type_of_group = ?, text = ?
            WHERE id = ?
            "#,
        )
        .bind(&lp.notion_id)
        .bind(&lp.name)
        .bind(lp.aum_billions)
        .bind(&lp.advisor)
        .bind(&lp.intl_alts)
        .bind(&lp.intl_mf)
        .bind(&lp.local_alts)
        .bind(&lp.local_mf)
        .bind(lp.investment_high)
        .bind(lp.investment_low)
        .bind(&lp.location)
        .bind(&lp.priority)
        .bind(&lp.type_of_group)
        .bind(&lp.text)
        .bind(lp.id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

//! Distributors (placement agents between GPs and LPs).

use async_trait::async_trait;
use sqlx::SqliteConnection;

use crate::error::Result;
use crate::models::Distributor;
use crate::repo::Entity;

#[async_trait]
impl Entity for Distributor {
    const TABLE: &'static str = "distributor";
    const LABEL: &'static str = "distributor";
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

    async fn insert(conn: &mut SqliteConnection, d: &Self) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO distributor (notion_id, name, headquarter, mexico, text) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&d.notion_id)
        .bind(&d.name)
        .bind(&d.headquarter)
        .bind(&d.mexico)
        .bind(&d.text)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update(conn: &mut SqliteConnection, d: &Self) -> Result<()> {
        sqlx::query(
            "UPDATE distributor SET notion_id = ?, name = ?, headquarter = ?, mexico = ?, text = ? WHERE id = ?",
        )
        .bind(&d.notion_id)
        .bind(&d.name)
        .bind(&d.headquarter)
        .bind(&d.mexico)
        .bind(&d.text)
        .bind(d.id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

//! Contact people.

use async_trait::async_trait;
use sqlx::SqliteConnection;

use crate::error::Result;
use crate::models::Person;
use crate::repo::Entity;

#[async_trait]
impl Entity for Person {
    const TABLE: &'static str = "person";
    const LABEL: &'static str = "person";
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

    async fn insert(conn: &mut SqliteConnection, p: &Self) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO person (notion_id, name, position, email, cell_phone, office_phone,
                                location, people_type, personal_note)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&p.notion_id)
        .bind(&p.name)
        .bind(&p.position)
        .bind(&p.email)
        .bind(&p.cell_phone)
        .bind(&p.office_phone)
        .bind(&p.location)
        .bind(&p.people_type)
        .bind(&p.personal_note)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update(conn: &mut SqliteConnection, p: &Self) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE person SET
                notion_id = ?, name = ?, position = ?, email = ?, cell_phone = ?,
                office_phone = ?, location = ?, people_type = ?, personal_note = ?
            WHERE id = ?
            "#,
        )
        .bind(&p.notion_id)
        .bind(&p.name)
        .bind(&p.position)
        .bind(&p.email)
        .bind(&p.cell_phone)
        .bind(&p.office_phone)
        .bind(&p.location)
        .bind(&p.people_type)
        .bind(&p.personal_note)
        .bind(p.id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

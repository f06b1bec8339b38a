//! Row helpers shared by every resource.
//!
//! Resources implement [`Entity`] to describe their table; the generic
//! functions here cover the operations that only differ by table name. Table
//! and column names come from the `Entity` constants, never from requests.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::error::{CrmError, Result};

#[async_trait]
pub trait Entity:
    for<'r> FromRow<'r, SqliteRow> + Serialize + DeserializeOwned + Send + Sync + Unpin
{
    /// Table name.
    const TABLE: &'static str;
    /// Singular label used in error messages.
    const LABEL: &'static str;
    /// Column matched by `search`.
    const NAME_COLUMN: &'static str;
    /// `ORDER BY` clause for `list`.
    const ORDER_BY: &'static str;

    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);
    fn notion_id(&self) -> Option<&str>;

    /// Insert a new row, ignoring `id`. Returns the new row id.
    async fn insert(conn: &mut SqliteConnection, row: &Self) -> Result<i64>;

    /// Overwrite every column of the row with `row.id()`.
    async fn update(conn: &mut SqliteConnection, row: &Self) -> Result<()>;
}

pub async fn get<T: Entity>(pool: &SqlitePool, id: i64) -> Result<T> {
    sqlx::query_as::<_, T>(&format!("SELECT * FROM {} WHERE id = ?", T::TABLE))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CrmError::not_found(T::LABEL, id))
}

pub async fn get_in<T: Entity>(conn: &mut SqliteConnection, id: i64) -> Result<T> {
    sqlx::query_as::<_, T>(&format!("SELECT * FROM {} WHERE id = ?", T::TABLE))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CrmError::not_found(T::LABEL, id))
}

pub async fn list<T: Entity>(pool: &SqlitePool) -> Result<Vec<T>> {
    let rows = sqlx::query_as::<_, T>(&format!(
        "SELECT * FROM {} ORDER BY {}",
        T::TABLE,
        T::ORDER_BY
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Case-insensitive substring search on the entity's name column.
///
/// Blank queries return nothing rather than the whole table.
pub async fn search<T: Entity>(pool: &SqlitePool, query: &str, limit: i64) -> Result<Vec<T>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
    let rows = sqlx::query_as::<_, T>(&format!(
        "SELECT * FROM {table} WHERE lower({col}) LIKE ? ESCAPE '\\' ORDER BY {col} LIMIT ?",
        table = T::TABLE,
        col = T::NAME_COLUMN
    ))
    .bind(pattern)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn delete<T: Entity>(conn: &mut SqliteConnection, id: i64) -> Result<()> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", T::TABLE))
        .bind(id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CrmError::not_found(T::LABEL, id));
    }
    Ok(())
}

pub async fn exists<T: Entity>(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let found: Option<i64> =
        sqlx::query_scalar(&format!("SELECT id FROM {} WHERE id = ?", T::TABLE))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(found.is_some())
}

/// Row id for a Notion page id, if that page was imported before.
pub async fn id_by_notion_id<T: Entity>(
    conn: &mut SqliteConnection,
    notion_id: &str,
) -> Result<Option<i64>> {
    let id = sqlx::query_scalar(&format!(
        "SELECT id FROM {} WHERE notion_id = ? ORDER BY id LIMIT 1",
        T::TABLE
    ))
    .bind(notion_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

/// Row id for an exact name match (CSV exports only carry names).
pub async fn id_by_name<T: Entity>(conn: &mut SqliteConnection, name: &str) -> Result<Option<i64>> {
    let id = sqlx::query_scalar(&format!(
        "SELECT id FROM {} WHERE {} = ? ORDER BY id LIMIT 1",
        T::TABLE,
        T::NAME_COLUMN
    ))
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

/// Insert `row` and read it back.
pub async fn create<T: Entity>(conn: &mut SqliteConnection, row: &T) -> Result<T> {
    let id = T::insert(conn, row).await?;
    get_in(conn, id).await
}

/// Apply a partial JSON update to the row `id` and read it back.
pub async fn patch<T: Entity>(conn: &mut SqliteConnection, id: i64, changes: Value) -> Result<T> {
    let current = get_in::<T>(conn, id).await?;
    let merged = merge_patch(&current, changes)?;
    T::update(conn, &merged).await?;
    get_in(conn, id).await
}

/// Insert or update `row` keyed by its Notion page id.
///
/// Rows without a Notion id are always inserted. Returns the row id and
/// whether the row is new.
pub async fn upsert_by_notion_id<T: Entity>(
    conn: &mut SqliteConnection,
    row: &mut T,
) -> Result<(i64, bool)> {
    let existing = match row.notion_id() {
        Some(notion_id) => id_by_notion_id::<T>(conn, notion_id).await?,
        None => None,
    };

    match existing {
        Some(id) => {
            row.set_id(id);
            T::update(conn, row).await?;
            Ok((id, false))
        }
        None => {
            let id = T::insert(conn, row).await?;
            row.set_id(id);
            Ok((id, true))
        }
    }
}

/// Apply a partial JSON update to `current`.
///
/// Only keys present in `patch` change; an explicit `null` clears a nullable
/// field. `id` and keys the entity does not have are ignored.
pub fn merge_patch<T: Serialize + DeserializeOwned>(current: &T, patch: Value) -> Result<T> {
    let Value::Object(changes) = patch else {
        return Err(CrmError::invalid("body", "expected a JSON object"));
    };

    let mut merged = serde_json::to_value(current)?;
    if let Value::Object(ref mut fields) = merged {
        for (key, value) in changes {
            if key == "id" {
                continue;
            }
            if !fields.contains_key(&key) {
                tracing::debug!(field = %key, "ignoring unknown field in update");
                continue;
            }
            fields.insert(key, value);
        }
    }

    serde_json::from_value(merged).map_err(|e| CrmError::invalid("body", e.to_string()))
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Lp, Todo, TodoStatus};
    use serde_json::json;

    fn sample_lp() -> Lp {
        serde_json::from_value(json!({
            "id": 7,
            "name": "Afore Norte",
            "location": "Monterrey",
            "priority": "High"
        }))
        .unwrap()
    }

    #[test]
    fn test_merge_patch_changes_only_present_keys() {
        let lp = sample_lp();
        let updated = merge_patch(&lp, json!({"priority": "Low"})).unwrap();
        assert_eq!(updated.priority.as_deref(), Some("Low"));
        assert_eq!(updated.location.as_deref(), Some("Monterrey"));
        assert_eq!(updated.name, "Afore Norte");
    }

    #[test]
    fn test_merge_patch_null_clears_and_id_is_kept() {
        let lp = sample_lp();
        let updated = merge_patch(&lp, json!({"location": null, "id": 99})).unwrap();
        assert_eq!(updated.location, None);
        assert_eq!(updated.id, 7);
    }

    #[test]
    fn test_merge_patch_rejects_null_required_field() {
        let lp = sample_lp();
        let err = merge_patch(&lp, json!({"name": null})).unwrap_err();
        assert!(matches!(err, CrmError::Invalid { field: "body", .. }));
    }

    #[test]
    fn test_merge_patch_ignores_unknown_keys() {
        let lp = sample_lp();
        let updated = merge_patch(&lp, json!({"lp_id": 3, "text": "met in CDMX"})).unwrap();
        assert_eq!(updated.text.as_deref(), Some("met in CDMX"));
    }

    #[test]
    fn test_merge_patch_rejects_non_object() {
        let lp = sample_lp();
        assert!(merge_patch(&lp, json!(["name"])).is_err());
    }

    #[test]
    fn test_merge_patch_todo_status() {
        let todo: Todo = serde_json::from_value(json!({
            "id": 1,
            "description": "Send deck",
            "due_date": "2026-10-20"
        }))
        .unwrap();
        let updated = merge_patch(&todo, json!({"status": "completed"})).unwrap();
        assert_eq!(updated.status, TodoStatus::Completed);
        assert_eq!(updated.due_date, todo.due_date);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
    }
}

//! Follow-up tasks and their recurrence.
//!
//! Completing a recurring todo inserts its next occurrence. The transition
//! is a conditional `UPDATE … WHERE status != 'completed'`: only the request
//! that flips the row spawns the child, and the unique index on
//! `parent_todo_id` backs that up.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::Result;
use crate::links::{self, Link};
use crate::models::{Todo, TodoStatus};
use crate::repo::{self, Entity};

#[async_trait]
impl Entity for Todo {
    const TABLE: &'static str = "todo";
    const LABEL: &'static str = "todo";
    const NAME_COLUMN: &'static str = "description";
    const ORDER_BY: &'static str = "status = 'completed', due_date IS NULL, due_date, id";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn notion_id(&self) -> Option<&str> {
        None
    }

    async fn insert(conn: &mut SqliteConnection, todo: &Self) -> Result<i64> {
        if let Some(rec) = &todo.recurrence {
            rec.validate()?;
        }

        let result = sqlx::query(
            r#"
            INSERT INTO todo (note_id, description, status, due_date, recurrence,
                              parent_todo_id, created_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(todo.note_id)
        .bind(&todo.description)
        .bind(todo.status.as_str())
        .bind(todo.due_date)
        .bind(todo.recurrence.as_ref().map(|r| r.to_json()))
        .bind(todo.parent_todo_id)
        .bind(todo.created_at)
        .bind(todo.completed_at)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update(conn: &mut SqliteConnection, todo: &Self) -> Result<()> {
        if let Some(rec) = &todo.recurrence {
            rec.validate()?;
        }

        sqlx::query(
            r#"
            UPDATE todo SET
                note_id = ?, description = ?, status = ?, due_date = ?, recurrence = ?,
                parent_todo_id = ?, completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(todo.note_id)
        .bind(&todo.description)
        .bind(todo.status.as_str())
        .bind(todo.due_date)
        .bind(todo.recurrence.as_ref().map(|r| r.to_json()))
        .bind(todo.parent_todo_id)
        .bind(todo.completed_at)
        .bind(todo.id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

/// Body of `POST /todos`: a todo plus the LPs it concerns.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTodo {
    #[serde(flatten)]
    pub todo: Todo,
    #[serde(default)]
    pub lp_ids: Vec<i64>,
}

pub async fn create(conn: &mut SqliteConnection, new: NewTodo) -> Result<Todo> {
    let mut todo = new.todo;
    todo.parent_todo_id = None;
    if todo.status == TodoStatus::Completed && todo.completed_at.is_none() {
        todo.completed_at = Some(Utc::now().naive_utc());
    }

    let id = Todo::insert(conn, &todo).await?;
    for lp_id in new.lp_ids {
        links::link(conn, Link::TodoLp, id, lp_id).await?;
    }
    repo::get_in(conn, id).await
}

/// Partially update a todo, spawning the next occurrence when this call
/// completes a recurring one.
pub async fn patch(conn: &mut SqliteConnection, id: i64, changes: Value) -> Result<Todo> {
    let current = repo::get_in::<Todo>(conn, id).await?;
    let mut todo = repo::merge_patch(&current, changes)?;

    match todo.status {
        TodoStatus::Completed if current.status != TodoStatus::Completed => {
            let completed_at = Utc::now().naive_utc();
            todo.completed_at = Some(completed_at);

            let flipped = sqlx::query(
                "UPDATE todo SET status = 'completed', completed_at = ? \
                 WHERE id = ? AND status != 'completed'",
            )
            .bind(completed_at)
            .bind(id)
            .execute(&mut *conn)
            .await?
            .rows_affected()
                == 1;

            Todo::update(conn, &todo).await?;
            if flipped {
                spawn_next(conn, &todo).await?;
            }
        }
        TodoStatus::Pending => {
            todo.completed_at = None;
            Todo::update(conn, &todo).await?;
        }
        TodoStatus::Completed => {
            todo.completed_at = current.completed_at;
            Todo::update(conn, &todo).await?;
        }
    }

    repo::get_in(conn, id).await
}

/// Insert the occurrence after `done`, if its recurrence has one.
///
/// The next due date counts from `done.due_date`, or from the completion
/// date when the todo had none. LP links are carried over.
async fn spawn_next(conn: &mut SqliteConnection, done: &Todo) -> Result<Option<i64>> {
    let Some(rec) = &done.recurrence else {
        return Ok(None);
    };

    // Reopened and completed again: the series already moved on.
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM todo WHERE parent_todo_id = ?")
        .bind(done.id)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(child) = existing {
        tracing::debug!(todo_id = done.id, child, "next occurrence already exists");
        return Ok(None);
    }

    let from = done
        .due_date
        .or_else(|| done.completed_at.map(|at| at.date()))
        .unwrap_or_else(|| Utc::now().date_naive());
    let Some(next_due) = rec.next_due(from) else {
        tracing::debug!(todo_id = done.id, "recurrence ended");
        return Ok(None);
    };

    let next = Todo {
        id: 0,
        note_id: done.note_id,
        description: done.description.clone(),
        status: TodoStatus::Pending,
        due_date: Some(next_due),
        recurrence: Some(rec.clone()),
        parent_todo_id: Some(done.id),
        created_at: Utc::now().naive_utc(),
        completed_at: None,
    };
    let next_id = Todo::insert(conn, &next).await?;

    sqlx::query(
        "INSERT OR IGNORE INTO todo_lp_link (todo_id, lp_id) \
         SELECT ?, lp_id FROM todo_lp_link WHERE todo_id = ?",
    )
    .bind(next_id)
    .bind(done.id)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(todo_id = done.id, next_id, %next_due, "spawned next occurrence");
    Ok(Some(next_id))
}

pub async fn list(pool: &SqlitePool, status: Option<TodoStatus>) -> Result<Vec<Todo>> {
    let Some(status) = status else {
        return repo::list(pool).await;
    };
    let todos = sqlx::query_as::<_, Todo>(&format!(
        "SELECT * FROM todo WHERE status = ? ORDER BY {}",
        Todo::ORDER_BY
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;
    Ok(todos)
}

pub async fn for_note(pool: &SqlitePool, note_id: i64) -> Result<Vec<Todo>> {
    let todos = sqlx::query_as::<_, Todo>(&format!(
        "SELECT * FROM todo WHERE note_id = ? ORDER BY {}",
        Todo::ORDER_BY
    ))
    .bind(note_id)
    .fetch_all(pool)
    .await?;
    Ok(todos)
}

/// Todos of the LP's notes plus todos linked to the LP directly.
pub async fn for_lp(pool: &SqlitePool, lp_id: i64) -> Result<Vec<Todo>> {
    let todos = sqlx::query_as::<_, Todo>(&format!(
        r#"
        SELECT * FROM todo
        WHERE note_id IN (SELECT note_id FROM note_lp_link WHERE lp_id = ?1)
           OR id IN (SELECT todo_id FROM todo_lp_link WHERE lp_id = ?1)
        ORDER BY {}
        "#,
        Todo::ORDER_BY
    ))
    .bind(lp_id)
    .fetch_all(pool)
    .await?;
    Ok(todos)
}

/// Todos of the GP's notes.
pub async fn for_gp(pool: &SqlitePool, gp_id: i64) -> Result<Vec<Todo>> {
    let todos = sqlx::query_as::<_, Todo>(&format!(
        "SELECT * FROM todo WHERE note_id IN (SELECT note_id FROM note_gp_link WHERE gp_id = ?) \
         ORDER BY {}",
        Todo::ORDER_BY
    ))
    .bind(gp_id)
    .fetch_all(pool)
    .await?;
    Ok(todos)
}

//! Meeting notes.
//!
//! Notes are the only rows the sales funnel derives from, so every write
//! here ends with [`funnel::note_changed`].

use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::error::Result;
use crate::funnel;
use crate::models::Note;
use crate::notion::{self, RenderedContent};
use crate::repo::{self, Entity};

#[async_trait]
impl Entity for Note {
    const TABLE: &'static str = "note";
    const LABEL: &'static str = "note";
    const NAME_COLUMN: &'static str = "name";
    const ORDER_BY: &'static str = "date DESC, id DESC";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn notion_id(&self) -> Option<&str> {
        self.notion_id.as_deref()
    }

    async fn insert(conn: &mut SqliteConnection, note: &Self) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO note (notion_id, name, date, raw_notes, summary, content_text,
                              content_json, image_paths, fundraise, interest, contact_type,
                              local_mf, local_alts, intl_mf, intl_alts, roadshows, useful,
                              ai_summary, audio_path, transcription_path)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&note.notion_id)
        .bind(&note.name)
        .bind(note.date)
        .bind(&note.raw_notes)
        .bind(&note.summary)
        .bind(&note.content_text)
        .bind(&note.content_json)
        .bind(&note.image_paths)
        .bind(&note.fundraise)
        .bind(&note.interest)
        .bind(&note.contact_type)
        .bind(&note.local_mf)
        .bind(&note.local_alts)
        .bind(&note.intl_mf)
        .bind(&note.intl_alts)
        .bind(&note.roadshows)
        .bind(note.useful)
        .bind(&note.ai_summary)
        .bind(&note.audio_path)
        .bind(&note.transcription_path)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// The date may have moved, so the note's funds are refreshed.
    async fn update(conn: &mut SqliteConnection, note: &Self) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE note SET
                notion_id = ?, name = ?, date = ?, raw_notes = ?, summary = ?,
                content_text = ?, content_json = ?, image_paths = ?, fundraise = ?,
                interest = ?, contact_type = ?, local_mf = ?, local_alts = ?, intl_mf = ?,
                intl_alts = ?, roadshows = ?, useful = ?, ai_summary = ?, audio_path = ?,
                transcription_path = ?
            WHERE id = ?
            "#,
        )
        .bind(&note.notion_id)
        .bind(&note.name)
        .bind(note.date)
        .bind(&note.raw_notes)
        .bind(&note.summary)
        .bind(&note.content_text)
        .bind(&note.content_json)
        .bind(&note.image_paths)
        .bind(&note.fundraise)
        .bind(&note.interest)
        .bind(&note.contact_type)
        .bind(&note.local_mf)
        .bind(&note.local_alts)
        .bind(&note.intl_mf)
        .bind(&note.intl_alts)
        .bind(&note.roadshows)
        .bind(note.useful)
        .bind(&note.ai_summary)
        .bind(&note.audio_path)
        .bind(&note.transcription_path)
        .bind(note.id)
        .execute(&mut *conn)
        .await?;

        funnel::note_changed(conn, note.id, &[]).await
    }
}

/// Delete a note and re-derive the last contact of the funds it touched.
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<()> {
    let funds_before = funnel::note_fund_ids(conn, id).await?;
    repo::delete::<Note>(conn, id).await?;
    funnel::note_changed(conn, id, &funds_before).await
}

/// Response of `GET /notes/{id}/content`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NoteContent {
    pub note_id: i64,
    pub text: String,
    pub image_paths: Vec<String>,
}

/// Readable text and image paths of a note.
///
/// Rendered from `content_json` when present; otherwise the stored
/// `content_text` (or `raw_notes`) and the comma-separated `image_paths`
/// column are returned as is.
pub fn content(note: &Note) -> NoteContent {
    let rendered = match note.content_json.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => notion::render_content_json(raw),
        _ => RenderedContent {
            text: note
                .content_text
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| note.raw_notes.clone()),
            image_paths: split_image_paths(note.image_paths.as_deref()),
        },
    };

    NoteContent {
        note_id: note.id,
        text: rendered.text,
        image_paths: rendered.image_paths,
    }
}

pub fn split_image_paths(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_prefers_blocks() {
        let note: Note = serde_json::from_value(json!({
            "id": 4,
            "date": "2025-05-02",
            "raw_notes": "raw",
            "content_json": r#"[{"type": "paragraph", "paragraph": {"rich_text": [{"plain_text": "From blocks"}]}},
                                {"type": "image", "local_image_path": "notion_images/x.png"}]"#,
            "image_paths": "ignored.png"
        }))
        .unwrap();
        let content = content(&note);
        assert_eq!(content.note_id, 4);
        assert_eq!(content.text, "From blocks");
        assert_eq!(content.image_paths, vec!["notion_images/x.png"]);
    }

    #[test]
    fn test_content_without_blocks() {
        let note: Note = serde_json::from_value(json!({
            "raw_notes": "typed by hand",
            "image_paths": "a.png, b.png,"
        }))
        .unwrap();
        let content = content(&note);
        assert_eq!(content.text, "typed by hand");
        assert_eq!(content.image_paths, vec!["a.png", "b.png"]);
    }
}

//! Entity rows and API payloads.
//!
//! Each entity struct doubles as the create payload: `id` defaults to `0` and
//! is ignored on insert, required columns are non-`Option` fields, and every
//! other column defaults to `None`. Partial updates go through
//! [`crate::repo::merge_patch`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::recurrence::Recurrence;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Lp {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub aum_billions: Option<f64>,
    #[serde(default)]
    pub advisor: Option<String>,
    #[serde(default)]
    pub intl_alts: Option<String>,
    #[serde(default)]
    pub intl_mf: Option<String>,
    #[serde(default)]
    pub local_alts: Option<String>,
    #[serde(default)]
    pub local_mf: Option<String>,
    #[serde(default)]
    pub investment_high: Option<f64>,
    #[serde(default)]
    pub investment_low: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub type_of_group: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub notion_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Gp {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub contact_level: Option<String>,
    #[serde(default)]
    pub flagship_strategy: Option<String>,
    #[serde(default)]
    pub other_strategies: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub distributor_id: Option<i64>,
    #[serde(default)]
    pub notion_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Distributor {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub headquarter: Option<String>,
    #[serde(default)]
    pub mexico: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub notion_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Person {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub cell_phone: Option<String>,
    #[serde(default)]
    pub office_phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub people_type: Option<String>,
    #[serde(default)]
    pub personal_note: Option<String>,
    #[serde(default)]
    pub notion_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Fund {
    #[serde(default)]
    pub id: i64,
    pub fund_name: String,
    #[serde(default)]
    pub gp_id: Option<i64>,
    #[serde(default)]
    pub gp_notion_id: Option<String>,
    #[serde(default)]
    pub geography: Option<String>,
    #[serde(default)]
    pub target_multiple: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub days_to_rs: Option<f64>,
    #[serde(default)]
    pub target_irr: Option<String>,
    #[serde(default)]
    pub hard_cap_mn: Option<f64>,
    #[serde(default)]
    pub target_mn: Option<f64>,
    #[serde(default)]
    pub roadshow_date: Option<String>,
    #[serde(default)]
    pub sectors: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub potential: Option<String>,
    #[serde(default)]
    pub asset_class: Option<String>,
    #[serde(default)]
    pub current_lps: Option<String>,
    #[serde(default)]
    pub launch: Option<String>,
    #[serde(default)]
    pub roadshows: Option<String>,
    #[serde(default)]
    pub final_close: Option<String>,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub notion_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Note {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "now", deserialize_with = "deserialize_flexible_datetime")]
    pub date: NaiveDateTime,
    #[serde(default)]
    pub raw_notes: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content_text: Option<String>,
    #[serde(default)]
    pub content_json: Option<String>,
    #[serde(default)]
    pub image_paths: Option<String>,
    #[serde(default)]
    pub fundraise: Option<String>,
    #[serde(default)]
    pub interest: Option<String>,
    #[serde(default)]
    pub contact_type: Option<String>,
    #[serde(default)]
    pub local_mf: Option<String>,
    #[serde(default)]
    pub local_alts: Option<String>,
    #[serde(default)]
    pub intl_mf: Option<String>,
    #[serde(default)]
    pub intl_alts: Option<String>,
    #[serde(default)]
    pub roadshows: Option<String>,
    #[serde(default)]
    pub useful: bool,
    #[serde(default)]
    pub ai_summary: Option<String>,
    #[serde(default)]
    pub audio_path: Option<String>,
    #[serde(default)]
    pub transcription_path: Option<String>,
    #[serde(default)]
    pub notion_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TodoStatus {
    #[default]
    Pending,
    Completed,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Pending => "pending",
            TodoStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TodoStatus::Pending),
            "completed" => Some(TodoStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Todo {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub note_id: Option<i64>,
    pub description: String,
    #[serde(default)]
    pub status: TodoStatus,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub parent_todo_id: Option<i64>,
    #[serde(default = "now")]
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub completed_at: Option<NaiveDateTime>,
}

impl FromRow<'_, SqliteRow> for Todo {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = TodoStatus::parse(&status).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: format!("unknown todo status: {}", status).into(),
        })?;

        let recurrence: Option<String> = row.try_get("recurrence")?;
        let recurrence = match recurrence.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(serde_json::from_str::<Recurrence>(raw).map_err(|e| {
                sqlx::Error::ColumnDecode {
                    index: "recurrence".to_string(),
                    source: Box::new(e),
                }
            })?),
        };

        Ok(Todo {
            id: row.try_get("id")?,
            note_id: row.try_get("note_id")?,
            description: row.try_get("description")?,
            status,
            due_date: row.try_get("due_date")?,
            recurrence,
            parent_todo_id: row.try_get("parent_todo_id")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Roadshow {
    #[serde(default)]
    pub id: i64,
    pub fund_id: i64,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Sales-funnel stage of an LP for a fund, in funnel order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterestStage {
    #[default]
    Inactive,
    Contacted,
    Interested,
    DueDiligence,
    SoftCommit,
    Committed,
    Declined,
}

impl InterestStage {
    pub const ALL: [InterestStage; 7] = [
        InterestStage::Inactive,
        InterestStage::Contacted,
        InterestStage::Interested,
        InterestStage::DueDiligence,
        InterestStage::SoftCommit,
        InterestStage::Committed,
        InterestStage::Declined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InterestStage::Inactive => "inactive",
            InterestStage::Contacted => "contacted",
            InterestStage::Interested => "interested",
            InterestStage::DueDiligence => "due_diligence",
            InterestStage::SoftCommit => "soft_commit",
            InterestStage::Committed => "committed",
            InterestStage::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.as_str() == s)
    }

    /// Sort key for funnel views: most advanced live stage first, declined
    /// and inactive last.
    pub fn rank(&self) -> u8 {
        match self {
            InterestStage::Committed => 0,
            InterestStage::SoftCommit => 1,
            InterestStage::DueDiligence => 2,
            InterestStage::Interested => 3,
            InterestStage::Contacted => 4,
            InterestStage::Declined => 5,
            InterestStage::Inactive => 6,
        }
    }
}

/// Status of an LP on a roadshow, in funnel order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoadshowStatus {
    #[default]
    Inactive,
    Invited,
    Scheduled,
    Met,
    FollowUp,
    Declined,
}

impl RoadshowStatus {
    pub const ALL: [RoadshowStatus; 6] = [
        RoadshowStatus::Inactive,
        RoadshowStatus::Invited,
        RoadshowStatus::Scheduled,
        RoadshowStatus::Met,
        RoadshowStatus::FollowUp,
        RoadshowStatus::Declined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoadshowStatus::Inactive => "inactive",
            RoadshowStatus::Invited => "invited",
            RoadshowStatus::Scheduled => "scheduled",
            RoadshowStatus::Met => "met",
            RoadshowStatus::FollowUp => "follow_up",
            RoadshowStatus::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn rank(&self) -> u8 {
        match self {
            RoadshowStatus::FollowUp => 0,
            RoadshowStatus::Met => 1,
            RoadshowStatus::Scheduled => 2,
            RoadshowStatus::Invited => 3,
            RoadshowStatus::Declined => 4,
            RoadshowStatus::Inactive => 5,
        }
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Parse the date formats clients and Notion exports send: RFC 3339 with an
/// offset (normalized to UTC), naive `YYYY-MM-DDTHH:MM:SS[.f]`, the same with
/// a space separator, or a bare `YYYY-MM-DD` (midnight).
pub fn parse_flexible_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn deserialize_flexible_datetime<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        None => Ok(now()),
        Some(s) => parse_flexible_datetime(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {}", s))),
    }
}

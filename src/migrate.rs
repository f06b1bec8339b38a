//! Schema creation.
//!
//! Every statement is `IF NOT EXISTS`, so `crm init` and server start-up can
//! both run it against an existing database.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const ENTITY_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS distributor (
        id INTEGER PRIMARY KEY,
        notion_id TEXT,
        name TEXT NOT NULL,
        headquarter TEXT,
        mexico TEXT,
        text TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS lp (
        id INTEGER PRIMARY KEY,
        notion_id TEXT,
        name TEXT NOT NULL,
        aum_billions REAL,
        advisor TEXT,
        intl_alts TEXT,
        intl_mf TEXT,
        local_alts TEXT,
        local_mf TEXT,
        investment_high REAL,
        investment_low REAL,
        location TEXT,
        priority TEXT,
        type_of_group TEXT,
        text TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS gp (
        id INTEGER PRIMARY KEY,
        notion_id TEXT,
        name TEXT NOT NULL,
        location TEXT,
        contact_level TEXT,
        flagship_strategy TEXT,
        other_strategies TEXT,
        note TEXT,
        distributor_id INTEGER REFERENCES distributor(id) ON DELETE SET NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS person (
        id INTEGER PRIMARY KEY,
        notion_id TEXT,
        name TEXT NOT NULL,
        position TEXT,
        email TEXT,
        cell_phone TEXT,
        office_phone TEXT,
        location TEXT,
        people_type TEXT,
        personal_note TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fund (
        id INTEGER PRIMARY KEY,
        notion_id TEXT,
        fund_name TEXT NOT NULL,
        gp_id INTEGER REFERENCES gp(id) ON DELETE SET NULL,
        gp_notion_id TEXT,
        geography TEXT,
        target_multiple REAL,
        status TEXT,
        days_to_rs REAL,
        target_irr TEXT,
        hard_cap_mn REAL,
        target_mn REAL,
        roadshow_date TEXT,
        sectors TEXT,
        note TEXT,
        potential TEXT,
        asset_class TEXT,
        current_lps TEXT,
        launch TEXT,
        roadshows TEXT,
        final_close TEXT,
        closed INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS note (
        id INTEGER PRIMARY KEY,
        notion_id TEXT,
        name TEXT,
        date TEXT NOT NULL,
        raw_notes TEXT NOT NULL DEFAULT '',
        summary TEXT NOT NULL DEFAULT '',
        content_text TEXT,
        content_json TEXT,
        image_paths TEXT,
        fundraise TEXT,
        interest TEXT,
        contact_type TEXT,
        local_mf TEXT,
        local_alts TEXT,
        intl_mf TEXT,
        intl_alts TEXT,
        roadshows TEXT,
        useful INTEGER NOT NULL DEFAULT 0,
        ai_summary TEXT,
        audio_path TEXT,
        transcription_path TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS todo (
        id INTEGER PRIMARY KEY,
        note_id INTEGER REFERENCES note(id) ON DELETE SET NULL,
        description TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        due_date TEXT,
        recurrence TEXT,
        parent_todo_id INTEGER REFERENCES todo(id) ON DELETE SET NULL,
        created_at TEXT NOT NULL,
        completed_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roadshow (
        id INTEGER PRIMARY KEY,
        fund_id INTEGER NOT NULL REFERENCES fund(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        location TEXT,
        start_date TEXT,
        end_date TEXT,
        notes TEXT
    )
    "#,
];

/// `(table, left column, left parent, right column, right parent)`.
const LINK_TABLES: &[(&str, &str, &str, &str, &str)] = &[
    ("gp_lp_link", "gp_id", "gp", "lp_id", "lp"),
    ("gp_person_link", "gp_id", "gp", "person_id", "person"),
    ("lp_person_link", "lp_id", "lp", "person_id", "person"),
    (
        "distributor_person_link",
        "distributor_id",
        "distributor",
        "person_id",
        "person",
    ),
    ("note_lp_link", "note_id", "note", "lp_id", "lp"),
    ("note_gp_link", "note_id", "note", "gp_id", "gp"),
    ("note_fund_link", "note_id", "note", "fund_id", "fund"),
    (
        "note_distributor_link",
        "note_id",
        "note",
        "distributor_id",
        "distributor",
    ),
    ("note_person_link", "note_id", "note", "person_id", "person"),
    ("todo_lp_link", "todo_id", "todo", "lp_id", "lp"),
];

const FUNNEL_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS fund_lp_interest (
        fund_id INTEGER NOT NULL REFERENCES fund(id) ON DELETE CASCADE,
        lp_id INTEGER NOT NULL REFERENCES lp(id) ON DELETE CASCADE,
        interest TEXT NOT NULL DEFAULT 'inactive',
        last_contact_date TEXT,
        last_note_id INTEGER REFERENCES note(id) ON DELETE SET NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (fund_id, lp_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roadshow_lp_status (
        roadshow_id INTEGER NOT NULL REFERENCES roadshow(id) ON DELETE CASCADE,
        lp_id INTEGER NOT NULL REFERENCES lp(id) ON DELETE CASCADE,
        status TEXT NOT NULL DEFAULT 'inactive',
        last_contact_date TEXT,
        last_note_id INTEGER REFERENCES note(id) ON DELETE SET NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (roadshow_id, lp_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS import_checkpoints (
        source TEXT PRIMARY KEY,
        file_hash TEXT NOT NULL,
        row_count INTEGER NOT NULL,
        imported_at TEXT NOT NULL
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_lp_notion_id ON lp(notion_id)",
    "CREATE INDEX IF NOT EXISTS idx_gp_notion_id ON gp(notion_id)",
    "CREATE INDEX IF NOT EXISTS idx_distributor_notion_id ON distributor(notion_id)",
    "CREATE INDEX IF NOT EXISTS idx_person_notion_id ON person(notion_id)",
    "CREATE INDEX IF NOT EXISTS idx_fund_notion_id ON fund(notion_id)",
    "CREATE INDEX IF NOT EXISTS idx_note_notion_id ON note(notion_id)",
    "CREATE INDEX IF NOT EXISTS idx_note_date ON note(date DESC)",
    "CREATE INDEX IF NOT EXISTS idx_lp_name ON lp(name)",
    "CREATE INDEX IF NOT EXISTS idx_gp_name ON gp(name)",
    "CREATE INDEX IF NOT EXISTS idx_person_name ON person(name)",
    "CREATE INDEX IF NOT EXISTS idx_distributor_name ON distributor(name)",
    "CREATE INDEX IF NOT EXISTS idx_todo_note_id ON todo(note_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_todo_parent ON todo(parent_todo_id)",
    "CREATE INDEX IF NOT EXISTS idx_roadshow_fund_id ON roadshow(fund_id)",
];

/// Create the database (if needed) and apply the schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema to an open pool.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;

    for ddl in ENTITY_TABLES {
        sqlx::query(ddl).execute(&mut *tx).await?;
    }

    for (table, left, left_parent, right, right_parent) in LINK_TABLES {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                {left} INTEGER NOT NULL REFERENCES {left_parent}(id) ON DELETE CASCADE,
                {right} INTEGER NOT NULL REFERENCES {right_parent}(id) ON DELETE CASCADE,
                PRIMARY KEY ({left}, {right})
            )
            "#
        );
        sqlx::query(&ddl).execute(&mut *tx).await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_{right} ON {table}({right})"
        ))
        .execute(&mut *tx)
        .await?;
    }

    for ddl in FUNNEL_TABLES {
        sqlx::query(ddl).execute(&mut *tx).await?;
    }

    for ddl in INDEXES {
        sqlx::query(ddl).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}

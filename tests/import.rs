//! Import jobs against a real database.

use std::fs;
use std::path::{Path, PathBuf};

use lp_crm::config::Config;
use lp_crm::funnel;
use lp_crm::import::{run_all, run_import, ImportFormat, ImportKind, ImportOptions};
use lp_crm::links::{self, Link};
use lp_crm::models::{Distributor, Fund, Gp, Lp, Note, Person};
use lp_crm::{db, migrate, repo};
use serde_json::json;
use sqlx::SqlitePool;
use tempfile::TempDir;

fn test_config(tmp: &TempDir) -> Config {
    let root = tmp.path();
    let config_content = format!(
        r#"
[db]
path = "{}"

[server]
bind = "127.0.0.1:0"

[import]
export_dir = "{}"
"#,
        root.join("crm.sqlite").display(),
        root.join("exports").display()
    );
    toml::from_str(&config_content).unwrap()
}

async fn setup() -> (TempDir, Config, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    fs::create_dir_all(&cfg.import.export_dir).unwrap();
    let pool = db::connect(&cfg).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    (tmp, cfg, pool)
}

fn write_export(cfg: &Config, name: &str, content: &str) -> PathBuf {
    let path = cfg.import.export_dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn title(text: &str) -> serde_json::Value {
    json!({"type": "title", "title": [{"plain_text": text}]})
}

fn relation(ids: &[&str]) -> serde_json::Value {
    let items: Vec<_> = ids.iter().map(|id| json!({"id": id})).collect();
    json!({"type": "relation", "relation": items})
}

fn select(name: &str) -> serde_json::Value {
    json!({"type": "select", "select": {"name": name}})
}

async fn import(pool: &SqlitePool, kind: ImportKind, path: &Path) -> lp_crm::import::ImportReport {
    run_import(pool, kind, path, ImportFormat::from_path(path), ImportOptions::default())
        .await
        .unwrap()
}

fn full_export(cfg: &Config) -> Vec<(ImportKind, PathBuf)> {
    let distributors = json!({"pages": [
        {"id": "dist-1", "properties": {"Name": title("Andes Placement"), "Headquarter": select("Lima")}}
    ]});
    let lps = json!({"pages": [
        {"id": "lp-1", "properties": {
            "Name": title("Acme Pension"),
            "AUM (B)": {"type": "number", "number": 12.5},
            "Priority": select("High"),
            "Intl. Atls. ": select("Yes")
        }},
        {"id": "lp-2", "properties": {"Name": title("Beta Insurance")}},
        {"id": "lp-blank", "properties": {"Name": title("   ")}}
    ]});
    let gps = json!({"pages": [
        {"id": "gp-1", "properties": {
            "Name": title("Summit Partners"),
            "👞 CRM Distributor": relation(&["dist-1"])
        }}
    ]});
    let people = json!({"pages": [
        {"id": "person-1", "properties": {
            "Name": title("Ana Ruiz"),
            "Email": {"type": "email", "email": "ana@acme.pe"},
            "💰 CRM LPs": relation(&["lp-1", "lp-missing"]),
            "🌆 CRM GPs": relation(&["gp-1"])
        }}
    ]});
    let funds = json!({"pages": [
        {"id": "fund-1", "properties": {
            "Fund Name": title("Summit Growth IV"),
            "Hard Cap mn": {"type": "number", "number": 750},
            "Closed": {"type": "checkbox", "checkbox": false},
            "GP": relation(&["gp-1"])
        }}
    ]});
    let notes = json!({"pages": [
        {
            "id": "note-1",
            "created_time": "2025-02-01T09:00:00.000Z",
            "properties": {
                "Name": title("Lima meeting"),
                "Date": {"type": "date", "date": {"start": "2025-03-10"}},
                "PIN": select("★"),
                "AI summary": {"type": "rich_text", "rich_text": [{"plain_text": "Keen on IV"}]},
                "CRM LPs": relation(&["lp-1"]),
                "CRM GPs": relation(&["gp-1"]),
                "Fundraise": relation(&["fund-1"])
            },
            "blocks": [
                {"type": "paragraph", "paragraph": {"rich_text": [{"plain_text": "Discussed allocation."}]}},
                {"type": "image", "local_image_path": "notion_images/n1.png"}
            ]
        },
        {
            "id": "note-2",
            "created_time": "2025-02-03T11:00:00.000Z",
            "properties": {"CRM LPs": relation(&["lp-2"])}
        }
    ]});

    vec![
        (ImportKind::Distributors, write_export(cfg, "distributors.json", &distributors.to_string())),
        (ImportKind::Lps, write_export(cfg, "lps.json", &lps.to_string())),
        (ImportKind::Gps, write_export(cfg, "gps.json", &gps.to_string())),
        (ImportKind::People, write_export(cfg, "people.json", &people.to_string())),
        (ImportKind::Funds, write_export(cfg, "funds.json", &funds.to_string())),
        (ImportKind::Notes, write_export(cfg, "notes.json", &notes.to_string())),
    ]
}

#[tokio::test]
async fn test_notion_import_all_kinds() {
    let (_tmp, cfg, pool) = setup().await;
    let files = full_export(&cfg);

    let mut reports = Vec::new();
    for (kind, path) in &files {
        reports.push(import(&pool, *kind, path).await);
    }

    let lp_report = &reports[1];
    assert_eq!(lp_report.rows, 3);
    assert_eq!(lp_report.imported, 2);
    assert_eq!(lp_report.skipped, 1);

    let lps = repo::list::<Lp>(&pool).await.unwrap();
    assert_eq!(lps.len(), 2);
    assert_eq!(lps[0].name, "Acme Pension");
    assert_eq!(lps[0].aum_billions, Some(12.5));
    assert_eq!(lps[0].intl_alts.as_deref(), Some("Yes"));

    let gps = repo::list::<Gp>(&pool).await.unwrap();
    let dists = repo::list::<Distributor>(&pool).await.unwrap();
    assert_eq!(gps[0].distributor_id, Some(dists[0].id));

    // Missing relation targets are skipped, known ones linked.
    let people = repo::list::<Person>(&pool).await.unwrap();
    let mut conn = pool.acquire().await.unwrap();
    let person_lps = links::parents::<Lp>(&pool, Link::LpPerson, people[0].id).await.unwrap();
    assert_eq!(person_lps.len(), 1);
    assert_eq!(reports[3].links, 2);

    let funds = repo::list::<Fund>(&pool).await.unwrap();
    assert_eq!(funds[0].gp_id, Some(gps[0].id));
    assert_eq!(funds[0].hard_cap_mn, Some(750.0));

    let notes = repo::list::<Note>(&pool).await.unwrap();
    assert_eq!(notes.len(), 2);
    let lima = notes.iter().find(|n| n.notion_id.as_deref() == Some("note-1")).unwrap();
    assert!(lima.useful);
    assert_eq!(lima.summary, "Keen on IV");
    assert_eq!(lima.content_text.as_deref(), Some("Discussed allocation."));
    assert_eq!(lima.image_paths.as_deref(), Some("notion_images/n1.png"));
    assert_eq!(lima.date.to_string(), "2025-03-10 00:00:00");

    // Undated note falls back to its creation time.
    let undated = notes.iter().find(|n| n.notion_id.as_deref() == Some("note-2")).unwrap();
    assert_eq!(undated.date.to_string(), "2025-02-03 11:00:00");

    let fund_ids = links::child_ids(&mut *conn, Link::NoteFund, lima.id).await.unwrap();
    assert_eq!(fund_ids, vec![funds[0].id]);

    // The note fed the funnel.
    let funnel = funnel::fund_funnel(&pool, funds[0].id, false).await.unwrap();
    assert_eq!(funnel.len(), 1);
    assert_eq!(funnel[0].lp_name, "Acme Pension");
    assert_eq!(funnel[0].last_note_id, Some(lima.id));
}

#[tokio::test]
async fn test_reimport_updates_in_place() {
    let (_tmp, cfg, pool) = setup().await;
    let path = write_export(
        &cfg,
        "lps.json",
        &json!({"pages": [{"id": "lp-1", "properties": {"Name": title("Acme Pension")}}]}).to_string(),
    );
    let first = import(&pool, ImportKind::Lps, &path).await;
    assert_eq!(first.imported, 1);

    // Same bytes: skipped by checkpoint.
    let again = import(&pool, ImportKind::Lps, &path).await;
    assert!(again.unchanged);

    fs::write(
        &path,
        json!({"pages": [{"id": "lp-1", "properties": {"Name": title("Acme Pension Fund")}}]}).to_string(),
    )
    .unwrap();
    let changed = import(&pool, ImportKind::Lps, &path).await;
    assert_eq!(changed.imported, 0);
    assert_eq!(changed.updated, 1);

    let lps = repo::list::<Lp>(&pool).await.unwrap();
    assert_eq!(lps.len(), 1);
    assert_eq!(lps[0].name, "Acme Pension Fund");

    let forced = run_import(
        &pool,
        ImportKind::Lps,
        &path,
        ImportFormat::Notion,
        ImportOptions { dry_run: false, force: true },
    )
    .await
    .unwrap();
    assert!(!forced.unchanged);
    assert_eq!(forced.updated, 1);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let (_tmp, cfg, pool) = setup().await;
    let path = write_export(
        &cfg,
        "people.json",
        &json!({"pages": [{"id": "p-1", "properties": {"Name": title("Ana Ruiz")}}]}).to_string(),
    );

    let report = run_import(
        &pool,
        ImportKind::People,
        &path,
        ImportFormat::Notion,
        ImportOptions { dry_run: true, force: false },
    )
    .await
    .unwrap();
    assert!(report.dry_run);
    assert_eq!(report.imported, 1);
    assert!(repo::list::<Person>(&pool).await.unwrap().is_empty());

    // No checkpoint either: a real import still runs.
    let real = import(&pool, ImportKind::People, &path).await;
    assert!(!real.unchanged);
    assert_eq!(real.imported, 1);
}

#[tokio::test]
async fn test_csv_gp_import_creates_related_rows() {
    let (_tmp, cfg, pool) = setup().await;
    let csv = "\u{feff}Name,Location,👞 CRM Distributor,💰 CRM LPs,🕴️ CRM People \n\
               Summit Partners,NYC,Andes Placement (https://www.notion.so/Andes-1),\"Acme Pension (https://www.notion.so/a), Beta Insurance (https://www.notion.so/b)\",Ana Ruiz (https://www.notion.so/c)\n\
               ,ignored,,,\n";
    let path = write_export(&cfg, "CRM GPs.csv", csv);

    let report = import(&pool, ImportKind::Gps, &path).await;
    assert_eq!(report.format, ImportFormat::Csv);
    assert_eq!(report.rows, 2);
    assert_eq!(report.imported, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.links, 3);

    let gps = repo::list::<Gp>(&pool).await.unwrap();
    assert_eq!(gps[0].location.as_deref(), Some("NYC"));
    let dists = repo::list::<Distributor>(&pool).await.unwrap();
    assert_eq!(dists[0].name, "Andes Placement");
    assert_eq!(gps[0].distributor_id, Some(dists[0].id));

    let lps = links::children::<Lp>(&pool, Link::GpLp, gps[0].id).await.unwrap();
    let names: Vec<&str> = lps.iter().map(|lp| lp.name.as_str()).collect();
    assert_eq!(names, vec!["Acme Pension", "Beta Insurance"]);
}

#[tokio::test]
async fn test_csv_distributors_and_person_links() {
    let (_tmp, cfg, pool) = setup().await;
    let gps = write_export(&cfg, "gps.csv", "Name\nSummit Partners\n");
    let lps = write_export(&cfg, "lps.csv", "Name,AUM (B),Priority\nAcme Pension,\"1,250.5\",High\n");
    let people = write_export(&cfg, "people.csv", "Name,Email\nAna Ruiz,ana@acme.pe\n");
    import(&pool, ImportKind::Gps, &gps).await;
    import(&pool, ImportKind::Lps, &lps).await;
    import(&pool, ImportKind::People, &people).await;

    let lp = &repo::list::<Lp>(&pool).await.unwrap()[0];
    assert_eq!(lp.aum_billions, Some(1250.5));

    let dists = write_export(
        &cfg,
        "distributors.csv",
        "Name,Headquarter,Managers,🕴️ CRM People \n\
         Andes Placement,Lima,Summit Partners (https://www.notion.so/s),Ana Ruiz (https://www.notion.so/a)\n",
    );
    let report = import(&pool, ImportKind::Distributors, &dists).await;
    assert_eq!(report.links, 2);
    let dist = &repo::list::<Distributor>(&pool).await.unwrap()[0];
    let gp = &repo::list::<Gp>(&pool).await.unwrap()[0];
    assert_eq!(gp.distributor_id, Some(dist.id));

    // A GP export without a distributor cell leaves the link alone.
    let gps_again = write_export(
        &cfg,
        "gps.csv",
        "Name,Location,👞 CRM Distributor\nSummit Partners,NYC,\n",
    );
    let report = import(&pool, ImportKind::Gps, &gps_again).await;
    assert_eq!(report.updated, 1);
    let gp = &repo::list::<Gp>(&pool).await.unwrap()[0];
    assert_eq!(gp.location.as_deref(), Some("NYC"));
    assert_eq!(gp.distributor_id, Some(dist.id));

    let links_csv = write_export(
        &cfg,
        "person-links.csv",
        "Name,🌆 CRM GPs,💰 CRM LPs\n\
         Ana Ruiz,Summit Partners (https://www.notion.so/s),Acme Pension (https://www.notion.so/a)\n\
         Nobody,Summit Partners (https://www.notion.so/s),\n",
    );
    let report = import(&pool, ImportKind::PersonLinks, &links_csv).await;
    assert_eq!(report.links, 2);
    assert_eq!(report.skipped, 1);

    let person = &repo::list::<Person>(&pool).await.unwrap()[0];
    let person_gps = links::parents::<Gp>(&pool, Link::GpPerson, person.id).await.unwrap();
    assert_eq!(person_gps.len(), 1);
}

#[tokio::test]
async fn test_csv_upsert_keeps_notion_id() {
    let (_tmp, cfg, pool) = setup().await;
    let json_path = write_export(
        &cfg,
        "lps.json",
        &json!({"pages": [{"id": "lp-1", "properties": {"Name": title("Acme Pension")}}]}).to_string(),
    );
    import(&pool, ImportKind::Lps, &json_path).await;

    let csv_path = write_export(&cfg, "lps.csv", "Name,Location\nAcme Pension,Lima\n");
    let report = import(&pool, ImportKind::Lps, &csv_path).await;
    assert_eq!(report.updated, 1);

    let lps = repo::list::<Lp>(&pool).await.unwrap();
    assert_eq!(lps.len(), 1);
    assert_eq!(lps[0].location.as_deref(), Some("Lima"));
    assert_eq!(lps[0].notion_id.as_deref(), Some("lp-1"));
}

#[tokio::test]
async fn test_unsupported_combinations_fail() {
    let (_tmp, cfg, pool) = setup().await;
    let path = write_export(&cfg, "notes.csv", "Name\nx\n");
    let err = run_import(&pool, ImportKind::Notes, &path, ImportFormat::Csv, ImportOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Notion JSON"));

    let bad = write_export(&cfg, "lps.json", "not json");
    assert!(run_import(&pool, ImportKind::Lps, &bad, ImportFormat::Notion, ImportOptions::default())
        .await
        .is_err());
}

#[tokio::test]
async fn test_run_all_imports_in_dependency_order() {
    let (_tmp, cfg, pool) = setup().await;
    full_export(&cfg);

    let reports = run_all(&cfg, &pool, &cfg.import.export_dir, ImportOptions::default())
        .await
        .unwrap();
    let kinds: Vec<ImportKind> = reports.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ImportKind::Distributors,
            ImportKind::Lps,
            ImportKind::Gps,
            ImportKind::People,
            ImportKind::Funds,
            ImportKind::Notes,
        ]
    );

    let funds = repo::list::<Fund>(&pool).await.unwrap();
    assert!(funds[0].gp_id.is_some());
    let interests = funnel::fund_funnel(&pool, funds[0].id, false).await.unwrap();
    assert_eq!(interests.len(), 1);
}

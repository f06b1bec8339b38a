//! Notion export parsing.
//!
//! Exports are the JSON written by the workspace exporter:
//!
//! ```json
//! { "pages": [ { "id": "…", "created_time": "…", "properties": { … }, "blocks": [ … ] } ] }
//! ```
//!
//! Property values follow the Notion API shape (`{"type": "select",
//! "select": {"name": "High"}}`). Blocks are rendered to plain text with
//! light markdown prefixes; image blocks contribute their downloaded
//! `local_image_path` instead of text.

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Export {
    #[serde(default)]
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub blocks: Vec<Value>,
}

/// A property reduced to what the importers store.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Relation(Vec<String>),
    Empty,
}

impl PropertyValue {
    /// Text form for a TEXT column. Empty strings become `None`.
    pub fn into_text(self) -> Option<String> {
        match self {
            PropertyValue::Text(s) if !s.trim().is_empty() => Some(s),
            PropertyValue::Number(n) => Some(format_number(n)),
            PropertyValue::Bool(b) => Some(b.to_string()),
            PropertyValue::Relation(ids) if !ids.is_empty() => Some(ids.join(", ")),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            PropertyValue::Text(s) => s.trim().replace(',', "").parse().ok(),
            _ => None,
        }
    }

    /// Whether the property holds anything at all (a ticked checkbox, a
    /// non-empty text, any number, at least one relation).
    pub fn is_set(&self) -> bool {
        match self {
            PropertyValue::Text(s) => !s.trim().is_empty(),
            PropertyValue::Number(_) => true,
            PropertyValue::Bool(b) => *b,
            PropertyValue::Relation(ids) => !ids.is_empty(),
            PropertyValue::Empty => false,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn rich_text(items: Option<&Value>) -> String {
    let Some(Value::Array(items)) = items else {
        return String::new();
    };
    items
        .iter()
        .map(|item| {
            item.get("plain_text")
                .and_then(Value::as_str)
                .or_else(|| item.pointer("/text/content").and_then(Value::as_str))
                .unwrap_or("")
        })
        .collect()
}

fn select_name(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|v| v.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Reduce one Notion property object to a [`PropertyValue`].
pub fn extract(prop: &Value) -> PropertyValue {
    let kind = prop.get("type").and_then(Value::as_str).unwrap_or("");
    match kind {
        "title" | "rich_text" => PropertyValue::Text(rich_text(prop.get(kind))),
        "number" => prop
            .get("number")
            .and_then(Value::as_f64)
            .map_or(PropertyValue::Empty, PropertyValue::Number),
        "select" | "status" => select_name(prop.get(kind))
            .map_or(PropertyValue::Empty, PropertyValue::Text),
        "multi_select" => {
            let names: Vec<String> = prop
                .get("multi_select")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(|i| select_name(Some(i))).collect())
                .unwrap_or_default();
            if names.is_empty() {
                PropertyValue::Empty
            } else {
                PropertyValue::Text(names.join(", "))
            }
        }
        "date" => prop
            .pointer("/date/start")
            .and_then(Value::as_str)
            .map_or(PropertyValue::Empty, |s| PropertyValue::Text(s.to_string())),
        "checkbox" => PropertyValue::Bool(
            prop.get("checkbox").and_then(Value::as_bool).unwrap_or(false),
        ),
        "email" | "phone_number" | "url" => prop
            .get(kind)
            .and_then(Value::as_str)
            .map_or(PropertyValue::Empty, |s| PropertyValue::Text(s.to_string())),
        "relation" => PropertyValue::Relation(
            prop.get("relation")
                .and_then(Value::as_array)
                .map(|rels| {
                    rels.iter()
                        .filter_map(|r| r.get("id").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        ),
        "rollup" => extract_rollup(prop.get("rollup")),
        _ => PropertyValue::Empty,
    }
}

fn extract_rollup(rollup: Option<&Value>) -> PropertyValue {
    let Some(rollup) = rollup else {
        return PropertyValue::Empty;
    };
    match rollup.get("type").and_then(Value::as_str) {
        Some("number") => rollup
            .get("number")
            .and_then(Value::as_f64)
            .map_or(PropertyValue::Empty, PropertyValue::Number),
        Some("array") => {
            let names: Vec<String> = rollup
                .get("array")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter(|i| i.get("type").and_then(Value::as_str) == Some("select"))
                        .filter_map(|i| select_name(i.get("select")))
                        .collect()
                })
                .unwrap_or_default();
            if names.is_empty() {
                PropertyValue::Empty
            } else {
                PropertyValue::Text(names.join(", "))
            }
        }
        _ => PropertyValue::Empty,
    }
}

impl Page {
    /// Look up a property by name. Notion keeps stray trailing spaces in
    /// some property names, so a trimmed match is accepted too.
    pub fn property(&self, name: &str) -> PropertyValue {
        self.properties
            .get(name)
            .or_else(|| {
                self.properties
                    .iter()
                    .find(|(key, _)| key.trim() == name)
                    .map(|(_, value)| value)
            })
            .map_or(PropertyValue::Empty, extract)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.property(name).into_text()
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.property(name).as_number()
    }

    pub fn checkbox(&self, name: &str) -> bool {
        matches!(self.property(name), PropertyValue::Bool(true))
    }

    /// Page ids of a relation property (empty for any other type).
    pub fn relation(&self, name: &str) -> Vec<String> {
        match self.property(name) {
            PropertyValue::Relation(ids) => ids,
            _ => Vec::new(),
        }
    }
}

/// Text and image paths rendered from a list of blocks.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct RenderedContent {
    pub text: String,
    pub image_paths: Vec<String>,
}

/// Render blocks to text paragraphs separated by blank lines.
pub fn render_blocks(blocks: &[Value]) -> RenderedContent {
    let mut out = RenderedContent::default();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut list_number = 0;

    for block in blocks {
        let kind = block.get("type").and_then(Value::as_str).unwrap_or("");
        if kind == "image" {
            if let Some(path) = block.get("local_image_path").and_then(Value::as_str) {
                out.image_paths.push(path.to_string());
            }
            continue;
        }

        if kind == "numbered_list_item" {
            list_number += 1;
        } else {
            list_number = 0;
        }

        if let Some(text) = render_block(block, kind, list_number) {
            paragraphs.push(text);
        }
    }

    out.text = paragraphs.join("\n\n");
    out
}

fn render_block(block: &Value, kind: &str, list_number: usize) -> Option<String> {
    let text = rich_text(block.get(kind).and_then(|b| b.get("rich_text")));
    if text.trim().is_empty() {
        return None;
    }
    let rendered = match kind {
        "paragraph" | "callout" | "toggle" => text,
        "bulleted_list_item" => format!("• {}", text),
        "numbered_list_item" => format!("{}. {}", list_number, text),
        "heading_1" => format!("# {}", text),
        "heading_2" => format!("## {}", text),
        "heading_3" => format!("### {}", text),
        "quote" => format!("> {}", text),
        "code" => format!("```\n{}\n```", text),
        "to_do" => {
            let checked = block
                .pointer("/to_do/checked")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            format!("[{}] {}", if checked { "x" } else { " " }, text)
        }
        _ => return None,
    };
    Some(rendered)
}

/// Render a stored `content_json` value.
///
/// Accepts an array of blocks or a single block; anything that is not JSON
/// is returned as plain text.
pub fn render_content_json(raw: &str) -> RenderedContent {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(blocks)) => render_blocks(&blocks),
        Ok(block @ Value::Object(_)) => render_blocks(std::slice::from_ref(&block)),
        _ => RenderedContent {
            text: raw.to_string(),
            image_paths: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(properties: Value) -> Page {
        serde_json::from_value(json!({"id": "p1", "properties": properties})).unwrap()
    }

    #[test]
    fn test_extract_text_kinds() {
        let p = page(json!({
            "Name": {"type": "title", "title": [{"plain_text": "Afore "}, {"plain_text": "Norte"}]},
            "Text": {"type": "rich_text", "rich_text": [{"text": {"content": "fallback"}}]},
            "Priority": {"type": "select", "select": {"name": "High"}},
            "Sectors": {"type": "multi_select", "multi_select": [{"name": "Energy"}, {"name": "Infra"}]},
            "Email": {"type": "email", "email": "a@b.mx"},
            "Date": {"type": "date", "date": {"start": "2025-03-01", "end": null}},
            "Empty": {"type": "rich_text", "rich_text": []}
        }));
        assert_eq!(p.text("Name").as_deref(), Some("Afore Norte"));
        assert_eq!(p.text("Text").as_deref(), Some("fallback"));
        assert_eq!(p.text("Priority").as_deref(), Some("High"));
        assert_eq!(p.text("Sectors").as_deref(), Some("Energy, Infra"));
        assert_eq!(p.text("Email").as_deref(), Some("a@b.mx"));
        assert_eq!(p.text("Date").as_deref(), Some("2025-03-01"));
        assert_eq!(p.text("Empty"), None);
        assert_eq!(p.text("Missing"), None);
    }

    #[test]
    fn test_extract_numbers_checkbox_relation() {
        let p = page(json!({
            "AUM (B)": {"type": "number", "number": 12.5},
            "Closed": {"type": "checkbox", "checkbox": true},
            "GP": {"type": "relation", "relation": [{"id": "gp-1"}, {"id": "gp-2"}]},
            "Null select": {"type": "select", "select": null}
        }));
        assert_eq!(p.number("AUM (B)"), Some(12.5));
        assert!(p.checkbox("Closed"));
        assert!(!p.checkbox("Missing"));
        assert_eq!(p.relation("GP"), vec!["gp-1", "gp-2"]);
        assert!(p.relation("AUM (B)").is_empty());
        assert_eq!(p.property("Null select"), PropertyValue::Empty);
    }

    #[test]
    fn test_extract_rollup() {
        let number = json!({"type": "rollup", "rollup": {"type": "number", "number": 3}});
        assert_eq!(extract(&number), PropertyValue::Number(3.0));

        let array = json!({"type": "rollup", "rollup": {"type": "array", "array": [
            {"type": "select", "select": {"name": "Mexico"}},
            {"type": "rich_text", "rich_text": []},
            {"type": "select", "select": {"name": "Chile"}}
        ]}});
        assert_eq!(
            extract(&array),
            PropertyValue::Text("Mexico, Chile".to_string())
        );
    }

    #[test]
    fn test_whole_numbers_render_without_decimals() {
        assert_eq!(PropertyValue::Number(30.0).into_text().as_deref(), Some("30"));
        assert_eq!(PropertyValue::Number(2.5).into_text().as_deref(), Some("2.5"));
    }

    #[test]
    fn test_render_blocks() {
        let blocks = vec![
            json!({"type": "heading_2", "heading_2": {"rich_text": [{"plain_text": "Agenda"}]}}),
            json!({"type": "bulleted_list_item", "bulleted_list_item": {"rich_text": [{"plain_text": "Fund II"}]}}),
            json!({"type": "numbered_list_item", "numbered_list_item": {"rich_text": [{"plain_text": "Intro"}]}}),
            json!({"type": "numbered_list_item", "numbered_list_item": {"rich_text": [{"plain_text": "Terms"}]}}),
            json!({"type": "image", "image": {"type": "file"}, "local_image_path": "notion_images/a.png"}),
            json!({"type": "paragraph", "paragraph": {"rich_text": []}}),
            json!({"type": "quote", "quote": {"rich_text": [{"plain_text": "Call back in May"}]}}),
            json!({"type": "code", "code": {"rich_text": [{"plain_text": "IRR 18%"}]}}),
        ];
        let rendered = render_blocks(&blocks);
        assert_eq!(
            rendered.text,
            "## Agenda\n\n• Fund II\n\n1. Intro\n\n2. Terms\n\n> Call back in May\n\n```\nIRR 18%\n```"
        );
        assert_eq!(rendered.image_paths, vec!["notion_images/a.png"]);
    }

    #[test]
    fn test_render_content_json_falls_back_to_plain_text() {
        let rendered = render_content_json("met at the office");
        assert_eq!(rendered.text, "met at the office");
        assert!(rendered.image_paths.is_empty());

        let single = render_content_json(
            r#"{"type": "paragraph", "paragraph": {"rich_text": [{"plain_text": "hi"}]}}"#,
        );
        assert_eq!(single.text, "hi");
    }
}

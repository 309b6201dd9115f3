//! Conversion between Notion blocks and markdown, and page metadata parsing.
//!
//! Only top-level blocks are handled. Block kinds: paragraph, heading 1-3,
//! bulleted and numbered list items, to-do, toggle, code, quote, divider and
//! callout. Unknown kinds keep their plain text.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use mirror_core::PageId;

/// Kinds that [`markdown_to_blocks`] recreates exactly from
/// [`blocks_to_markdown`] output. Callouts come back as quotes, so they are
/// not listed.
const ROUND_TRIP_KINDS: &[&str] = &[
    "paragraph",
    "heading_1",
    "heading_2",
    "heading_3",
    "bulleted_list_item",
    "numbered_list_item",
    "to_do",
    "toggle",
    "code",
    "quote",
    "divider",
];

/// Notion caps a single rich-text item at 2000 characters.
const RICH_TEXT_LIMIT: usize = 2000;
const DEFAULT_CALLOUT_ICON: &str = "💡";

/// Page metadata from a page object or a database query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMeta {
    pub id: PageId,
    pub title: String,
    pub parent_id: Option<PageId>,
    pub last_edited: DateTime<Utc>,
    pub archived: bool,
}

/// Read the fields we mirror from a Notion page object.
pub fn parse_page(page: &Value) -> Result<PageMeta, String> {
    let id = page
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or("page object has no id")?;

    let title = page
        .get("properties")
        .and_then(Value::as_object)
        .and_then(|props| {
            props
                .values()
                .find(|p| p.get("type").and_then(Value::as_str) == Some("title"))
        })
        .and_then(|p| p.get("title"))
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("plain_text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let parent = page.get("parent");
    let parent_id = ["database_id", "page_id"]
        .iter()
        .find_map(|key| parent.and_then(|p| p.get(*key)).and_then(Value::as_str))
        .map(PageId::from);

    let edited = page
        .get("last_edited_time")
        .and_then(Value::as_str)
        .ok_or_else(|| format!("page {id} has no last_edited_time"))?;
    let last_edited = DateTime::parse_from_rfc3339(edited)
        .map_err(|e| format!("page {id}: bad last_edited_time '{edited}': {e}"))?
        .with_timezone(&Utc);

    let archived = page
        .get("archived")
        .or_else(|| page.get("in_trash"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(PageMeta {
        id: PageId::from(id),
        title,
        parent_id,
        last_edited,
        archived,
    })
}

fn plain_text(rich_text: Option<&Value>) -> String {
    rich_text
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("plain_text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

fn is_plain_text_item(item: &Value) -> bool {
    let is_text = item.get("type").and_then(Value::as_str).unwrap_or("text") == "text";
    let no_link = item.get("href").map_or(true, Value::is_null);
    let plain = item
        .get("annotations")
        .and_then(Value::as_object)
        .map_or(true, |annotations| {
            annotations.iter().all(|(key, value)| match key.as_str() {
                "color" => value.as_str().map_or(true, |c| c == "default"),
                _ => value.as_bool() != Some(true),
            })
        });
    is_text && no_link && plain
}

/// Whether deleting `block` and recreating it from its markdown loses
/// nothing: a round-trip kind, no nested children, unformatted text.
pub fn round_trips(block: &Value) -> bool {
    let kind = block.get("type").and_then(Value::as_str).unwrap_or_default();
    if !ROUND_TRIP_KINDS.contains(&kind) {
        return false;
    }
    if block.get("has_children").and_then(Value::as_bool) == Some(true) {
        return false;
    }
    block
        .get(kind)
        .and_then(|data| data.get("rich_text"))
        .and_then(Value::as_array)
        .map_or(true, |items| items.iter().all(is_plain_text_item))
}

/// Render blocks as markdown, one block per paragraph.
pub fn blocks_to_markdown(blocks: &[Value]) -> String {
    let mut out = Vec::with_capacity(blocks.len());
    for block in blocks {
        let kind = block.get("type").and_then(Value::as_str).unwrap_or_default();
        let data = block.get(kind);
        let text = plain_text(data.and_then(|d| d.get("rich_text")));
        let rendered = match kind {
            "paragraph" => text,
            "heading_1" => format!("# {text}"),
            "heading_2" => format!("## {text}"),
            "heading_3" => format!("### {text}"),
            "bulleted_list_item" => format!("- {text}"),
            "numbered_list_item" => format!("1. {text}"),
            "to_do" => {
                let checked = data
                    .and_then(|d| d.get("checked"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                format!("- [{}] {text}", if checked { "x" } else { " " })
            }
            "toggle" => format!("<details><summary>{text}</summary></details>"),
            "code" => {
                let language = data
                    .and_then(|d| d.get("language"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                format!("```{language}\n{text}\n```")
            }
            "quote" => format!("> {text}"),
            "divider" => "---".to_string(),
            "callout" => {
                let icon = data
                    .and_then(|d| d.get("icon"))
                    .and_then(|i| i.get("emoji"))
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_CALLOUT_ICON);
                format!("> {icon} {text}")
            }
            _ if text.is_empty() => continue,
            _ => text,
        };
        out.push(rendered);
    }
    out.join("\n\n")
}

fn rich_text(content: &str) -> Value {
    let chars: Vec<char> = content.chars().collect();
    let items: Vec<Value> = chars
        .chunks(RICH_TEXT_LIMIT)
        .map(|chunk| {
            let piece: String = chunk.iter().collect();
            json!({ "type": "text", "text": { "content": piece } })
        })
        .collect();
    Value::Array(items)
}

fn text_block(kind: &str, content: &str) -> Value {
    json!({ "object": "block", "type": kind, kind: { "rich_text": rich_text(content) } })
}

fn numbered_item(line: &str) -> Option<&str> {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    line[digits..].strip_prefix(". ")
}

fn toggle_summary(line: &str) -> Option<&str> {
    line.strip_prefix("<details><summary>")?
        .strip_suffix("</summary></details>")
}

/// Parse a markdown body into blocks ready for the append-children call.
///
/// The inverse of [`blocks_to_markdown`] for the block kinds it produces.
/// Callouts come back as quotes.
pub fn markdown_to_blocks(body: &str) -> Vec<Value> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut lines = body.lines();

    let flush = |paragraph: &mut Vec<&str>, blocks: &mut Vec<Value>| {
        if !paragraph.is_empty() {
            blocks.push(text_block("paragraph", &paragraph.join("\n")));
            paragraph.clear();
        }
    };

    while let Some(line) = lines.next() {
        let trimmed = line.trim_end();

        if let Some(language) = trimmed.strip_prefix("```") {
            flush(&mut paragraph, &mut blocks);
            let mut code = Vec::new();
            for inner in lines.by_ref() {
                if inner.trim_end() == "```" {
                    break;
                }
                code.push(inner);
            }
            let language = if language.trim().is_empty() {
                "plain text"
            } else {
                language.trim()
            };
            blocks.push(json!({
                "object": "block",
                "type": "code",
                "code": { "rich_text": rich_text(&code.join("\n")), "language": language }
            }));
            continue;
        }

        if trimmed.is_empty() {
            flush(&mut paragraph, &mut blocks);
            continue;
        }

        let block = if let Some(text) = trimmed.strip_prefix("### ") {
            text_block("heading_3", text)
        } else if let Some(text) = trimmed.strip_prefix("## ") {
            text_block("heading_2", text)
        } else if let Some(text) = trimmed.strip_prefix("# ") {
            text_block("heading_1", text)
        } else if let Some(text) = trimmed.strip_prefix("- [ ] ") {
            json!({ "object": "block", "type": "to_do",
                    "to_do": { "rich_text": rich_text(text), "checked": false } })
        } else if let Some(text) = trimmed
            .strip_prefix("- [x] ")
            .or_else(|| trimmed.strip_prefix("- [X] "))
        {
            json!({ "object": "block", "type": "to_do",
                    "to_do": { "rich_text": rich_text(text), "checked": true } })
        } else if let Some(text) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        {
            text_block("bulleted_list_item", text)
        } else if let Some(text) = numbered_item(trimmed) {
            text_block("numbered_list_item", text)
        } else if let Some(text) = trimmed.strip_prefix("> ") {
            text_block("quote", text)
        } else if trimmed == "---" {
            json!({ "object": "block", "type": "divider", "divider": {} })
        } else if let Some(text) = toggle_summary(trimmed) {
            text_block("toggle", text)
        } else {
            paragraph.push(trimmed);
            continue;
        };
        flush(&mut paragraph, &mut blocks);
        blocks.push(block);
    }
    flush(&mut paragraph, &mut blocks);
    blocks
}

//! Blocking Notion REST client implementing [`DocumentService`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use mirror_core::{PageId, RemoteContent, RemoteListing};
use mirror_sync::{DocumentService, RemoteError};

use crate::blocks::{blocks_to_markdown, markdown_to_blocks, parse_page, round_trips, PageMeta};
use crate::error::NotionError;
use crate::token::TokenProvider;

pub const BASE_URL: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;
/// Most children the append endpoint accepts per call.
const APPEND_BATCH: usize = 100;
const TIMEOUT: Duration = Duration::from_secs(30);

/// Notion ids with dashes: 32 hex characters become `8-4-4-4-12`. Anything
/// else is returned unchanged.
pub fn format_id(id: &str) -> String {
    let clean: String = id.chars().filter(|c| *c != '-').collect();
    if clean.len() != 32 || !clean.is_ascii() {
        return id.to_string();
    }
    format!(
        "{}-{}-{}-{}-{}",
        &clean[..8],
        &clean[8..12],
        &clean[12..16],
        &clean[16..20],
        &clean[20..]
    )
}

/// Client for one Notion database.
pub struct NotionClient {
    agent: ureq::Agent,
    base_url: String,
    token: String,
    database_id: String,
}

impl NotionClient {
    pub fn new(database_id: &str, token: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(TIMEOUT)
            .timeout_read(TIMEOUT)
            .timeout_write(TIMEOUT)
            .build();
        Self {
            agent,
            base_url: BASE_URL.to_string(),
            token,
            database_id: format_id(database_id),
        }
    }

    pub fn from_provider(
        database_id: &str,
        provider: &dyn TokenProvider,
    ) -> Result<Self, NotionError> {
        Ok(Self::new(database_id, provider.token()?))
    }

    /// Point the client at another API root (a proxy or a test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: &str, endpoint: &str, body: Option<Value>) -> Result<Value, NotionError> {
        let url = format!("{}/{endpoint}", self.base_url);
        tracing::debug!(method, endpoint, "notion request");
        let request = self
            .agent
            .request(method, &url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Notion-Version", NOTION_VERSION);
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        match result {
            Ok(response) => response.into_json::<Value>().map_err(|e| NotionError::Decode {
                endpoint: endpoint.to_string(),
                detail: e.to_string(),
            }),
            Err(ureq::Error::Status(status, response)) => Err(NotionError::Status {
                status,
                endpoint: endpoint.to_string(),
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => Err(NotionError::Transport {
                endpoint: endpoint.to_string(),
                detail: transport.to_string(),
            }),
        }
    }

    fn decode_error(endpoint: &str, detail: impl Into<String>) -> NotionError {
        NotionError::Decode {
            endpoint: endpoint.to_string(),
            detail: detail.into(),
        }
    }

    /// Every live page of the database, following pagination.
    pub fn query_database(&self) -> Result<Vec<PageMeta>, NotionError> {
        let endpoint = format!("databases/{}/query", self.database_id);
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(cursor) = &cursor {
                body["start_cursor"] = json!(cursor);
            }
            let response = self.request("POST", &endpoint, Some(body))?;
            for result in results(&response) {
                let meta = parse_page(result).map_err(|e| Self::decode_error(&endpoint, e))?;
                if !meta.archived {
                    pages.push(meta);
                }
            }
            match next_cursor(&response) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        tracing::debug!(count = pages.len(), "queried database");
        Ok(pages)
    }

    pub fn page(&self, id: &str) -> Result<PageMeta, NotionError> {
        let endpoint = format!("pages/{}", format_id(id));
        let response = self.request("GET", &endpoint, None)?;
        parse_page(&response).map_err(|e| Self::decode_error(&endpoint, e))
    }

    /// All top-level child blocks of a page, following pagination.
    pub fn block_children(&self, id: &str) -> Result<Vec<Value>, NotionError> {
        let base = format!("blocks/{}/children", format_id(id));
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let endpoint = match &cursor {
                Some(cursor) => format!("{base}?page_size={PAGE_SIZE}&start_cursor={cursor}"),
                None => format!("{base}?page_size={PAGE_SIZE}"),
            };
            let response = self.request("GET", &endpoint, None)?;
            blocks.extend(results(&response).cloned());
            match next_cursor(&response) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(blocks)
    }

    /// Replace every top-level block of a page.
    ///
    /// Refuses with [`NotionError::Unrepresentable`] when any existing block
    /// would not come back from markdown unchanged; nothing is deleted then.
    pub fn replace_children(&self, id: &str, blocks: &[Value]) -> Result<(), NotionError> {
        let existing = self.block_children(id)?;
        let lossy: Vec<&str> = existing
            .iter()
            .filter(|child| !round_trips(child))
            .map(|child| child.get("type").and_then(Value::as_str).unwrap_or("unknown"))
            .collect();
        if !lossy.is_empty() {
            tracing::warn!(id, blocks = ?lossy, "refusing to replace page content");
            return Err(NotionError::Unrepresentable {
                page: format_id(id),
                blocks: lossy.join(", "),
            });
        }

        for child in &existing {
            let Some(child_id) = child.get("id").and_then(Value::as_str) else {
                continue;
            };
            self.request("DELETE", &format!("blocks/{child_id}"), None)?;
        }
        let endpoint = format!("blocks/{}/children", format_id(id));
        for batch in blocks.chunks(APPEND_BATCH) {
            self.request("PATCH", &endpoint, Some(json!({ "children": batch })))?;
        }
        Ok(())
    }
}

fn results(response: &Value) -> impl Iterator<Item = &Value> {
    response
        .get("results")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn next_cursor(response: &Value) -> Option<String> {
    if response.get("has_more").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    response
        .get("next_cursor")
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl DocumentService for NotionClient {
    fn list_pages(&self) -> Result<Vec<RemoteListing>, RemoteError> {
        Ok(self
            .query_database()?
            .into_iter()
            .map(|meta| RemoteListing {
                id: meta.id,
                remote_edited_at: meta.last_edited,
            })
            .collect())
    }

    fn fetch_content(&self, id: &PageId) -> Result<RemoteContent, RemoteError> {
        let meta = self.page(id.as_str()).map_err(|e| e.into_remote(id))?;
        let blocks = self
            .block_children(id.as_str())
            .map_err(|e| e.into_remote(id))?;
        Ok(RemoteContent {
            title: meta.title,
            parent_id: meta.parent_id,
            content: blocks_to_markdown(&blocks),
            remote_edited_at: meta.last_edited,
        })
    }

    fn write_content(&self, id: &PageId, content: &str) -> Result<DateTime<Utc>, RemoteError> {
        let blocks = markdown_to_blocks(content);
        self.replace_children(id.as_str(), &blocks)
            .map_err(|e| e.into_remote(id))?;
        let meta = self.page(id.as_str()).map_err(|e| e.into_remote(id))?;
        tracing::debug!(id = %id, blocks = blocks.len(), "replaced page content");
        Ok(meta.last_edited)
    }
}

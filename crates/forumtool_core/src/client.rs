use std::env;
use std::fs;
use std::path::PathBuf;
use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::categories::CategoryNode;
use crate::config::Credentials;
use crate::tags::TagGroup;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Spacing between consecutive requests, to stay under the remote rate limit.
pub const DEFAULT_REQUEST_INTERVAL_MS: u64 = 500;

pub const ENV_DEBUG_BODY_FILE: &str = "DISCOURSE_DEBUG_BODY_FILE";

/// Waitable throttle applied before every remote request.
pub trait RequestGate {
    fn wait(&mut self);
}

/// Enforces a fixed minimum interval between requests with a blocking sleep.
pub struct MinIntervalGate {
    interval: Duration,
    last_request_at: Option<Instant>,
}

impl MinIntervalGate {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            last_request_at: None,
        }
    }
}

impl RequestGate for MinIntervalGate {
    fn wait(&mut self) {
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                sleep(self.interval - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
    }
}

/// Never waits. Used by tests and one-shot calls where spacing is pointless.
pub struct NoopGate;

impl RequestGate for NoopGate {
    fn wait(&mut self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSummary {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTopic {
    pub title: String,
    pub raw: String,
    pub category: i64,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedTopic {
    pub topic_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicUpdate {
    pub title: String,
    pub raw: String,
    pub pinned: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryDetail {
    pub subcategories: Vec<CategoryNode>,
    pub settings: Option<Value>,
}

pub trait ForumReadApi {
    /// Shallow category listing (`GET /categories.json`).
    fn list_categories(&mut self) -> Result<Vec<CategoryNode>>;
    /// Category detail with nested subcategories and the settings blob
    /// (`GET /c/{slug}/{id}.json`).
    fn category_detail(&mut self, slug: &str, id: i64) -> Result<CategoryDetail>;
    /// Opaque tag listing (`GET /tags.json`).
    fn list_tags(&mut self) -> Result<Vec<Value>>;
    /// Topic listing for one category (`GET /c/{id}.json`).
    fn category_topics(&mut self, category_id: i64) -> Result<Vec<TopicSummary>>;
    fn request_count(&self) -> usize;
}

pub trait ForumWriteApi: ForumReadApi {
    /// Creates a category and returns the remote id assigned to it.
    fn create_category(
        &mut self,
        name: &str,
        description: &str,
        parent_category_id: Option<i64>,
    ) -> Result<i64>;
    fn create_topic(&mut self, topic: &NewTopic) -> Result<CreatedTopic>;
    fn create_tag_group(&mut self, group: &TagGroup) -> Result<()>;
    fn update_topic(&mut self, topic_id: i64, update: &TopicUpdate) -> Result<()>;
}

/// Blocking Discourse API client. One instance, one outbound connection pool,
/// fully sequential requests for the whole run.
pub struct DiscourseClient {
    client: Client,
    credentials: Credentials,
    gate: Box<dyn RequestGate>,
    request_count: usize,
    debug_body_file: Option<PathBuf>,
}

impl DiscourseClient {
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_gate(
            credentials,
            Box::new(MinIntervalGate::new(DEFAULT_REQUEST_INTERVAL_MS)),
        )
    }

    pub fn with_gate(credentials: Credentials, gate: Box<dyn RequestGate>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .build()
            .context("failed to build Discourse HTTP client")?;
        let debug_body_file = env::var(ENV_DEBUG_BODY_FILE)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Ok(Self {
            client,
            credentials,
            gate,
            request_count: 0,
            debug_body_file,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.credentials.base_url, path)
    }

    fn get_json(&mut self, path: &str) -> Result<Value> {
        self.gate.wait();
        self.request_count += 1;
        let response = self
            .client
            .get(self.url(path))
            .header("Api-Key", self.credentials.api_key.clone())
            .header("Api-Username", self.credentials.api_username.clone())
            .send()
            .with_context(|| format!("failed to call GET {path}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("GET {path} failed with HTTP {status}");
        }
        let body = response
            .text()
            .with_context(|| format!("failed to read response body of GET {path}"))?;
        if let Some(debug_file) = &self.debug_body_file
            && let Err(error) = fs::write(debug_file, &body)
        {
            eprintln!("could not mirror response body to {}: {error}", debug_file.display());
        }
        serde_json::from_str(&body)
            .with_context(|| format!("failed to decode response body of GET {path}"))
    }

    fn send_json(&mut self, method: &str, path: &str, body: &Value) -> Result<Value> {
        self.gate.wait();
        self.request_count += 1;
        let request = match method {
            "PUT" => self.client.put(self.url(path)),
            _ => self.client.post(self.url(path)),
        };
        let response = request
            .header("Api-Key", self.credentials.api_key.clone())
            .header("Api-Username", self.credentials.api_username.clone())
            .json(body)
            .send()
            .with_context(|| format!("failed to call {method} {path}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("{method} {path} failed with HTTP {status}");
        }
        response
            .json()
            .with_context(|| format!("failed to decode response body of {method} {path}"))
    }
}

#[derive(Debug, Deserialize)]
struct CategoryListResponse {
    category_list: CategoryListBody,
}

#[derive(Debug, Deserialize)]
struct CategoryListBody {
    #[serde(default)]
    categories: Vec<CategoryNode>,
}

#[derive(Debug, Deserialize)]
struct CategoryDetailResponse {
    category: CategoryDetailBody,
}

#[derive(Debug, Deserialize)]
struct CategoryDetailBody {
    #[serde(default)]
    subcategory_list: Vec<CategoryNode>,
    #[serde(default)]
    settings: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TagListResponse {
    #[serde(default)]
    tags: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TopicListResponse {
    topic_list: TopicListBody,
}

#[derive(Debug, Deserialize)]
struct TopicListBody {
    #[serde(default)]
    topics: Vec<TopicRecord>,
}

#[derive(Debug, Deserialize)]
struct TopicRecord {
    id: i64,
    #[serde(default)]
    title: String,
}

impl ForumReadApi for DiscourseClient {
    fn list_categories(&mut self) -> Result<Vec<CategoryNode>> {
        let payload = self.get_json("/categories.json")?;
        let parsed: CategoryListResponse = serde_json::from_value(payload)
            .context("failed to decode category list response")?;
        Ok(parsed.category_list.categories)
    }

    fn category_detail(&mut self, slug: &str, id: i64) -> Result<CategoryDetail> {
        let payload = self.get_json(&format!("/c/{slug}/{id}.json"))?;
        let parsed: CategoryDetailResponse = serde_json::from_value(payload)
            .context("failed to decode category detail response")?;
        Ok(CategoryDetail {
            subcategories: parsed.category.subcategory_list,
            settings: parsed.category.settings,
        })
    }

    fn list_tags(&mut self) -> Result<Vec<Value>> {
        let payload = self.get_json("/tags.json")?;
        let parsed: TagListResponse =
            serde_json::from_value(payload).context("failed to decode tag list response")?;
        Ok(parsed.tags)
    }

    fn category_topics(&mut self, category_id: i64) -> Result<Vec<TopicSummary>> {
        let payload = self.get_json(&format!("/c/{category_id}.json"))?;
        let parsed: TopicListResponse =
            serde_json::from_value(payload).context("failed to decode topic list response")?;
        Ok(parsed
            .topic_list
            .topics
            .into_iter()
            .map(|topic| TopicSummary {
                id: topic.id,
                title: topic.title,
            })
            .collect())
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

impl ForumWriteApi for DiscourseClient {
    fn create_category(
        &mut self,
        name: &str,
        description: &str,
        parent_category_id: Option<i64>,
    ) -> Result<i64> {
        let mut body = json!({
            "name": name,
            "description": description,
        });
        if let Some(parent_id) = parent_category_id {
            body["parent_category_id"] = json!(parent_id);
        }
        let payload = self.send_json("POST", "/categories", &body)?;
        payload
            .get("category")
            .and_then(|category| category.get("id"))
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow::anyhow!("create category response is missing category.id"))
    }

    fn create_topic(&mut self, topic: &NewTopic) -> Result<CreatedTopic> {
        let body = json!({
            "title": topic.title,
            "raw": topic.raw,
            "category": topic.category,
            "tags": topic.tags,
        });
        let payload = self.send_json("POST", "/posts", &body)?;
        let topic_id = payload
            .get("topic_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow::anyhow!("create topic response is missing topic_id"))?;
        Ok(CreatedTopic { topic_id })
    }

    fn create_tag_group(&mut self, group: &TagGroup) -> Result<()> {
        let body = json!({
            "name": group.name,
            "tags": group.tags,
            "visibility_level": group.visibility_level,
        });
        self.send_json("POST", "/tag_groups", &body)?;
        Ok(())
    }

    fn update_topic(&mut self, topic_id: i64, update: &TopicUpdate) -> Result<()> {
        let body = json!({
            "title": update.title,
            "raw": update.raw,
            "pinned": update.pinned,
        });
        self.send_json("PUT", &format!("/t/{topic_id}.json"), &body)?;
        Ok(())
    }
}

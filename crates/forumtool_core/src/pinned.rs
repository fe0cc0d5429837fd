use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::categories::CategoryNode;
use crate::client::{ForumWriteApi, NewTopic, TopicUpdate};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PinnedMessage {
    pub category: String,
    pub pinned_message: PinnedBody,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PinnedBody {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct PinnedMessageFile {
    #[serde(default)]
    categories: Vec<PinnedMessage>,
}

pub fn load_pinned_messages(path: &Path) -> Result<Vec<PinnedMessage>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: PinnedMessageFile = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(parsed.categories)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExportedPost {
    pub category: String,
    pub title: String,
    pub content: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct PinnedReport {
    pub success: bool,
    pub updated: usize,
    pub created: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub posts: Vec<ExportedPost>,
}

/// Creates or updates one pinned post per configured category. An existing
/// topic is matched by case-insensitive title in the category's topic list
/// and updated in place; otherwise a new topic is posted. Every failure is
/// recorded per entry and the run continues.
pub fn upsert_pinned_posts(
    api: &mut impl ForumWriteApi,
    base_url: &str,
    messages: &[PinnedMessage],
) -> Result<PinnedReport> {
    let listing = api
        .list_categories()
        .context("failed to fetch category listing for pinned posts")?;

    let mut report = PinnedReport::default();
    for message in messages {
        match upsert_one(api, base_url, &listing, message) {
            Ok(outcome) => {
                match outcome.action {
                    UpsertAction::Updated => report.updated += 1,
                    UpsertAction::Created => report.created += 1,
                }
                report.posts.push(outcome.post);
            }
            Err(error) => {
                eprintln!(
                    "failed to upsert pinned post in '{}': {error:#}",
                    message.category
                );
                report.failed += 1;
                report
                    .errors
                    .push(format!("category '{}': {error:#}", message.category));
            }
        }
    }
    report.success = report.errors.is_empty();
    Ok(report)
}

enum UpsertAction {
    Updated,
    Created,
}

struct UpsertOutcome {
    action: UpsertAction,
    post: ExportedPost,
}

fn upsert_one(
    api: &mut impl ForumWriteApi,
    base_url: &str,
    listing: &[CategoryNode],
    message: &PinnedMessage,
) -> Result<UpsertOutcome> {
    let category_id = find_category_id(listing, &message.category).ok_or_else(|| {
        anyhow::anyhow!("category '{}' not found on the remote", message.category)
    })?;
    let title = &message.pinned_message.title;
    let content = &message.pinned_message.content;

    let topics = api.category_topics(category_id)?;
    let existing = topics
        .iter()
        .find(|topic| topic.title.eq_ignore_ascii_case(title));

    let topic_id = match existing {
        Some(topic) => {
            api.update_topic(topic.id, &TopicUpdate {
                title: title.clone(),
                raw: content.clone(),
                pinned: true,
            })?;
            println!("updated pinned post in '{}'", message.category);
            topic.id
        }
        None => {
            let created = api.create_topic(&NewTopic {
                title: title.clone(),
                raw: content.clone(),
                category: category_id,
                tags: Vec::new(),
            })?;
            println!("created new pinned post in '{}'", message.category);
            created.topic_id
        }
    };

    let action = if existing.is_some() {
        UpsertAction::Updated
    } else {
        UpsertAction::Created
    };
    Ok(UpsertOutcome {
        action,
        post: ExportedPost {
            category: message.category.clone(),
            title: title.clone(),
            content: content.clone(),
            url: format!("{base_url}/t/{topic_id}"),
        },
    })
}

/// Resolves a category name to its remote id, searching nested
/// subcategories as well. Matching is case-insensitive.
fn find_category_id(categories: &[CategoryNode], name: &str) -> Option<i64> {
    for category in categories {
        if category.name.eq_ignore_ascii_case(name) {
            return category.id;
        }
        if let Some(id) = find_category_id(&category.subcategories, name) {
            return Some(id);
        }
    }
    None
}

pub fn save_exported_posts(path: &Path, posts: &[ExportedPost]) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(posts).context("failed to serialize exported posts")?;
    fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
}

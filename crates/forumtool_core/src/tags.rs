use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{ForumReadApi, ForumWriteApi, NewTopic};

/// Discourse creates tags lazily, so each tag is warmed up by posting a
/// temporary topic into this category before the groups reference it.
pub const TAG_WARMUP_CATEGORY_ID: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagGroup {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub visibility_level: i64,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct TagGroupConfig {
    #[serde(default)]
    pub tag_groups: Vec<TagGroup>,
}

pub fn load_tag_groups(path: &Path) -> Result<TagGroupConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct TagImportReport {
    pub success: bool,
    pub warmed_tags: usize,
    pub failed_tags: usize,
    pub created_groups: usize,
    pub failed_groups: usize,
    pub errors: Vec<String>,
}

/// Warms up every tag with a temporary topic, then creates the groups.
/// Per-tag and per-group failures are recorded and the run continues.
pub fn import_tag_groups(
    api: &mut impl ForumWriteApi,
    config: &TagGroupConfig,
) -> TagImportReport {
    let mut report = TagImportReport::default();

    for group in &config.tag_groups {
        for tag in &group.tags {
            let topic = NewTopic {
                title: format!("Initializing tag: {tag}"),
                raw: format!("Temporary post to initialize tag: {tag}"),
                category: TAG_WARMUP_CATEGORY_ID,
                tags: vec![tag.clone()],
            };
            match api.create_topic(&topic) {
                Ok(_) => {
                    println!("initialized tag '{tag}' with a temporary topic");
                    report.warmed_tags += 1;
                }
                Err(error) => {
                    eprintln!("failed to initialize tag '{tag}': {error:#}");
                    report.failed_tags += 1;
                    report.errors.push(format!("tag '{tag}': {error:#}"));
                }
            }
        }
    }

    for group in &config.tag_groups {
        match api.create_tag_group(group) {
            Ok(()) => {
                println!("created tag group '{}'", group.name);
                report.created_groups += 1;
            }
            Err(error) => {
                eprintln!("failed to create tag group '{}': {error:#}", group.name);
                report.failed_groups += 1;
                report
                    .errors
                    .push(format!("tag group '{}': {error:#}", group.name));
            }
        }
    }

    report.success = report.errors.is_empty();
    report
}

/// Fetches the opaque tag listing for backup.
pub fn backup_tags(api: &mut impl ForumReadApi) -> Result<Vec<Value>> {
    api.list_tags().context("failed to fetch tag listing")
}

pub fn save_tags(path: &Path, tags: &[Value]) -> Result<()> {
    let rendered = serde_json::to_string_pretty(tags).context("failed to serialize tags")?;
    fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::{Value, json};
    use tempfile::tempdir;

    use super::{
        TAG_WARMUP_CATEGORY_ID, TagGroup, TagGroupConfig, backup_tags, import_tag_groups,
        load_tag_groups, save_tags,
    };
    use crate::categories::CategoryNode;
    use crate::client::{
        CategoryDetail, CreatedTopic, ForumReadApi, ForumWriteApi, NewTopic, TopicSummary,
        TopicUpdate,
    };

    #[derive(Default)]
    struct MockForum {
        tags: Vec<Value>,
        reject_tags: BTreeSet<String>,
        reject_groups: BTreeSet<String>,
        topic_calls: Vec<NewTopic>,
        group_calls: Vec<String>,
        request_count: usize,
    }

    impl ForumReadApi for MockForum {
        fn list_categories(&mut self) -> anyhow::Result<Vec<CategoryNode>> {
            self.request_count += 1;
            Ok(Vec::new())
        }
        fn category_detail(&mut self, _slug: &str, _id: i64) -> anyhow::Result<CategoryDetail> {
            self.request_count += 1;
            Ok(CategoryDetail::default())
        }
        fn list_tags(&mut self) -> anyhow::Result<Vec<Value>> {
            self.request_count += 1;
            Ok(self.tags.clone())
        }
        fn category_topics(&mut self, _category_id: i64) -> anyhow::Result<Vec<TopicSummary>> {
            self.request_count += 1;
            Ok(Vec::new())
        }
        fn request_count(&self) -> usize {
            self.request_count
        }
    }

    impl ForumWriteApi for MockForum {
        fn create_category(
            &mut self,
            _name: &str,
            _description: &str,
            _parent_category_id: Option<i64>,
        ) -> anyhow::Result<i64> {
            self.request_count += 1;
            Ok(1)
        }
        fn create_topic(&mut self, topic: &NewTopic) -> anyhow::Result<CreatedTopic> {
            self.request_count += 1;
            self.topic_calls.push(topic.clone());
            if topic.tags.iter().any(|tag| self.reject_tags.contains(tag)) {
                anyhow::bail!("POST /posts failed with HTTP 422 Unprocessable Entity");
            }
            Ok(CreatedTopic { topic_id: 100 })
        }
        fn create_tag_group(&mut self, group: &TagGroup) -> anyhow::Result<()> {
            self.request_count += 1;
            self.group_calls.push(group.name.clone());
            if self.reject_groups.contains(&group.name) {
                anyhow::bail!("POST /tag_groups failed with HTTP 500 Internal Server Error");
            }
            Ok(())
        }
        fn update_topic(&mut self, _topic_id: i64, _update: &TopicUpdate) -> anyhow::Result<()> {
            self.request_count += 1;
            Ok(())
        }
    }

    fn config() -> TagGroupConfig {
        TagGroupConfig {
            tag_groups: vec![
                TagGroup {
                    name: "Releases".to_string(),
                    tags: vec!["stable".to_string(), "beta".to_string()],
                    visibility_level: 0,
                },
                TagGroup {
                    name: "Staff".to_string(),
                    tags: vec!["internal".to_string()],
                    visibility_level: 1,
                },
            ],
        }
    }

    #[test]
    fn warms_every_tag_before_creating_groups() {
        let mut api = MockForum::default();
        let report = import_tag_groups(&mut api, &config());

        assert!(report.success);
        assert_eq!(report.warmed_tags, 3);
        assert_eq!(report.created_groups, 2);
        assert_eq!(api.topic_calls.len(), 3);
        assert!(
            api.topic_calls
                .iter()
                .all(|topic| topic.category == TAG_WARMUP_CATEGORY_ID)
        );
        assert_eq!(api.group_calls, vec!["Releases", "Staff"]);
    }

    #[test]
    fn a_failing_tag_does_not_stop_the_run() {
        let mut api = MockForum::default();
        api.reject_tags.insert("beta".to_string());

        let report = import_tag_groups(&mut api, &config());

        assert!(!report.success);
        assert_eq!(report.warmed_tags, 2);
        assert_eq!(report.failed_tags, 1);
        // Groups are still attempted, including the one holding the bad tag.
        assert_eq!(report.created_groups, 2);
    }

    #[test]
    fn a_failing_group_is_recorded_and_siblings_continue() {
        let mut api = MockForum::default();
        api.reject_groups.insert("Releases".to_string());

        let report = import_tag_groups(&mut api, &config());

        assert!(!report.success);
        assert_eq!(report.failed_groups, 1);
        assert_eq!(report.created_groups, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("Releases"));
    }

    #[test]
    fn tag_group_config_parses_from_file() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("tags_and_groups.json");
        std::fs::write(
            &path,
            r#"{"tag_groups": [{"name": "Releases", "tags": ["stable"], "visibility_level": 0}]}"#,
        )
        .expect("write config");

        let config = load_tag_groups(&path).expect("load");
        assert_eq!(config.tag_groups.len(), 1);
        assert_eq!(config.tag_groups[0].tags, vec!["stable"]);
    }

    #[test]
    fn load_tag_groups_fails_for_missing_file() {
        let error = load_tag_groups(std::path::Path::new("/nonexistent/tags.json"))
            .expect_err("must fail");
        assert!(error.to_string().contains("failed to read"));
    }

    #[test]
    fn tag_backup_round_trips_opaque_records() {
        let mut api = MockForum {
            tags: vec![json!({"id": "stable", "count": 12}), json!({"id": "beta"})],
            ..MockForum::default()
        };
        let tags = backup_tags(&mut api).expect("backup");

        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("tags.json");
        save_tags(&path, &tags).expect("save");

        let loaded: Vec<Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(loaded, tags);
    }
}

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{ForumReadApi, ForumWriteApi};

/// One category in the tree, as stored locally and as returned by the remote
/// listing. `settings` is a remote-defined blob and is passed through
/// unmodified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CategoryNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_category_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(
        rename = "subcategory_list",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub subcategories: Vec<CategoryNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImportAction {
    Created,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportNodeResult {
    pub name: String,
    pub action: ImportAction,
    pub remote_id: Option<i64>,
    pub detail: Option<String>,
}

/// Outcome of one import run. The run always completes; `success` is false
/// when any node failed (failed branches keep their already-created
/// ancestors, nothing is rolled back).
#[derive(Debug, Clone, Serialize, Default)]
pub struct ImportReport {
    pub success: bool,
    pub created: usize,
    pub failed: usize,
    pub skipped_descendants: usize,
    pub errors: Vec<String>,
    pub nodes: Vec<ImportNodeResult>,
}

/// Recreates the category tree remotely, in strict pre-order: a node is
/// created only after its parent's remote id is known, siblings in source
/// order. A failed creation skips the node's whole subtree and moves on to
/// the next sibling.
pub fn import_category_tree(
    api: &mut impl ForumWriteApi,
    categories: &[CategoryNode],
) -> ImportReport {
    let mut report = ImportReport::default();
    import_level(api, categories, None, &mut report);
    report.success = report.failed == 0;
    report
}

fn import_level(
    api: &mut impl ForumWriteApi,
    categories: &[CategoryNode],
    parent_id: Option<i64>,
    report: &mut ImportReport,
) {
    for category in categories {
        if category.name.trim().is_empty() {
            record_failure(report, category, "category name is empty".to_string());
            continue;
        }
        let description = category.description.as_deref().unwrap_or("");
        match api.create_category(&category.name, description, parent_id) {
            Ok(remote_id) => {
                println!("created category '{}' with id {remote_id}", category.name);
                report.created += 1;
                report.nodes.push(ImportNodeResult {
                    name: category.name.clone(),
                    action: ImportAction::Created,
                    remote_id: Some(remote_id),
                    detail: None,
                });
                import_level(api, &category.subcategories, Some(remote_id), report);
            }
            Err(error) => {
                record_failure(report, category, format!("{error:#}"));
            }
        }
    }
}

fn record_failure(report: &mut ImportReport, category: &CategoryNode, detail: String) {
    eprintln!("failed to create category '{}': {detail}", category.name);
    report.failed += 1;
    report
        .errors
        .push(format!("category '{}': {detail}", category.name));
    report.nodes.push(ImportNodeResult {
        name: category.name.clone(),
        action: ImportAction::Failed,
        remote_id: None,
        detail: Some(detail),
    });
    record_skipped(report, &category.subcategories);
}

fn record_skipped(report: &mut ImportReport, categories: &[CategoryNode]) {
    for category in categories {
        report.skipped_descendants += 1;
        report.nodes.push(ImportNodeResult {
            name: category.name.clone(),
            action: ImportAction::Skipped,
            remote_id: None,
            detail: Some("parent category was not created".to_string()),
        });
        record_skipped(report, &category.subcategories);
    }
}

/// Outcome of one export run. A failed detail request keeps the shallow
/// listing record for that category; only a failed listing request fails the
/// whole export.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ExportReport {
    pub success: bool,
    pub fetched: usize,
    pub detail_failures: usize,
    pub errors: Vec<String>,
    pub categories: Vec<CategoryNode>,
}

/// Fetches the shallow category listing and augments every record with its
/// nested subcategories and settings blob via one detail request each.
pub fn export_category_tree(api: &mut impl ForumReadApi) -> Result<ExportReport> {
    let shallow = api
        .list_categories()
        .context("failed to fetch category listing")?;

    let mut report = ExportReport::default();
    for mut category in shallow {
        let slug = category.slug.clone();
        match (category.id, slug) {
            (Some(id), Some(slug)) => match api.category_detail(&slug, id) {
                Ok(detail) => {
                    category.subcategories = detail.subcategories;
                    category.settings = detail.settings;
                }
                Err(error) => {
                    eprintln!(
                        "failed to fetch details for category '{}': {error:#}",
                        category.name
                    );
                    report.detail_failures += 1;
                    report
                        .errors
                        .push(format!("category '{}': {error:#}", category.name));
                }
            },
            _ => {
                report.detail_failures += 1;
                report.errors.push(format!(
                    "category '{}' has no id or slug in the listing",
                    category.name
                ));
            }
        }
        report.fetched += 1;
        report.categories.push(category);
    }
    report.success = report.errors.is_empty();
    Ok(report)
}

/// Reads a whole category tree file: a pretty-printed JSON array of nodes.
pub fn load_category_tree(path: &Path) -> Result<Vec<CategoryNode>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn save_category_tree(path: &Path, categories: &[CategoryNode]) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(categories).context("failed to serialize category tree")?;
    fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
}

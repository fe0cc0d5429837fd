use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use forumtool_core::categories::{
    ImportReport, export_category_tree, import_category_tree, load_category_tree,
    save_category_tree,
};
use forumtool_core::client::{DiscourseClient, ForumReadApi};
use forumtool_core::config::Credentials;
use forumtool_core::pinned::{load_pinned_messages, save_exported_posts, upsert_pinned_posts};
use forumtool_core::tags::{backup_tags, import_tag_groups, load_tag_groups, save_tags};

#[derive(Debug, Parser)]
#[command(
    name = "forumtool",
    version,
    about = "Backup and restore Discourse configuration (categories, tags, pinned posts)"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Export remote categories and tags to local JSON files")]
    Backup(BackupArgs),
    #[command(about = "Recreate categories, tag groups, and pinned posts from local JSON files")]
    Import(ImportArgs),
}

#[derive(Debug, Args)]
struct BackupArgs {
    #[arg(long, default_value = "categories.json", value_name = "PATH")]
    categories_file: PathBuf,
    #[arg(long, default_value = "tags.json", value_name = "PATH")]
    tags_file: PathBuf,
    #[arg(long, help = "Skip the category tree export")]
    skip_categories: bool,
    #[arg(long, help = "Skip the tag export")]
    skip_tags: bool,
}

#[derive(Debug, Args)]
struct ImportArgs {
    #[arg(long, default_value = "categories.json", value_name = "PATH")]
    categories_file: PathBuf,
    #[arg(long, default_value = "tags_and_groups.json", value_name = "PATH")]
    tags_file: PathBuf,
    #[arg(long, default_value = "pinned_messages.json", value_name = "PATH")]
    pinned_file: PathBuf,
    #[arg(
        long,
        default_value = "exported_pinned_posts.json",
        value_name = "PATH"
    )]
    exported_posts_file: PathBuf,
    #[arg(long, help = "Skip tag warm-up and tag group creation")]
    skip_tags: bool,
    #[arg(long, help = "Skip the category tree import")]
    skip_categories: bool,
    #[arg(long, help = "Also upsert pinned posts from the pinned messages file")]
    pinned: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Backup(args)) => run_backup(args),
        Some(Commands::Import(args)) => run_import(args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_backup(args: BackupArgs) -> Result<()> {
    let credentials = Credentials::from_env()?;
    let mut client = DiscourseClient::new(credentials)?;

    if !args.skip_categories {
        let report = export_category_tree(&mut client)?;
        save_category_tree(&args.categories_file, &report.categories)?;
        println!("category backup");
        println!("file: {}", args.categories_file.display());
        println!("fetched: {}", report.fetched);
        println!("detail_failures: {}", report.detail_failures);
        print_errors(&report.errors);
        println!("success: {}", report.success);
    }

    if !args.skip_tags {
        let tags = backup_tags(&mut client)?;
        save_tags(&args.tags_file, &tags)?;
        println!("tag backup");
        println!("file: {}", args.tags_file.display());
        println!("fetched: {}", tags.len());
    }

    println!("request_count: {}", client.request_count());
    Ok(())
}

fn run_import(args: ImportArgs) -> Result<()> {
    let credentials = Credentials::from_env()?;
    let base_url = credentials.base_url.clone();
    let mut client = DiscourseClient::new(credentials)?;

    if !args.skip_tags {
        let config = load_tag_groups(&args.tags_file)?;
        let report = import_tag_groups(&mut client, &config);
        println!("tag import");
        println!("warmed_tags: {}", report.warmed_tags);
        println!("failed_tags: {}", report.failed_tags);
        println!("created_groups: {}", report.created_groups);
        println!("failed_groups: {}", report.failed_groups);
        print_errors(&report.errors);
        println!("success: {}", report.success);
    }

    if !args.skip_categories {
        let categories = load_category_tree(&args.categories_file)?;
        let report = import_category_tree(&mut client, &categories);
        print_import_report(&report);
    }

    if args.pinned {
        let messages = load_pinned_messages(&args.pinned_file)?;
        let report = upsert_pinned_posts(&mut client, &base_url, &messages)?;
        save_exported_posts(&args.exported_posts_file, &report.posts)?;
        println!("pinned post import");
        println!("updated: {}", report.updated);
        println!("created: {}", report.created);
        println!("failed: {}", report.failed);
        println!("exported_posts_file: {}", args.exported_posts_file.display());
        print_errors(&report.errors);
        println!("success: {}", report.success);
    }

    println!("request_count: {}", client.request_count());
    Ok(())
}

fn print_import_report(report: &ImportReport) {
    println!("category import");
    println!("created: {}", report.created);
    println!("failed: {}", report.failed);
    println!("skipped_descendants: {}", report.skipped_descendants);
    print_errors(&report.errors);
    println!("success: {}", report.success);
}

fn print_errors(errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    println!("errors:");
    for error in errors {
        println!("  - {error}");
    }
}

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    review_display_rating, ApiTransport, FetchOutcome, HttpTransport, PageCursorController,
    PanelError, PanelState, RatingSnapshot, ReviewsApi, SkipReason,
};
use shared::domain::ReviewId;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

mod config;

use config::{load_config, normalize_server_url, DEFAULT_CONFIG_PATH};

#[derive(Parser, Debug)]
#[command(about = "Browse and moderate paid reviews")]
struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    admin_key: Option<String>,
    #[arg(long)]
    page_size: Option<u32>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive pager over one tag's reviews.
    Browse {
        #[arg(long)]
        tag: Option<String>,
    },
    /// Review count and average for every tag.
    Tags,
    /// Delete a single review by id.
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    if let Some(server_url) = cli.server_url {
        config.server_url = normalize_server_url(&server_url);
    }
    if let Some(admin_key) = cli.admin_key {
        config.admin_key = admin_key;
    }
    if let Some(page_size) = cli.page_size {
        config.page_size = page_size;
    }

    tracing_subscriber::fmt()
        .with_env_filter(config.log_filter.as_str())
        .init();
    info!(server_url = %config.server_url, "review panel starting");

    let transport: Arc<dyn ApiTransport> = Arc::new(HttpTransport::new(&config.server_url));
    let api = ReviewsApi::with_prefix(transport, &config.api_prefix, &config.admin_key);

    match cli.command {
        Command::Browse { tag } => browse(api, config.page_size, tag).await,
        Command::Tags => print_tag_stats(&api).await,
        Command::Delete { id } => {
            let id = ReviewId::new(id);
            api.delete_review(&id)
                .await
                .map_err(|source| PanelError::Delete {
                    id: id.clone(),
                    source,
                })?;
            println!("deleted review {id}");
            Ok(())
        }
    }
}

async fn print_tag_stats(api: &ReviewsApi) -> Result<()> {
    let settings = api.settings().await.map_err(PanelError::Settings)?;
    let stats = api
        .tag_stats(&settings.id)
        .await
        .map_err(PanelError::TagStats)?;

    if stats.is_empty() {
        println!("no reviews yet");
    }
    for entry in &stats {
        let snapshot = RatingSnapshot::from(entry);
        let tag = entry.tag.as_deref().unwrap_or("-");
        if snapshot.is_unrated() {
            println!("{tag:<24} unrated");
        } else {
            println!(
                "{tag:<24} {:>3} stars  {} reviews",
                snapshot.display_rating(),
                snapshot.count
            );
        }
    }
    Ok(())
}

async fn browse(api: ReviewsApi, page_size: u32, tag: Option<String>) -> Result<()> {
    let controller = PageCursorController::new_with_page_size(api, page_size);

    if let Err(err) = controller.load_settings().await {
        warn!(error = %err, "starting with an empty panel");
        eprintln!("error: {err}");
    }
    if let Some(tag) = tag {
        let current = controller.snapshot().await.filter.tag().map(str::to_string);
        if current.as_deref() != Some(tag.as_str()) {
            report(controller.select_filter(Some(&tag)).await);
        }
    }
    render(&controller.snapshot().await);
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        let (command, arg) = line
            .split_once(' ')
            .map(|(command, arg)| (command, arg.trim()))
            .unwrap_or((line, ""));

        let result = match command {
            "" => continue,
            "q" | "quit" => break,
            "n" | "next" => controller.go_next().await,
            "p" | "prev" | "back" => controller.go_back().await,
            "r" | "refresh" => controller.refresh_current_page().await,
            "d" | "delete" if !arg.is_empty() => {
                match controller.remove_item(&ReviewId::new(arg)).await {
                    Ok(FetchOutcome::Cleared) => {
                        println!("deleted {arg}; no tag selected to reload");
                        continue;
                    }
                    result => result,
                }
            }
            "t" | "tag" => {
                controller
                    .select_filter(Some(arg).filter(|tag| !tag.is_empty()))
                    .await
            }
            _ => {
                print_help();
                continue;
            }
        };
        report(result);
        render(&controller.snapshot().await);
    }

    Ok(())
}

fn report(result: Result<FetchOutcome, PanelError>) {
    match result {
        Ok(FetchOutcome::Skipped(SkipReason::NoNextPage)) => println!("already on the last page"),
        Ok(FetchOutcome::Skipped(SkipReason::AtFirstPage)) => {
            println!("already on the first page")
        }
        Ok(FetchOutcome::Skipped(SkipReason::Busy)) => println!("still loading"),
        Ok(FetchOutcome::Cleared) => println!("no tag selected"),
        Ok(FetchOutcome::Applied | FetchOutcome::Stale) => {}
        Err(err) => eprintln!("error: {err}"),
    }
}

fn render(state: &PanelState) {
    let tag = state.filter.tag().unwrap_or("(none)");
    let rating = state.rating.snapshot();
    println!();
    if rating.is_unrated() {
        println!("tag: {tag}  no reviews yet");
    } else {
        println!(
            "tag: {tag}  {} stars from {} reviews",
            rating.display_rating(),
            rating.count
        );
    }
    if !state.filter.tags().is_empty() {
        println!("tags: {}", state.filter.tags().join(", "));
    }

    for review in state.page.items() {
        let created = review
            .created_at_utc()
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "  {created:<16}  {:>3}  {:<20}  {}  [{}]",
            review_display_rating(review),
            review.name.as_deref().unwrap_or("anonymous"),
            review.comment.as_deref().unwrap_or(""),
            review.id,
        );
    }
    println!(
        "page {}{}{}",
        state.page.cursor_stack().len(),
        if state.page.can_go_back() { "  [p]rev" } else { "" },
        if state.page.has_next() { "  [n]ext" } else { "" },
    );
    if state.needs_refresh {
        println!("page may be out of date; [r]efresh to reload");
    }
}

fn print_help() {
    println!("commands: n(ext)  p(rev)  r(efresh)  d <id>  t <tag>  q(uit)");
}

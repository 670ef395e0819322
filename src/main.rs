use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use bandi_cli::api_client::ApiClient;
use bandi_cli::cache::ResultSet;
use bandi_cli::config::Config;
use bandi_cli::discovery::{DiscoveryView, ViewPhase};
use bandi_cli::export::{ExportFormat, ExportResult};
use bandi_cli::filter_state::{
    CategoryFilter, FilterChange, FilterState, SortDirection, SortKey, SourceFilter, StatusFilter,
    DEFAULT_PAGE_SIZE,
};
use bandi_cli::logging::init_tracing;

#[derive(Parser)]
#[command(
    name = "bandi-cli",
    version,
    about = "Search, browse and export public funding calls"
)]
struct Cli {
    /// Free-text query
    #[arg(short, long)]
    query: Option<String>,

    /// Source channel: regione, stato, europa, fondazioni
    #[arg(long)]
    source: Option<String>,

    /// Category: cultura, sociale, ambiente, formazione, sport, innovazione
    #[arg(long)]
    category: Option<String>,

    /// Status: active, closing_soon, expired
    #[arg(long)]
    status: Option<String>,

    /// Minimum grant amount in EUR
    #[arg(long)]
    amount_min: Option<u64>,

    /// Maximum grant amount in EUR (omit for unbounded)
    #[arg(long)]
    amount_max: Option<u64>,

    /// Sort key: deadline, amount, relevance, published_at
    #[arg(long)]
    sort: Option<String>,

    /// Sort descending
    #[arg(long)]
    desc: bool,

    /// Page number (1-indexed)
    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Results per page
    #[arg(long)]
    page_size: Option<u32>,

    /// Restore a shared filter state (key=value&... string); flags apply on top
    #[arg(long)]
    from: Option<String>,

    /// Show aggregate stats
    #[arg(long)]
    stats: bool,

    /// Export the results: pdf, xlsx, csv
    #[arg(long)]
    export: Option<String>,

    /// Deliver the export to this address instead of downloading
    #[arg(long)]
    email: Option<String>,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let client = ApiClient::with_timeout(&config.api.base_url, config.api_timeout())?;
    let mut view = DiscoveryView::new(Arc::new(client), config.discovery_settings());

    if let Some(shared) = &cli.from {
        view.restore_filters(FilterState::from_query_string(shared));
    }

    let mut change = build_change(&cli)?;
    if change.page_size.is_none() && config.search.page_size != DEFAULT_PAGE_SIZE {
        change = change.page_size(config.search.page_size);
    }
    view.apply_filters(change).await?;
    if cli.page > 1 {
        // Applied separately so an explicit page is not swallowed by the
        // page-reset that accompanies filter changes
        view.apply_filters(FilterChange::default().page(cli.page))
            .await?;
    }

    match view.phase() {
        ViewPhase::Ready { snapshot } | ViewPhase::Refreshing { snapshot } => {
            print_results(snapshot, &view);
        }
        ViewPhase::Empty => println!("No matching calls."),
        ViewPhase::Error { message, .. } => println!("Search failed: {}", message),
        ViewPhase::Loading { .. } | ViewPhase::NoData => println!("No data."),
    }
    println!("share: {}", view.filters().to_query_string());

    if cli.stats {
        if let Some(stats) = view.load_stats().await {
            println!();
            println!("Active calls:     {}", stats.total_active);
            println!("Total granted:    {} EUR", stats.total_amount);
            println!("Closing soon:     {}", stats.closing_soon);
            println!("New this month:   {}", stats.new_this_month);
        }
    }

    if let Some(format) = &cli.export {
        let format = ExportFormat::parse(format)
            .context("invalid --export format (expected pdf, xlsx or csv)")?;
        let mut request = view.quick_export_request(format);
        request.delivery_email = cli.email.clone();

        match view.run_export(request).await? {
            ExportResult::Download(artifact) => {
                std::fs::write(&artifact.filename, &artifact.bytes)
                    .with_context(|| format!("writing {}", artifact.filename))?;
                println!(
                    "Saved {} ({} bytes, {})",
                    artifact.filename,
                    artifact.bytes.len(),
                    artifact.content_type
                );
            }
            ExportResult::EmailDelivery => {
                println!(
                    "Export accepted for delivery to {}",
                    cli.email.as_deref().unwrap_or("the configured address")
                );
            }
        }
    }

    for note in view.drain_notifications() {
        eprintln!("{}", note.format_for_display());
    }

    Ok(())
}

fn build_change(cli: &Cli) -> Result<FilterChange> {
    let mut change = FilterChange::default();

    if let Some(query) = &cli.query {
        change = change.query(query.clone());
    }
    if let Some(source) = &cli.source {
        change = change.source(SourceFilter::parse(source).context("invalid --source")?);
    }
    if let Some(category) = &cli.category {
        change = change.category(CategoryFilter::parse(category).context("invalid --category")?);
    }
    if let Some(status) = &cli.status {
        change = change.status(StatusFilter::parse(status).context("invalid --status")?);
    }
    if cli.amount_min.is_some() || cli.amount_max.is_some() {
        change = change.amount_range(cli.amount_min.unwrap_or(0), cli.amount_max);
    }
    if let Some(sort) = &cli.sort {
        let key = SortKey::parse(sort).context("invalid --sort")?;
        let dir = if cli.desc {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        change = change.sort(key, dir);
    } else if cli.desc {
        change = change.sort(SortKey::default(), SortDirection::Desc);
    }
    if let Some(size) = cli.page_size {
        change = change.page_size(size);
    }

    Ok(change)
}

fn print_results(snapshot: &ResultSet, view: &DiscoveryView) {
    println!(
        "{} matching calls, page {}/{}",
        snapshot.total_count, snapshot.page, snapshot.total_pages
    );
    for record in &snapshot.records {
        let marker = if view.is_saved(&record.id) { "*" } else { " " };
        let amount = record
            .amount
            .map(|a| format!("{} EUR", a))
            .unwrap_or_else(|| "-".to_string());
        let deadline = record
            .deadline
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let days = record
            .days_remaining
            .map(|d| format!(" ({}d left)", d))
            .unwrap_or_default();
        println!(
            "{} {:<10} {:<44} {:<28} {:>14} {}{}",
            marker,
            record.id,
            truncate(&record.title, 44),
            truncate(&record.entity, 28),
            amount,
            deadline,
            days
        );
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

mod config;
mod db;
mod fetcher;
mod nav;
mod render;
mod sites;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::{error, info};

use crate::config::Settings;
use crate::fetcher::{FetchStats, Fetcher, WorkItem};
use crate::nav::select::{page_filename, worklist};
use crate::nav::slug::sanitize_site_slug;
use crate::nav::FlatNavEntry;
use crate::render::sitemap::{self, SiteInfo};
use crate::sites::{Force, Step};

const NAV_EXPORT_FILE: &str = "navbar_links.json";

#[derive(Parser)]
#[command(name = "sp_sitemap", about = "SharePoint site navigation to markdown sitemap")]
struct Cli {
    /// Settings file (default: ./sp_sitemap.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the navigation list from a site's landing page
    Extract {
        #[arg(short, long)]
        site: String,
        /// Read the landing page from a saved file instead of fetching it
        #[arg(long)]
        html: Option<PathBuf>,
        /// Show what would be done without fetching or writing anything
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Retrieve the content pages of an extracted site into the cache
    Fetch {
        #[arg(short, long)]
        site: String,
        /// Re-fetch pages that are already cached
        #[arg(long)]
        force: bool,
        /// Max uncached pages to fetch (default: whole worklist)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Extract + fetch in one go
    Scrape {
        #[arg(short, long)]
        site: String,
        #[arg(long)]
        html: Option<PathBuf>,
        #[arg(long)]
        force: bool,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Render the markdown sitemap of a site from the cache
    Generate {
        #[arg(short, long)]
        site: String,
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Scrape and generate every site in the sites file
    All {
        /// Rerun steps whose output already exists
        #[arg(long, value_enum)]
        force: Option<Force>,
        /// Re-fetch cached pages while scraping
        #[arg(long)]
        scrape_force: bool,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Show cache statistics
    Stats {
        #[arg(short, long)]
        site: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Extract { site, html, dry_run } => {
            let site = sanitize_site_slug(&site)?;
            if dry_run {
                dry_run_site(&settings, &site, html.as_deref())?;
                return Ok(());
            }
            let conn = open_db(&settings)?;
            let fetcher = Fetcher::new(&settings)?;
            let entries = extract(&conn, &settings, &fetcher, &site, html.as_deref()).await?;
            println!(
                "Extracted {} navigation entries for {} ({} to fetch)",
                entries.len(),
                site,
                worklist(&entries).len()
            );
            Ok(())
        }
        Commands::Fetch { site, force, limit } => {
            let site = sanitize_site_slug(&site)?;
            let conn = open_db(&settings)?;
            let fetcher = Arc::new(Fetcher::new(&settings)?);
            let stats = fetch(&conn, fetcher, &site, force, limit).await?;
            print_fetch_stats(&stats);
            Ok(())
        }
        Commands::Scrape {
            site,
            html,
            force,
            limit,
            dry_run,
        } => {
            let site = sanitize_site_slug(&site)?;
            if dry_run {
                dry_run_site(&settings, &site, html.as_deref())?;
                return Ok(());
            }
            let conn = open_db(&settings)?;
            let fetcher = Arc::new(Fetcher::new(&settings)?);
            let stats = scrape(&conn, &settings, fetcher, &site, html.as_deref(), force, limit).await?;
            print_fetch_stats(&stats);
            Ok(())
        }
        Commands::Generate { site, dry_run } => {
            let site = sanitize_site_slug(&site)?;
            if dry_run {
                dry_run_generate(&settings, &site)?;
                return Ok(());
            }
            let conn = open_db(&settings)?;
            let path = generate(&conn, &settings, &site)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        Commands::All {
            force,
            scrape_force,
            limit,
            dry_run,
        } => {
            if dry_run {
                dry_run_all(&settings, force)
            } else {
                run_all(&settings, force, scrape_force, limit).await
            }
        }
        Commands::Stats { site } => {
            let site = site.as_deref().map(sanitize_site_slug).transpose()?;
            let conn = open_db(&settings)?;
            let s = db::get_stats(&conn, site.as_deref())?;
            println!("Sites:       {}", s.sites);
            println!("Nav entries: {}", s.nav_entries);
            println!("Eligible:    {}", s.eligible);
            println!("Pages:       {}", s.pages);
            println!("Errors:      {}", s.errors);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_db(settings: &Settings) -> Result<Connection> {
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

/// Landing page → navigation list, cached in the db and exported as JSON.
async fn extract(
    conn: &Connection,
    settings: &Settings,
    fetcher: &Fetcher,
    site: &str,
    html: Option<&Path>,
) -> Result<Vec<FlatNavEntry>> {
    let policy = settings.site_policy();
    let site_url = policy.site_url(site);
    let index_html = match html {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?,
        None => fetcher.fetch_index(&site_url).await?,
    };

    let entries = nav::process(&index_html, site, &policy, settings.orphan_policy())
        .with_context(|| format!("Failed to extract navigation for {}", site))?;

    db::save_site_index(
        conn,
        &db::SiteRow {
            slug: site.to_string(),
            url: site_url,
            title: Some(sitemap::site_title(&index_html)),
            index_html,
        },
    )?;
    db::save_nav_entries(conn, site, &entries)?;

    let export = settings.site_dir(site).join(NAV_EXPORT_FILE);
    db::export_nav_json(&export, &entries)?;
    info!("Saved {} navigation entries to {:?}", entries.len(), export);

    Ok(entries)
}

fn cached_nav(conn: &Connection, site: &str) -> Result<Vec<FlatNavEntry>> {
    let entries = db::fetch_nav_entries(conn, site)?;
    if entries.is_empty() {
        bail!("No navigation cached for {}. Run 'extract' first.", site);
    }
    Ok(entries)
}

async fn fetch(
    conn: &Connection,
    fetcher: Arc<Fetcher>,
    site: &str,
    force: bool,
    limit: Option<usize>,
) -> Result<FetchStats> {
    let entries = cached_nav(conn, site)?;
    let items = fetcher::plan(&worklist(&entries));
    println!("Fetching up to {} pages for {}...", items.len(), site);
    fetcher::fetch_pages(conn, fetcher, site, items, force, limit).await
}

async fn scrape(
    conn: &Connection,
    settings: &Settings,
    fetcher: Arc<Fetcher>,
    site: &str,
    html: Option<&Path>,
    force: bool,
    limit: Option<usize>,
) -> Result<FetchStats> {
    extract(conn, settings, &fetcher, site, html).await?;
    fetch(conn, fetcher, site, force, limit).await
}

/// Cache → `<output_dir>/<slug>.md`.
fn generate(conn: &Connection, settings: &Settings, site: &str) -> Result<PathBuf> {
    let entries = cached_nav(conn, site)?;
    let index = db::fetch_site_index(conn, site)?;

    let mut pages = HashMap::new();
    for url in entries.iter().filter_map(|e| e.url.as_deref()) {
        let filename = page_filename(url);
        if pages.contains_key(&filename) {
            continue;
        }
        if let Some(html) = db::fetch_page_html(conn, site, &filename)? {
            pages.insert(filename, html);
        }
    }

    let info = SiteInfo {
        slug: site.to_string(),
        url: index
            .as_ref()
            .map(|row| row.url.clone())
            .unwrap_or_else(|| settings.site_policy().site_url(site)),
        title: index
            .as_ref()
            .and_then(|row| row.title.clone())
            .unwrap_or_else(|| sitemap::UNKNOWN_SITE.to_string()),
    };
    let home = sitemap::render_home(index.as_ref().map(|row| row.index_html.as_str()), &info.url);
    let blocks = sitemap::render_entries(&entries, &pages);
    let doc = sitemap::render_sitemap(&info, &home, &blocks);

    let path = settings.sitemap_path(site);
    std::fs::create_dir_all(&settings.output_dir)
        .with_context(|| format!("Failed to create {:?}", settings.output_dir))?;
    std::fs::write(&path, doc).with_context(|| format!("Failed to write {:?}", path))?;
    info!(
        "Rendered {} entries ({} pages) for {}",
        entries.len(),
        pages.len(),
        site
    );
    Ok(path)
}

// ── Dry run ──

/// Print the site URL, output paths and, when the landing page is available
/// locally, the planned fetches. Touches neither the network nor the disk.
fn dry_run_site(settings: &Settings, site: &str, html: Option<&Path>) -> Result<Vec<WorkItem>> {
    let policy = settings.site_policy();
    let site_url = policy.site_url(site);
    println!("Site:     {}", site);
    println!("URL:      {}", site_url);
    println!("Cache:    {}", settings.db_path.display());
    println!("Nav data: {}", settings.site_dir(site).join(NAV_EXPORT_FILE).display());
    println!("Sitemap:  {}", settings.sitemap_path(site).display());

    let Some(path) = html else {
        println!("Would fetch {} and plan pages from its navigation", site_url);
        return Ok(Vec::new());
    };
    let index_html =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let entries = nav::process(&index_html, site, &policy, settings.orphan_policy())
        .with_context(|| format!("Failed to extract navigation for {}", site))?;
    let items = fetcher::plan(&worklist(&entries));
    println!(
        "\n{} navigation entries, {} pages to fetch:",
        entries.len(),
        items.len()
    );
    for item in &items {
        println!("  {} -> {}", item.url, item.filename);
    }
    Ok(items)
}

/// Report what `generate` would render, reading the cache without creating it.
fn dry_run_generate(settings: &Settings, site: &str) -> Result<()> {
    println!("Sitemap: {}", settings.sitemap_path(site).display());
    let Some(conn) = db::open_read_only(&settings.db_path)? else {
        println!("No cache at {}; run 'scrape' first", settings.db_path.display());
        return Ok(());
    };
    match db::fetch_nav_entries(&conn, site) {
        Ok(entries) if !entries.is_empty() => {
            let work = worklist(&entries);
            let mut cached = 0usize;
            for e in &work {
                if let Some(url) = e.url.as_deref() {
                    if db::page_cached(&conn, site, &page_filename(url))? {
                        cached += 1;
                    }
                }
            }
            println!(
                "Would render {} entries ({} of {} pages cached)",
                entries.len(),
                cached,
                work.len()
            );
        }
        _ => println!("No navigation cached for {}; run 'extract' first", site),
    }
    Ok(())
}

fn dry_run_all(settings: &Settings, force: Option<Force>) -> Result<()> {
    let site_list = sites::load_sites(&settings.sites_file)?;
    println!("{:<32} | {:<8} | {:<8}", "Site", "Scrape", "Generate");
    println!("{}", "-".repeat(54));
    for site in &site_list {
        let has_data = settings.site_dir(site).join(NAV_EXPORT_FILE).exists();
        let has_sitemap = settings.sitemap_path(site).exists();
        let scrape = sites::should_process(Step::Scrape, force, has_data, has_sitemap);
        // a successful scrape leaves site data behind
        let generate = sites::should_process(Step::Generate, force, has_data || scrape, has_sitemap);
        let label = |run: bool| if run { "run" } else { "skip" };
        println!(
            "{:<32} | {:<8} | {:<8}",
            truncate(site, 32),
            label(scrape),
            label(generate)
        );
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Outcome {
    Done,
    Skipped,
    Failed,
}

impl Outcome {
    fn label(self) -> &'static str {
        match self {
            Outcome::Done => "done",
            Outcome::Skipped => "skipped",
            Outcome::Failed => "FAILED",
        }
    }
}

/// Every site in the sites file. A failing site is logged and the batch moves on.
async fn run_all(
    settings: &Settings,
    force: Option<Force>,
    scrape_force: bool,
    limit: Option<usize>,
) -> Result<()> {
    let site_list = sites::load_sites(&settings.sites_file)?;
    let conn = open_db(settings)?;
    let fetcher = Arc::new(Fetcher::new(settings)?);
    println!("Processing {} sites...", site_list.len());

    let mut summary = Vec::with_capacity(site_list.len());
    for site in &site_list {
        let has_data = |s: &str| settings.site_dir(s).join(NAV_EXPORT_FILE).exists();
        let has_sitemap = |s: &str| settings.sitemap_path(s).exists();

        let scraped = if sites::should_process(Step::Scrape, force, has_data(site), has_sitemap(site)) {
            match scrape(&conn, settings, Arc::clone(&fetcher), site, None, scrape_force, limit).await {
                Ok(stats) => {
                    info!("{}: {} pages ok, {} errors", site, stats.ok, stats.errors);
                    Outcome::Done
                }
                Err(e) => {
                    error!("{}: scrape failed: {:#}", site, e);
                    Outcome::Failed
                }
            }
        } else {
            Outcome::Skipped
        };

        let generated = if scraped == Outcome::Failed {
            Outcome::Skipped
        } else if sites::should_process(Step::Generate, force, has_data(site), has_sitemap(site)) {
            match generate(&conn, settings, site) {
                Ok(_) => Outcome::Done,
                Err(e) => {
                    error!("{}: generate failed: {:#}", site, e);
                    Outcome::Failed
                }
            }
        } else {
            Outcome::Skipped
        };

        summary.push((site, scraped, generated));
    }

    println!("\n{:<32} | {:<8} | {:<8}", "Site", "Scrape", "Generate");
    println!("{}", "-".repeat(54));
    for (site, scraped, generated) in &summary {
        println!(
            "{:<32} | {:<8} | {:<8}",
            truncate(site, 32),
            scraped.label(),
            generated.label()
        );
    }

    let failed = summary
        .iter()
        .filter(|(_, s, g)| *s == Outcome::Failed || *g == Outcome::Failed)
        .count();
    println!("\n{} sites, {} with failures", summary.len(), failed);
    Ok(())
}

fn print_fetch_stats(stats: &FetchStats) {
    println!(
        "Done: {} pages ({} fetched, {} errors, {} already cached).",
        stats.total, stats.ok, stats.errors, stats.skipped
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max - 3).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

// ── Tests ──

use std::collections::HashMap;
use std::sync::LazyLock;

use rayon::prelude::*;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::page::render_page;
use crate::nav::select::page_filename;
use crate::nav::FlatNavEntry;

pub const UNKNOWN_SITE: &str = "Unknown Site";
pub const MISSING_PAGE: &str = "Page content not available";
pub const MISSING_HOME: &str = "Home page content not available";

static TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static H1_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());

pub struct SiteInfo {
    pub slug: String,
    pub url: String,
    pub title: String,
}

/// `<title>`, else the first `<h1>`, else a fixed fallback.
pub fn site_title(index_html: &str) -> String {
    let doc = Html::parse_document(index_html);
    [&*TITLE_SELECTOR, &*H1_SELECTOR]
        .into_iter()
        .find_map(|sel| {
            let text = doc.select(sel).next()?.text().collect::<String>();
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        })
        .unwrap_or_else(|| UNKNOWN_SITE.to_string())
}

/// The landing page rendered under `## Home Page`.
pub fn render_home(index_html: Option<&str>, site_url: &str) -> String {
    match index_html {
        None => MISSING_HOME.to_string(),
        Some(html) => render_page(html, "Home", site_url, 3)
            .unwrap_or_else(|e| format!("Error rendering index page: {}", e)),
    }
}

/// One markdown block per navigation entry, in navigation order.
/// `pages` maps cache filenames to markup. A page that fails to render
/// gets a placeholder instead of aborting the document.
pub fn render_entries(entries: &[FlatNavEntry], pages: &HashMap<String, String>) -> Vec<String> {
    entries
        .par_iter()
        .map(|entry| render_entry(entry, pages))
        .collect()
}

fn render_entry(entry: &FlatNavEntry, pages: &HashMap<String, String>) -> String {
    let depth = entry.heading_level + 1;
    let Some(url) = entry.url.as_deref() else {
        return bare_heading(entry, depth, None);
    };

    let filename = page_filename(url);
    match pages.get(&filename) {
        Some(html) => match render_page(html, &entry.title, url, depth) {
            Ok(block) => {
                debug!("Rendered: {}", entry.title);
                block
            }
            Err(e) => {
                warn!("Error rendering {}: {}", entry.title, e);
                bare_heading(entry, depth, Some(&format!("Error rendering page: {}", e)))
            }
        },
        None if entry.eligible_for_retrieval => {
            warn!("Could not load HTML for: {} ({})", entry.title, filename);
            bare_heading(entry, depth, Some(MISSING_PAGE))
        }
        None => bare_heading(entry, depth, None),
    }
}

fn bare_heading(entry: &FlatNavEntry, depth: u32, note: Option<&str>) -> String {
    let mut block = format!(
        "{} {}\n\n- url: {}\n",
        "#".repeat(depth as usize),
        entry.title,
        entry.url.as_deref().unwrap_or("none")
    );
    if let Some(note) = note {
        block.push('\n');
        block.push_str(note);
        block.push('\n');
    }
    block
}

/// Assemble the full site document.
pub fn render_sitemap(site: &SiteInfo, home: &str, blocks: &[String]) -> String {
    format!(
        "# {}\n\n- Site: {}\n- Slug: {}\n\n## Home Page\n\n{}\n\n## Site Navigation\n\n{}\n",
        site.title,
        site.url,
        site.slug,
        home,
        blocks.join("\n\n")
    )
}

// ── Tests ──

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;

use crate::nav::slug::sanitize_site_slug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Scrape,
    Generate,
}

/// Which steps `all` reruns even when their output is already on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Force {
    All,
    Scrape,
    Generate,
}

impl Force {
    fn covers(self, step: Step) -> bool {
        matches!(
            (self, step),
            (Force::All, _) | (Force::Scrape, Step::Scrape) | (Force::Generate, Step::Generate)
        )
    }
}

/// Site slugs from the sites file, one per line. Blank lines and `#`
/// comments are skipped.
pub fn load_sites(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sites file {:?}", path))?;
    let sites = parse_sites(&text)?;
    if sites.is_empty() {
        bail!("No sites listed in {:?}", path);
    }
    Ok(sites)
}

fn parse_sites(text: &str) -> Result<Vec<String>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(sanitize_site_slug)
        .collect()
}

/// Scrape when no site data is cached; generate when data exists but the
/// sitemap doesn't. A matching force flag overrides both.
pub fn should_process(step: Step, force: Option<Force>, site_data_exists: bool, sitemap_exists: bool) -> bool {
    if force.is_some_and(|f| f.covers(step)) {
        return true;
    }
    match step {
        Step::Scrape => !site_data_exists,
        Step::Generate => site_data_exists && !sitemap_exists,
    }
}

// ── Tests ──

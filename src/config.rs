use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::nav::resolve::{DEFAULT_EXCLUDED_PAGES, DEFAULT_LINKLESS_SENTINEL, DEFAULT_SITE_ROOT};
use crate::nav::{OrphanPolicy, SitePolicy};

const CONFIG_BASENAME: &str = "sp_sitemap";
const ENV_PREFIX: &str = "SPSITEMAP";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub site_root: String,
    pub output_dir: PathBuf,
    pub db_path: PathBuf,
    pub sites_file: PathBuf,
    pub excluded_pages: Vec<String>,
    pub linkless_sentinel: String,
    pub promote_orphans: bool,
    pub concurrency: usize,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
    #[serde(default)]
    pub session_cookie: Option<String>,
}

impl Settings {
    /// Defaults, then `sp_sitemap.toml` (or `file` when given), then `SPSITEMAP_*` env vars.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("site_root", DEFAULT_SITE_ROOT)?
            .set_default("output_dir", "output")?
            .set_default("db_path", "output/sp_sitemap.sqlite")?
            .set_default("sites_file", "SITES.txt")?
            .set_default(
                "excluded_pages",
                DEFAULT_EXCLUDED_PAGES
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>(),
            )?
            .set_default("linkless_sentinel", DEFAULT_LINKLESS_SENTINEL)?
            .set_default("promote_orphans", false)?
            .set_default("concurrency", 4)?
            .set_default("max_retries", 3)?
            .set_default("backoff_ms", 2000)?
            .set_default("timeout_secs", 30)?;

        builder = match file {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name(CONFIG_BASENAME).required(false)),
        };

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("excluded_pages"),
            )
            .build()
            .context("Failed to build settings")?;

        settings
            .try_deserialize()
            .context("Failed to read settings")
    }

    pub fn site_policy(&self) -> SitePolicy {
        SitePolicy {
            site_root: self.site_root.clone(),
            excluded_pages: self.excluded_pages.clone(),
            linkless_sentinel: self.linkless_sentinel.clone(),
        }
    }

    pub fn orphan_policy(&self) -> OrphanPolicy {
        if self.promote_orphans {
            OrphanPolicy::Promote
        } else {
            OrphanPolicy::Drop
        }
    }

    /// `<output_dir>/site-data/<slug>`
    pub fn site_dir(&self, site_slug: &str) -> PathBuf {
        self.output_dir.join("site-data").join(site_slug)
    }

    /// `<output_dir>/<slug>.md`
    pub fn sitemap_path(&self, site_slug: &str) -> PathBuf {
        self.output_dir.join(format!("{}.md", site_slug))
    }
}

// ── Tests ──

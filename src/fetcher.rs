use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{header, Client, StatusCode};
use rusqlite::Connection;
use scraper::{Html, Selector};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Settings;
use crate::db::{self, PageRow};
use crate::nav::select::page_filename;
use crate::nav::FlatNavEntry;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Identity-provider hosts; a subdomain of any of these also counts.
const AUTH_HOSTS: &[&str] = &[
    "microsoftonline.com",
    "account.activedirectory.windowsazure.com",
    "sts.bris.ac.uk",
];

/// Whole path segments (or a leading host label) that mark a sign-in endpoint.
const AUTH_SEGMENTS: &[&str] = &["login", "signin", "sso", "adfs", "oauth2", "_forms"];

static SIGN_IN_FORM: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"input[type="password"], [data-testid="i0116"], [data-testid="i0118"], .login-form, #loginForm"#,
    )
    .unwrap()
});

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: StatusCode },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("authentication required for {url} (landed on {landed})")]
    AuthRequired { url: String, landed: String },
}

impl FetchError {
    /// Rate limits, server errors and timeouts are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            FetchError::Transport { source, .. } => source.is_timeout() || source.is_connect(),
            FetchError::AuthRequired { .. } => false,
        }
    }

    fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(status.as_u16()),
            _ => None,
        }
    }
}

pub struct FetchedPage {
    pub html: String,
    pub status: u16,
    pub latency_ms: i64,
}

/// One page the retrieval loop has to bring into the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub title: String,
    pub url: String,
    pub filename: String,
}

pub struct FetchStats {
    pub total: usize,
    pub skipped: usize,
    pub ok: usize,
    pub errors: usize,
}

pub struct Fetcher {
    client: Client,
    concurrency: usize,
    max_retries: u32,
    backoff: Duration,
}

impl Fetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        if let Some(cookie) = &settings.session_cookie {
            let mut value = header::HeaderValue::from_str(cookie)
                .context("Session cookie is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert(header::COOKIE, value);
        } else {
            warn!("No session cookie configured; protected sites will redirect to sign-in");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            concurrency: settings.concurrency.max(1),
            max_retries: settings.max_retries,
            backoff: Duration::from_millis(settings.backoff_ms),
        })
    }

    /// Single attempt. Landing on a sign-in page is an error, not content.
    pub async fn fetch_html(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let start = Instant::now();
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        let landed = response.url().to_string();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        let html = response.text().await.map_err(transport)?;

        if is_authentication_page(&landed, &html) {
            return Err(FetchError::AuthRequired {
                url: url.to_string(),
                landed,
            });
        }

        Ok(FetchedPage {
            html,
            status: status.as_u16(),
            latency_ms: start.elapsed().as_millis() as i64,
        })
    }

    pub async fn fetch_with_retry(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch_html(url).await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let backoff = backoff_delay(self.backoff, attempt);
                    warn!(
                        "{} (attempt {}/{}), backing off {:.1}s",
                        e,
                        attempt + 1,
                        self.max_retries,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Fetch the site landing page that carries the navigation payload.
    pub async fn fetch_index(&self, site_url: &str) -> Result<String> {
        info!("Fetching index page: {}", site_url);
        let page = self
            .fetch_with_retry(site_url)
            .await
            .with_context(|| format!("Failed to fetch index page {}", site_url))?;
        Ok(page.html)
    }
}

/// `base * 2^attempt`, saturating instead of overflowing.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Sign-in detection: the final URL points at an identity provider or a
/// sign-in endpoint, or the markup carries a credential form.
pub fn is_authentication_page(final_url: &str, html: &str) -> bool {
    is_sign_in_url(final_url) || Html::parse_document(html).select(&SIGN_IN_FORM).next().is_some()
}

fn is_sign_in_url(final_url: &str) -> bool {
    let Ok(url) = Url::parse(final_url) else {
        return false;
    };
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if AUTH_HOSTS
        .iter()
        .any(|h| host == *h || host.ends_with(&format!(".{}", h)))
    {
        return true;
    }
    let is_marker = |s: &str| AUTH_SEGMENTS.contains(&s.to_ascii_lowercase().as_str());
    host.split('.').next().is_some_and(is_marker)
        || url.path_segments().is_some_and(|mut segs| segs.any(is_marker))
}

/// Map worklist entries to cache filenames. Entries whose filename is already
/// planned are dropped so each file is fetched once.
pub fn plan(worklist: &[&FlatNavEntry]) -> Vec<WorkItem> {
    let mut seen = HashSet::new();
    worklist
        .iter()
        .filter_map(|e| {
            let url = e.url.as_ref()?;
            let filename = page_filename(url);
            if !seen.insert(filename.clone()) {
                debug!(title = %e.title, %filename, "filename already planned, skipping");
                return None;
            }
            Some(WorkItem {
                title: e.title.clone(),
                url: url.clone(),
                filename,
            })
        })
        .collect()
}

/// Retrieve pages concurrently, saving each result to the cache as it arrives.
/// Failed pages are recorded with their error; the run carries on.
/// `limit` caps the pages actually fetched, counted after cached pages are skipped.
pub async fn fetch_pages(
    conn: &Connection,
    fetcher: Arc<Fetcher>,
    site_slug: &str,
    items: Vec<WorkItem>,
    force: bool,
    limit: Option<usize>,
) -> Result<FetchStats> {
    let mut todo = Vec::with_capacity(items.len());
    let mut skipped = 0usize;
    for item in items {
        if !force && db::page_cached(conn, site_slug, &item.filename)? {
            debug!("Skipping {} (already cached)", item.title);
            skipped += 1;
        } else {
            todo.push(item);
        }
    }
    if let Some(n) = limit {
        todo.truncate(n);
    }
    let total = todo.len() + skipped;

    let pb = ProgressBar::new(todo.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta}) {msg}")?
            .progress_chars("=> "),
    );

    let semaphore = Arc::new(Semaphore::new(fetcher.concurrency));
    let (tx, mut rx) = tokio::sync::mpsc::channel::<PageRow>(fetcher.concurrency * 2);

    for item in todo {
        let fetcher = Arc::clone(&fetcher);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let site_slug = site_slug.to_string();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let row = match fetcher.fetch_with_retry(&item.url).await {
                Ok(page) => PageRow {
                    site_slug,
                    filename: item.filename,
                    url: item.url,
                    html: Some(page.html),
                    status: Some(page.status),
                    error: None,
                    latency_ms: Some(page.latency_ms),
                    fetched_at: chrono::Utc::now().to_rfc3339(),
                },
                Err(e) => {
                    warn!("Failed to fetch {}: {}", item.title, e);
                    PageRow {
                        site_slug,
                        filename: item.filename,
                        url: item.url,
                        html: None,
                        status: e.status(),
                        error: Some(e.to_string()),
                        latency_ms: None,
                        fetched_at: chrono::Utc::now().to_rfc3339(),
                    }
                }
            };
            let _ = tx.send(row).await;
        });
    }

    // rx closes once every task has dropped its sender
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;
    while let Some(row) = rx.recv().await {
        if row.error.is_some() {
            errors += 1;
        } else {
            ok += 1;
        }
        pb.set_message(row.filename.clone());
        db::save_page(conn, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Fetched {} pages for {} ({} ok, {} errors, {} cached)",
        total, site_slug, ok, errors, skipped
    );

    Ok(FetchStats {
        total,
        skipped,
        ok,
        errors,
    })
}

// ── Tests ──

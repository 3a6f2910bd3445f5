use super::FlatNavEntry;

/// Path prefix shared by every site collection.
pub const COLLECTION_PREFIX: &str = "/sites/";
/// Extension of retrievable content pages.
pub const CONTENT_EXTENSION: &str = ".aspx";

pub const DEFAULT_SITE_ROOT: &str = "https://uob.sharepoint.com";
pub const DEFAULT_EXCLUDED_PAGES: &[&str] = &["AllItems.aspx", "admin-centre.aspx", "news.aspx"];
pub const DEFAULT_LINKLESS_SENTINEL: &str = "http://linkless.header/";

/// Constants the resolver needs: where absolute URLs are rooted, which page
/// names are never retrieved, and the URL that marks a heading without a link.
#[derive(Debug, Clone, PartialEq)]
pub struct SitePolicy {
    pub site_root: String,
    pub excluded_pages: Vec<String>,
    pub linkless_sentinel: String,
}

impl Default for SitePolicy {
    fn default() -> Self {
        Self {
            site_root: DEFAULT_SITE_ROOT.to_string(),
            excluded_pages: DEFAULT_EXCLUDED_PAGES.iter().map(|s| s.to_string()).collect(),
            linkless_sentinel: DEFAULT_LINKLESS_SENTINEL.to_string(),
        }
    }
}

impl SitePolicy {
    /// `https://host/sites/<slug>`
    pub fn site_url(&self, site_slug: &str) -> String {
        format!("{}{}{}", self.root(), COLLECTION_PREFIX, site_slug)
    }

    fn root(&self) -> &str {
        self.site_root.trim_end_matches('/')
    }

    fn absolute(&self, path: &str) -> String {
        format!("{}{}", self.root(), path)
    }

    fn is_excluded(&self, base_url: &str) -> bool {
        self.excluded_pages.iter().any(|p| base_url.ends_with(p.as_str()))
    }
}

/// True when `base_url` starts with `/sites/<site_slug>` and names a content page.
/// Plain, case-sensitive prefix test: `acme` also claims `/sites/acme-labs/`.
pub fn is_target_content_page(base_url: &str, site_slug: &str) -> bool {
    base_url
        .strip_prefix(COLLECTION_PREFIX)
        .is_some_and(|rest| rest.starts_with(site_slug))
        && base_url.ends_with(CONTENT_EXTENSION)
}

/// Resolve one entry. Inclusion is decided first, then the exclusion list
/// overrides it, then the link-less sentinel clears the URL.
pub fn resolve_entry(entry: FlatNavEntry, site_slug: &str, policy: &SitePolicy) -> FlatNavEntry {
    let Some(base) = entry.base_url.as_deref() else {
        return FlatNavEntry {
            url: None,
            eligible_for_retrieval: false,
            ..entry
        };
    };

    let mut url = Some(base.to_string());
    if base.starts_with(COLLECTION_PREFIX) {
        url = Some(policy.absolute(base));
    }

    let mut eligible = is_target_content_page(base, site_slug);
    if policy.is_excluded(base) {
        eligible = false;
    }

    if base == policy.linkless_sentinel {
        url = None;
    }

    FlatNavEntry {
        url,
        eligible_for_retrieval: eligible,
        ..entry
    }
}

pub fn resolve_all(
    entries: Vec<FlatNavEntry>,
    site_slug: &str,
    policy: &SitePolicy,
) -> Vec<FlatNavEntry> {
    entries
        .into_iter()
        .map(|e| resolve_entry(e, site_slug, policy))
        .collect()
}

// ── Tests ──

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::FlatNavEntry;

pub const PAGE_SUFFIX: &str = ".html";
pub const INDEX_FILENAME: &str = "index.html";

static UNSAFE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());

/// Entries to retrieve, in navigation order. Both the eligibility flag and
/// the URL are checked.
pub fn worklist(entries: &[FlatNavEntry]) -> Vec<&FlatNavEntry> {
    entries
        .iter()
        .filter(|e| e.eligible_for_retrieval && e.url.is_some())
        .collect()
}

/// Cache filename for a page URL: last path segment, `.html` suffix,
/// filesystem-unsafe characters replaced with `_`.
pub fn page_filename(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        // relative input: drop query and fragment by hand
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    let Some(last) = path.split('/').filter(|p| !p.is_empty()).last() else {
        return INDEX_FILENAME.to_string();
    };

    let mut filename = last.to_string();
    if !filename.ends_with(PAGE_SUFFIX) {
        filename.push_str(PAGE_SUFFIX);
    }
    UNSAFE_RE.replace_all(&filename, "_").to_string()
}

// ── Tests ──

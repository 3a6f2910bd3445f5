use std::sync::LazyLock;

use regex::Regex;

static QUOTES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"['’]").unwrap());
static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").unwrap());

/// Lowercase `text` and collapse every run of non-alphanumerics into a single `-`.
/// Lossy: distinct titles may share a slug, and nothing here disambiguates them.
pub fn slugify(text: &str) -> String {
    let lower = text.to_lowercase();
    let unquoted = QUOTES_RE.replace_all(&lower, "");
    SEPARATOR_RE
        .replace_all(&unquoted, "-")
        .trim_matches('-')
        .to_string()
}

/// Normalize a user-supplied site slug. Errors when nothing usable remains.
pub fn sanitize_site_slug(raw: &str) -> anyhow::Result<String> {
    let slug = slugify(raw);
    if slug.is_empty() {
        anyhow::bail!("Invalid site slug: {:?}", raw);
    }
    Ok(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_hyphenates() {
        assert_eq!(slugify("About Us"), "about-us");
        assert_eq!(slugify("Research & Impact"), "research-impact");
    }

    #[test]
    fn trims_edge_separators() {
        assert_eq!(slugify("  --Home--  "), "home");
        assert_eq!(slugify("(Archive)"), "archive");
    }

    #[test]
    fn drops_apostrophes() {
        assert_eq!(slugify("Director's Office"), "directors-office");
    }

    #[test]
    fn keeps_digits_and_unicode_letters() {
        assert_eq!(slugify("Café 2024"), "café-2024");
    }

    #[test]
    fn duplicate_titles_collide() {
        assert_eq!(slugify("Contact"), slugify("contact!"));
    }

    #[test]
    fn symbols_only_is_empty() {
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn site_slug_sanitized() {
        assert_eq!(
            sanitize_site_slug("Integrative Epidemiology").unwrap(),
            "integrative-epidemiology"
        );
        assert!(sanitize_site_slug("   ").is_err());
    }
}

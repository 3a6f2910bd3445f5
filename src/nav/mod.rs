pub mod error;
pub mod extract;
pub mod flatten;
pub mod resolve;
pub mod select;
pub mod slug;

pub use error::NavError;
pub use extract::OrphanPolicy;
pub use resolve::SitePolicy;

/// A navigation node as it appears in the embedded payload.
/// Each parent owns its children; order is the menu order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawNavNode {
    pub title: String,
    pub url: Option<String>,
    pub is_external: Option<bool>,
    pub depth: u32,
    pub children: Vec<RawNavNode>,
}

/// One row of the flattened, policy-applied navigation list.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatNavEntry {
    pub title: String,
    pub slug: String,
    pub base_url: Option<String>,
    pub url: Option<String>,
    pub is_external: Option<bool>,
    pub depth: u32,
    pub heading_level: u32,
    pub eligible_for_retrieval: bool,
}

/// Full pipeline: markup → nested tree → flat list → resolved list.
/// Feed the result to [`select::worklist`] to get the retrieval set.
pub fn process(
    html: &str,
    site_slug: &str,
    policy: &SitePolicy,
    orphans: OrphanPolicy,
) -> Result<Vec<FlatNavEntry>, NavError> {
    let payload = extract::quick_launch(html)?;
    let tree = extract::nav_tree(&payload, orphans)?;
    let flat = flatten::flatten(&tree);
    Ok(resolve::resolve_all(flat, site_slug, policy))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn page(payload: &str) -> String {
        format!(
            r#"<html><head><script>var _spPageContextInfo = {{"webTitle":"Acme","navigationInfo":{payload},"appBarParams":{{}}}};</script></head><body></body></html>"#
        )
    }

    #[test]
    fn home_and_about_scenario() {
        let html = page(
            r#"{"quickLaunch":[{"Title":"Home","Url":"/sites/acme/","IsExternal":false,"Children":[
                {"Title":"About","Url":"/sites/acme/about.aspx","IsExternal":false,"Children":[]}
            ]}]}"#,
        );
        let entries = process(&html, "acme", &SitePolicy::default(), OrphanPolicy::Drop).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Home");
        assert_eq!(entries[0].heading_level, 1);
        assert!(!entries[0].eligible_for_retrieval);
        assert_eq!(entries[1].title, "About");
        assert_eq!(entries[1].heading_level, 2);
        assert!(entries[1].eligible_for_retrieval);
        assert_eq!(
            entries[1].url.as_deref(),
            Some("https://uob.sharepoint.com/sites/acme/about.aspx")
        );

        let work = select::worklist(&entries);
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].title, "About");
    }

    #[test]
    fn missing_nav_key_produces_no_list() {
        let html = page(r#"{"topNav":[]}"#);
        let err = process(&html, "acme", &SitePolicy::default(), OrphanPolicy::Drop).unwrap_err();
        assert!(matches!(err, NavError::SchemaMismatch { .. }));
    }

    #[test]
    fn fixture_site() {
        let html = std::fs::read_to_string("tests/fixtures/landing.html").unwrap();
        let entries = process(&html, "acme", &SitePolicy::default(), OrphanPolicy::Drop).unwrap();

        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Home",
                "About us",
                "Our team",
                "History",
                "Research",
                "Projects",
                "News",
                "Resources",
                "Documents",
                "Partner portal",
                "Sister site",
                "Admin centre",
            ]
        );
        for e in &entries {
            assert_eq!(e.heading_level, e.depth + 1);
        }

        let work: Vec<&str> = select::worklist(&entries)
            .iter()
            .map(|e| e.slug.as_str())
            .collect();
        assert_eq!(
            work,
            vec!["about-us", "our-team", "history", "projects", "sister-site"]
        );
    }

    #[test]
    fn fixture_site_promoting_orphans() {
        let html = std::fs::read_to_string("tests/fixtures/landing.html").unwrap();
        let entries =
            process(&html, "acme", &SitePolicy::default(), OrphanPolicy::Promote).unwrap();

        let orphan = entries.iter().find(|e| e.title == "Hidden child").unwrap();
        assert_eq!(orphan.depth, 2);
        assert_eq!(orphan.heading_level, 3);
    }
}

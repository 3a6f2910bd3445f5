use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

static HEADER_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4").unwrap());
static ARTICLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("article").unwrap());
static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("page has no <article> element")]
    MissingArticle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub text: String,
    pub href: String,
}

/// `h1`–`h4` anywhere in the document, in order.
pub fn headers(doc: &Html) -> Vec<Header> {
    doc.select(&HEADER_SELECTOR)
        .filter_map(|el| {
            let level = el.value().name().strip_prefix('h')?.parse().ok()?;
            Some(Header {
                level,
                text: element_text(&el),
            })
        })
        .collect()
}

/// Links with visible text inside the first `<article>`. Text-less anchors
/// are usually heading permalinks and are skipped.
pub fn links(doc: &Html) -> Result<Vec<Link>, RenderError> {
    let article = doc
        .select(&ARTICLE_SELECTOR)
        .next()
        .ok_or(RenderError::MissingArticle)?;
    Ok(article
        .select(&LINK_SELECTOR)
        .filter_map(|el| {
            let text = element_text(&el);
            if text.is_empty() {
                return None;
            }
            Some(Link {
                text,
                href: el.value().attr("href").unwrap_or_default().to_string(),
            })
        })
        .collect())
}

/// Indented bullet list; `h2` sits at the margin, each deeper level adds two spaces.
/// `h1` is the page title and is left out.
pub fn convert_headers(headers: &[Header]) -> String {
    headers
        .iter()
        .filter(|h| h.level >= 2)
        .map(|h| format!("{}- {}\n", "  ".repeat((h.level - 2) as usize), h.text))
        .collect()
}

pub fn convert_links(links: &[Link]) -> String {
    links
        .iter()
        .map(|l| format!("- [{}]({})\n", l.text, l.href))
        .collect()
}

/// Render one page as a markdown block headed at `heading_depth`.
pub fn render_page(
    html: &str,
    title: &str,
    url: &str,
    heading_depth: u32,
) -> Result<String, RenderError> {
    let doc = Html::parse_document(html);
    let sections = convert_headers(&headers(&doc));
    let links = convert_links(&links(&doc)?);

    Ok(format!(
        "\n{} {}\n\n\n- url: {}\n\n\n**Sections**\n{}\n\n**Links**\n{}\n",
        "#".repeat(heading_depth as usize),
        title,
        url,
        sections,
        links
    ))
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_basic() {
        let doc = Html::parse_document(
            "<html><body><h1>Main Title</h1><h2>Section</h2><h3>Subsection</h3><p>Regular</p></body></html>",
        );
        let h = headers(&doc);
        assert_eq!(h.len(), 3);
        assert_eq!(h[0], Header { level: 1, text: "Main Title".into() });
        assert_eq!(h[1], Header { level: 2, text: "Section".into() });
    }

    #[test]
    fn headers_empty() {
        let doc = Html::parse_document("<html><body><p>Just a paragraph</p><div>A div</div></body></html>");
        assert!(headers(&doc).is_empty());
    }

    #[test]
    fn links_skip_empty_text() {
        let doc = Html::parse_document(
            r#"<html><body><article>
                <a href="/page1">Link with text</a>
                <a href="/page2"></a>
                <a href="/page3">Another   link</a>
            </article></body></html>"#,
        );
        let l = links(&doc).unwrap();
        assert_eq!(
            l,
            vec![
                Link { text: "Link with text".into(), href: "/page1".into() },
                Link { text: "Another link".into(), href: "/page3".into() },
            ]
        );
    }

    #[test]
    fn links_outside_article_ignored() {
        let doc = Html::parse_document(
            r#"<html><body><nav><a href="/nav">Nav</a></nav><article><a href="/in">In</a></article></body></html>"#,
        );
        let l = links(&doc).unwrap();
        assert_eq!(l.len(), 1);
        assert_eq!(l[0].href, "/in");
    }

    #[test]
    fn links_need_article() {
        let doc = Html::parse_document("<html><body><a href='/x'>x</a></body></html>");
        assert!(matches!(links(&doc), Err(RenderError::MissingArticle)));
    }

    #[test]
    fn header_indentation() {
        let md = convert_headers(&[
            Header { level: 1, text: "Title".into() },
            Header { level: 2, text: "Main Section".into() },
            Header { level: 3, text: "Subsection".into() },
            Header { level: 4, text: "Detail".into() },
        ]);
        assert_eq!(md, "- Main Section\n  - Subsection\n    - Detail\n");
    }

    #[test]
    fn link_list() {
        let md = convert_links(&[
            Link { text: "Home".into(), href: "/page.aspx".into() },
            Link { text: "External".into(), href: "https://example.com".into() },
        ]);
        assert_eq!(md, "- [Home](/page.aspx)\n- [External](https://example.com)\n");
        assert_eq!(convert_links(&[]), "");
    }

    #[test]
    fn page_block() {
        let html = std::fs::read_to_string("tests/fixtures/landing.html").unwrap();
        let md = render_page(&html, "Home", "https://uob.sharepoint.com/sites/acme", 3).unwrap();
        assert!(md.starts_with("\n### Home\n"));
        assert!(md.contains("- url: https://uob.sharepoint.com/sites/acme\n"));
        assert!(md.contains("**Sections**\n- Welcome\n  - Latest\n- Contact\n"));
        assert!(md.contains(
            "**Links**\n- [Current projects](/sites/acme/SitePages/Projects.aspx)\n- [Email the unit](mailto:acme@example.org)\n"
        ));
        assert!(!md.contains("Acme Research Unit"));
    }

    #[test]
    fn page_without_article_fails() {
        let err = render_page("<html><body><h2>x</h2></body></html>", "T", "u", 2).unwrap_err();
        assert_eq!(err.to_string(), "page has no <article> element");
    }
}

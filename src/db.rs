use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;

use crate::nav::FlatNavEntry;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

/// Open an existing cache without creating or migrating it.
pub fn open_read_only(path: &Path) -> Result<Option<Connection>> {
    if !path.exists() {
        return Ok(None);
    }
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open {:?}", path))?;
    Ok(Some(conn))
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sites (
            slug        TEXT PRIMARY KEY,
            url         TEXT NOT NULL,
            title       TEXT,
            index_html  TEXT NOT NULL,
            fetched_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS nav_entries (
            site_slug      TEXT NOT NULL REFERENCES sites(slug),
            position       INTEGER NOT NULL,
            title          TEXT NOT NULL,
            slug           TEXT NOT NULL,
            base_url       TEXT,
            url            TEXT,
            is_external    BOOLEAN,
            depth          INTEGER NOT NULL,
            heading_level  INTEGER NOT NULL,
            eligible       BOOLEAN NOT NULL DEFAULT 0,
            PRIMARY KEY (site_slug, position)
        );

        CREATE TABLE IF NOT EXISTS page_data (
            id          INTEGER PRIMARY KEY,
            site_slug   TEXT NOT NULL REFERENCES sites(slug),
            filename    TEXT NOT NULL,
            url         TEXT NOT NULL,
            html        TEXT,
            status      INTEGER,
            error       TEXT,
            latency_ms  INTEGER,
            fetched_at  TEXT NOT NULL,
            UNIQUE(site_slug, filename)
        );
        CREATE INDEX IF NOT EXISTS idx_page_data_site ON page_data(site_slug);
        ",
    )?;
    Ok(())
}

// ── Sites ──

pub struct SiteRow {
    pub slug: String,
    pub url: String,
    pub title: Option<String>,
    pub index_html: String,
}

pub fn save_site_index(conn: &Connection, site: &SiteRow) -> Result<()> {
    conn.execute(
        "INSERT INTO sites (slug, url, title, index_html, fetched_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))
         ON CONFLICT(slug) DO UPDATE SET
            url = excluded.url,
            title = excluded.title,
            index_html = excluded.index_html,
            fetched_at = excluded.fetched_at",
        params![site.slug, site.url, site.title, site.index_html],
    )?;
    Ok(())
}

pub fn fetch_site_index(conn: &Connection, slug: &str) -> Result<Option<SiteRow>> {
    let row = conn
        .query_row(
            "SELECT slug, url, title, index_html FROM sites WHERE slug = ?1",
            params![slug],
            |row| {
                Ok(SiteRow {
                    slug: row.get(0)?,
                    url: row.get(1)?,
                    title: row.get(2)?,
                    index_html: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

// ── Navigation ──

/// Replace the stored navigation list of a site in one transaction.
pub fn save_nav_entries(conn: &Connection, site_slug: &str, entries: &[FlatNavEntry]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM nav_entries WHERE site_slug = ?1", params![site_slug])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO nav_entries
             (site_slug, position, title, slug, base_url, url, is_external, depth, heading_level, eligible)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for (position, e) in entries.iter().enumerate() {
            stmt.execute(params![
                site_slug,
                position as i64,
                e.title,
                e.slug,
                e.base_url,
                e.url,
                e.is_external,
                e.depth,
                e.heading_level,
                e.eligible_for_retrieval,
            ])?;
        }
    }
    tx.commit()?;
    Ok(entries.len())
}

pub fn fetch_nav_entries(conn: &Connection, site_slug: &str) -> Result<Vec<FlatNavEntry>> {
    let mut stmt = conn.prepare(
        "SELECT title, slug, base_url, url, is_external, depth, heading_level, eligible
         FROM nav_entries WHERE site_slug = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map(params![site_slug], |row| {
            Ok(FlatNavEntry {
                title: row.get(0)?,
                slug: row.get(1)?,
                base_url: row.get(2)?,
                url: row.get(3)?,
                is_external: row.get(4)?,
                depth: row.get(5)?,
                heading_level: row.get(6)?,
                eligible_for_retrieval: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Pages ──

pub struct PageRow {
    pub site_slug: String,
    pub filename: String,
    pub url: String,
    pub html: Option<String>,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
    pub fetched_at: String,
}

/// Insert or overwrite the cached copy of one page. A failed refetch keeps
/// the markup from the last good fetch.
pub fn save_page(conn: &Connection, row: &PageRow) -> Result<()> {
    conn.execute(
        "INSERT INTO page_data (site_slug, filename, url, html, status, error, latency_ms, fetched_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(site_slug, filename) DO UPDATE SET
            url = excluded.url,
            html = COALESCE(excluded.html, page_data.html),
            status = excluded.status,
            error = excluded.error,
            latency_ms = excluded.latency_ms,
            fetched_at = excluded.fetched_at",
        params![
            row.site_slug,
            row.filename,
            row.url,
            row.html,
            row.status,
            row.error,
            row.latency_ms,
            row.fetched_at,
        ],
    )?;
    Ok(())
}

pub fn fetch_page_html(conn: &Connection, site_slug: &str, filename: &str) -> Result<Option<String>> {
    let html: Option<Option<String>> = conn
        .query_row(
            "SELECT html FROM page_data WHERE site_slug = ?1 AND filename = ?2",
            params![site_slug, filename],
            |row| row.get(0),
        )
        .optional()?;
    Ok(html.flatten())
}

/// A page counts as cached only when its markup was stored.
pub fn page_cached(conn: &Connection, site_slug: &str, filename: &str) -> Result<bool> {
    Ok(fetch_page_html(conn, site_slug, filename)?.is_some())
}

// ── Stats ──

pub struct Stats {
    pub sites: usize,
    pub nav_entries: usize,
    pub eligible: usize,
    pub pages: usize,
    pub errors: usize,
}

pub fn get_stats(conn: &Connection, site_slug: Option<&str>) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> {
        let n: i64 = match site_slug {
            Some(slug) => conn.query_row(sql, params![slug], |r| r.get(0))?,
            None => conn.query_row(sql, [], |r| r.get(0))?,
        };
        Ok(n as usize)
    };
    let filter = if site_slug.is_some() { " WHERE site_slug = ?1" } else { "" };
    let and = if site_slug.is_some() { " AND site_slug = ?1" } else { "" };

    Ok(Stats {
        sites: count(&format!(
            "SELECT COUNT(*) FROM sites{}",
            if site_slug.is_some() { " WHERE slug = ?1" } else { "" }
        ))?,
        nav_entries: count(&format!("SELECT COUNT(*) FROM nav_entries{}", filter))?,
        eligible: count(&format!("SELECT COUNT(*) FROM nav_entries WHERE eligible = 1{}", and))?,
        pages: count(&format!("SELECT COUNT(*) FROM page_data WHERE html IS NOT NULL{}", and))?,
        errors: count(&format!("SELECT COUNT(*) FROM page_data WHERE error IS NOT NULL{}", and))?,
    })
}

// ── JSON export ──

/// Shape of one record in `navbar_links.json`.
#[derive(Debug, Serialize)]
pub struct NavRecord<'a> {
    pub title: &'a str,
    pub slug: &'a str,
    pub url: Option<&'a str>,
    pub should_be_scraped: bool,
    pub level: u32,
}

impl<'a> From<&'a FlatNavEntry> for NavRecord<'a> {
    fn from(e: &'a FlatNavEntry) -> Self {
        NavRecord {
            title: &e.title,
            slug: &e.slug,
            url: e.url.as_deref(),
            should_be_scraped: e.eligible_for_retrieval,
            level: e.heading_level,
        }
    }
}

/// Write the ordered navigation list as pretty-printed JSON.
pub fn export_nav_json(path: &Path, entries: &[FlatNavEntry]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let records: Vec<NavRecord> = entries.iter().map(NavRecord::from).collect();
    let json = serde_json::to_string_pretty(&records)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        save_site_index(
            &conn,
            &SiteRow {
                slug: "acme".into(),
                url: "https://uob.sharepoint.com/sites/acme".into(),
                title: Some("Acme".into()),
                index_html: "<html></html>".into(),
            },
        )
        .unwrap();
        conn
    }

    fn entry(title: &str, url: Option<&str>, eligible: bool) -> FlatNavEntry {
        FlatNavEntry {
            title: title.into(),
            slug: title.to_lowercase(),
            base_url: url.map(String::from),
            url: url.map(String::from),
            is_external: None,
            depth: 1,
            heading_level: 2,
            eligible_for_retrieval: eligible,
        }
    }

    fn page(filename: &str, html: Option<&str>, error: Option<&str>) -> PageRow {
        PageRow {
            site_slug: "acme".into(),
            filename: filename.into(),
            url: format!("https://uob.sharepoint.com/sites/acme/{}", filename),
            html: html.map(String::from),
            status: Some(200),
            error: error.map(String::from),
            latency_ms: Some(12),
            fetched_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn site_index_upsert() {
        let conn = memory();
        save_site_index(
            &conn,
            &SiteRow {
                slug: "acme".into(),
                url: "https://uob.sharepoint.com/sites/acme".into(),
                title: None,
                index_html: "<html>v2</html>".into(),
            },
        )
        .unwrap();
        let site = fetch_site_index(&conn, "acme").unwrap().unwrap();
        assert_eq!(site.index_html, "<html>v2</html>");
        assert!(site.title.is_none());
        assert!(fetch_site_index(&conn, "other").unwrap().is_none());
    }

    #[test]
    fn nav_entries_roundtrip_in_order() {
        let conn = memory();
        let entries = vec![
            entry("Home", None, false),
            entry("About", Some("https://x/about.aspx"), true),
            entry("Team", Some("https://x/team.aspx"), true),
        ];
        save_nav_entries(&conn, "acme", &entries).unwrap();
        assert_eq!(fetch_nav_entries(&conn, "acme").unwrap(), entries);
    }

    #[test]
    fn nav_entries_replaced_not_appended() {
        let conn = memory();
        save_nav_entries(&conn, "acme", &[entry("A", None, false), entry("B", None, false)]).unwrap();
        save_nav_entries(&conn, "acme", &[entry("C", None, false)]).unwrap();
        let titles: Vec<String> = fetch_nav_entries(&conn, "acme")
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["C".to_string()]);
    }

    #[test]
    fn page_cache() {
        let conn = memory();
        save_page(&conn, &page("a.aspx.html", None, Some("HTTP 500"))).unwrap();
        assert!(!page_cached(&conn, "acme", "a.aspx.html").unwrap());

        save_page(&conn, &page("a.aspx.html", Some("<p>a</p>"), None)).unwrap();
        assert!(page_cached(&conn, "acme", "a.aspx.html").unwrap());
        assert_eq!(
            fetch_page_html(&conn, "acme", "a.aspx.html").unwrap().as_deref(),
            Some("<p>a</p>")
        );
        assert!(fetch_page_html(&conn, "acme", "missing.html").unwrap().is_none());
    }

    #[test]
    fn failed_refetch_keeps_markup() {
        let conn = memory();
        save_page(&conn, &page("a.aspx.html", Some("<p>a</p>"), None)).unwrap();
        save_page(&conn, &page("a.aspx.html", None, Some("HTTP 503"))).unwrap();
        assert!(page_cached(&conn, "acme", "a.aspx.html").unwrap());
        assert_eq!(get_stats(&conn, Some("acme")).unwrap().errors, 1);
    }

    #[test]
    fn stats_counts() {
        let conn = memory();
        save_nav_entries(
            &conn,
            "acme",
            &[entry("A", Some("https://x/a.aspx"), true), entry("B", None, false)],
        )
        .unwrap();
        save_page(&conn, &page("a.aspx.html", Some("<p>a</p>"), None)).unwrap();
        save_page(&conn, &page("b.aspx.html", None, Some("timeout"))).unwrap();

        let s = get_stats(&conn, Some("acme")).unwrap();
        assert_eq!((s.sites, s.nav_entries, s.eligible, s.pages, s.errors), (1, 2, 1, 1, 1));

        let all = get_stats(&conn, None).unwrap();
        assert_eq!(all.sites, 1);
        assert_eq!(get_stats(&conn, Some("other")).unwrap().nav_entries, 0);
    }

    #[test]
    fn json_export_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site-data/acme/navbar_links.json");
        export_nav_json(
            &path,
            &[entry("Home", None, false), entry("About", Some("https://x/about.aspx"), true)],
        )
        .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                {"title": "Home", "slug": "home", "url": null, "should_be_scraped": false, "level": 2},
                {"title": "About", "slug": "about", "url": "https://x/about.aspx", "should_be_scraped": true, "level": 2}
            ])
        );
    }
}

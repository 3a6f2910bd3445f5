use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::error::NavError;
use super::RawNavNode;

/// Key that marks the script element holding the navigation payload.
pub const MARKER_KEY: &str = "navigationInfo";
/// Key inside the payload object holding the menu list.
pub const NAV_LIST_KEY: &str = "quickLaunch";

static SCRIPT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());
// Greedy: the value runs up to the last `,"appBarParams"` in the script.
static PAYLOAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)"navigationInfo":(.*),"appBarParams""#).unwrap());

/// What to do with the subtree of a node that has no title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    /// Drop the node together with all of its descendants.
    #[default]
    Drop,
    /// Drop only the node; titled descendants take its place with their original depth.
    Promote,
}

/// Locate the marker script and return the raw `quickLaunch` list.
pub fn quick_launch(html: &str) -> Result<Vec<Value>, NavError> {
    let script = marker_script(html).ok_or(NavError::PayloadNotFound)?;

    let caps = PAYLOAD_RE.captures(&script).ok_or_else(|| {
        NavError::PayloadMalformed(format!(
            "`{}` is not followed by an appBarParams delimiter",
            MARKER_KEY
        ))
    })?;

    let info: Value = serde_json::from_str(&caps[1])
        .map_err(|e| NavError::PayloadMalformed(e.to_string()))?;

    let Value::Object(mut info) = info else {
        return Err(NavError::schema(MARKER_KEY, "expected an object"));
    };
    let path = format!("{}.{}", MARKER_KEY, NAV_LIST_KEY);
    match info.remove(NAV_LIST_KEY) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(NavError::schema(path, "expected an array")),
        None => Err(NavError::schema(path, "missing key")),
    }
}

fn marker_script(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let scripts: Vec<String> = document
        .select(&SCRIPT_SELECTOR)
        .map(|el| el.text().collect::<String>())
        .collect();
    debug!(scripts = scripts.len(), "scanning script elements");
    scripts.into_iter().find(|s| s.contains(MARKER_KEY))
}

/// Convert the raw list into owned nodes rooted at depth 0.
pub fn nav_tree(items: &[Value], orphans: OrphanPolicy) -> Result<Vec<RawNavNode>, NavError> {
    let mut nodes = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let path = format!("{}[{}]", NAV_LIST_KEY, i);
        convert_node(item, 0, &path, orphans, &mut nodes)?;
    }
    Ok(nodes)
}

fn convert_node(
    item: &Value,
    depth: u32,
    path: &str,
    orphans: OrphanPolicy,
    out: &mut Vec<RawNavNode>,
) -> Result<(), NavError> {
    let obj = item
        .as_object()
        .ok_or_else(|| NavError::schema(path, "expected an object"))?;

    let title = match obj.get("Title") {
        Some(Value::String(t)) => t.clone(),
        None | Some(Value::Null) => {
            warn!(
                path,
                url = ?obj.get("Url"),
                promote = orphans == OrphanPolicy::Promote,
                "navigation node without a title, skipping"
            );
            if orphans == OrphanPolicy::Promote {
                out.extend(convert_children(obj, depth, path, orphans)?);
            }
            return Ok(());
        }
        Some(_) => return Err(NavError::schema(format!("{}.Title", path), "expected a string")),
    };

    let url = match obj.get("Url") {
        Some(Value::String(u)) => Some(u.clone()),
        None | Some(Value::Null) => None,
        Some(_) => return Err(NavError::schema(format!("{}.Url", path), "expected a string")),
    };

    let is_external = match obj.get("IsExternal") {
        Some(Value::Bool(b)) => Some(*b),
        other => {
            debug!(path, title = %title, value = ?other, "IsExternal missing or not a boolean");
            None
        }
    };

    let children = convert_children(obj, depth, path, orphans)?;

    out.push(RawNavNode {
        title,
        url,
        is_external,
        depth,
        children,
    });
    Ok(())
}

fn convert_children(
    obj: &Map<String, Value>,
    depth: u32,
    path: &str,
    orphans: OrphanPolicy,
) -> Result<Vec<RawNavNode>, NavError> {
    let raw: &[Value] = match obj.get("Children") {
        Some(Value::Array(c)) => c.as_slice(),
        Some(Value::Null) => &[],
        Some(_) => {
            return Err(NavError::schema(format!("{}.Children", path), "expected an array"))
        }
        None => return Err(NavError::schema(format!("{}.Children", path), "missing key")),
    };

    let mut children = Vec::with_capacity(raw.len());
    for (i, child) in raw.iter().enumerate() {
        let child_path = format!("{}.Children[{}]", path, i);
        convert_node(child, depth + 1, &child_path, orphans, &mut children)?;
    }
    Ok(children)
}

// ── Tests ──

use super::slug::slugify;
use super::{FlatNavEntry, RawNavNode};

/// Pre-order walk: each node is followed by its whole subtree, siblings in menu order.
/// Entries come out unresolved (`url == base_url`) and not eligible.
pub fn flatten(nodes: &[RawNavNode]) -> Vec<FlatNavEntry> {
    let mut out = Vec::new();
    for node in nodes {
        push_subtree(node, &mut out);
    }
    out
}

fn push_subtree(node: &RawNavNode, out: &mut Vec<FlatNavEntry>) {
    out.push(FlatNavEntry {
        title: node.title.clone(),
        slug: slugify(&node.title),
        base_url: node.url.clone(),
        url: node.url.clone(),
        is_external: node.is_external,
        depth: node.depth,
        heading_level: node.depth + 1,
        eligible_for_retrieval: false,
    });
    for child in &node.children {
        push_subtree(child, out);
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn node(title: &str, depth: u32, children: Vec<RawNavNode>) -> RawNavNode {
        RawNavNode {
            title: title.to_string(),
            url: Some(format!("/sites/acme/{}.aspx", title.to_lowercase())),
            is_external: Some(false),
            depth,
            children,
        }
    }

    #[test]
    fn preorder() {
        let tree = vec![
            node(
                "A",
                0,
                vec![
                    node("A1", 1, vec![node("A1a", 2, vec![]), node("A1b", 2, vec![])]),
                    node("A2", 1, vec![]),
                ],
            ),
            node("B", 0, vec![node("B1", 1, vec![])]),
            node("C", 0, vec![]),
        ];
        let flat = flatten(&tree);
        let titles: Vec<&str> = flat.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "A1", "A1a", "A1b", "A2", "B", "B1", "C"]);
    }

    #[test]
    fn heading_level_is_depth_plus_one() {
        let tree = vec![node("A", 0, vec![node("B", 1, vec![node("C", 2, vec![])])])];
        for e in flatten(&tree) {
            assert_eq!(e.heading_level, e.depth + 1);
        }
        assert_eq!(flatten(&tree)[2].heading_level, 3);
    }

    #[test]
    fn depth_gap_is_kept() {
        // a promoted orphan keeps its original depth under a depth-0 parent
        let tree = vec![node("Top", 0, vec![node("Orphan", 2, vec![])])];
        let flat = flatten(&tree);
        assert_eq!(flat[1].depth, 2);
        assert_eq!(flat[1].heading_level, 3);
    }

    #[test]
    fn entries_start_unresolved() {
        let flat = flatten(&[node("About", 0, vec![])]);
        let e = &flat[0];
        assert_eq!(e.slug, "about");
        assert_eq!(e.url, e.base_url);
        assert_eq!(e.base_url.as_deref(), Some("/sites/acme/about.aspx"));
        assert!(!e.eligible_for_retrieval);
        assert_eq!(e.is_external, Some(false));
    }

    #[test]
    fn duplicate_titles_share_slug() {
        let flat = flatten(&[node("Contact", 0, vec![]), node("Contact", 0, vec![])]);
        assert_eq!(flat[0].slug, flat[1].slug);
    }

    #[test]
    fn empty_tree() {
        assert!(flatten(&[]).is_empty());
    }
}

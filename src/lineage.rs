//! Lineage assignment for drawing the version graph.
//!
//! Each version gets a lineage number (a colour lane in a renderer). A root
//! starts a lineage; the first child of a version continues its parent's
//! lineage and every later sibling opens a new one. This is a presentation
//! helper only and carries no data invariant.

use crate::types::TemplateVersion;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Lineage id per version id.
pub type LineageMap = BTreeMap<String, usize>;

/// Assign lineages by breadth-first traversal from the roots, visiting
/// children in insertion order. Versions whose base is missing are treated
/// as extra roots.
pub fn lineage_map(versions: &[TemplateVersion]) -> LineageMap {
    let known: HashSet<&str> = versions.iter().map(|v| v.id.as_str()).collect();
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut roots: Vec<&str> = Vec::new();

    for v in versions {
        match v.base_version.as_deref() {
            Some(base) if known.contains(base) && base != v.id => {
                children.entry(base).or_default().push(v.id.as_str());
            }
            _ => roots.push(v.id.as_str()),
        }
    }

    let mut lineages = LineageMap::new();
    let mut next_lineage = 0usize;
    let mut queue: VecDeque<&str> = VecDeque::new();

    for root in roots {
        lineages.insert(root.to_string(), next_lineage);
        next_lineage += 1;
        queue.push_back(root);

        while let Some(current) = queue.pop_front() {
            let parent_lineage = lineages[current];
            let Some(kids) = children.get(current) else {
                continue;
            };
            for (i, kid) in kids.iter().enumerate() {
                if lineages.contains_key(*kid) {
                    continue;
                }
                let lineage = if i == 0 {
                    parent_lineage
                } else {
                    next_lineage += 1;
                    next_lineage - 1
                };
                lineages.insert(kid.to_string(), lineage);
                queue.push_back(kid);
            }
        }
    }

    lineages
}

/// One row of a rendered version graph.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRow {
    pub version_id: String,
    pub version: String,
    pub base_version: Option<String>,
    pub is_branch: bool,
    pub lineage: usize,
}

/// Versions in insertion order annotated with their lineage.
pub fn graph_rows(versions: &[TemplateVersion]) -> Vec<GraphRow> {
    let lineages = lineage_map(versions);
    versions
        .iter()
        .map(|v| GraphRow {
            version_id: v.id.clone(),
            version: v.version.clone(),
            base_version: v.base_version.clone(),
            is_branch: v.is_branch,
            lineage: lineages.get(&v.id).copied().unwrap_or_default(),
        })
        .collect()
}

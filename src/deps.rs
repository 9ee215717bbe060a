//! Dependency map resolution
//!
//! Traverses the master structure from a root unit (default
//! `default.target`) over the requirement closure and materializes the
//! reachable sub-graph with forward and backward edge lists per node.
//! Ordering edges never pull a unit in on their own; `Conflicts` edges are
//! recorded but not followed; masked units become leaves. Cycles are
//! preserved, the visited set guarantees termination.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::master::{MasterStruct, Meta, Relation, RelationKind};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("root unit '{0}' not found in master structure")]
    RootNotFound(String),
}

/// The first edge by which a node was discovered; useful for tree views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachedVia {
    pub parent: String,
    pub kind: RelationKind,
}

/// One node of the dependency map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepNode {
    /// Edges this unit declares towards other reached units (plus
    /// `Conflicts` edges, which are kept even when their target is not
    /// part of the map).
    pub forward: Vec<Relation>,
    /// Reverse relations from other reached units.
    pub backward: Vec<Relation>,
    pub masked: bool,
    pub not_found: bool,
    pub depth: u32,
    pub reached_via: Option<ReachedVia>,
}

/// The dependency map: the sub-model of the master structure reachable
/// from `root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepMap {
    pub root: String,
    pub depth_limit: Option<u32>,
    pub nodes: BTreeMap<String, DepNode>,
    pub meta: Meta,
}

impl DepMap {
    /// Resolve the dependency map rooted at `root`, optionally bounded to
    /// `depth_limit` expansion steps.
    pub fn resolve(
        ms: &MasterStruct,
        root: &str,
        depth_limit: Option<u32>,
    ) -> Result<Self, ResolveError> {
        let canonical = ms
            .resolve_name(root)
            .ok_or_else(|| ResolveError::RootNotFound(root.to_string()))?
            .to_string();
        log::info!("resolving dependency map from {}", canonical);

        let mut nodes: BTreeMap<String, DepNode> = BTreeMap::new();
        let mut cycles: Vec<String> = Vec::new();
        let mut queue: VecDeque<(String, u32)> = VecDeque::new();

        let root_record = ms.units.get(&canonical);
        nodes.insert(
            canonical.clone(),
            DepNode {
                masked: root_record.map_or(false, |r| r.masked),
                not_found: root_record.map_or(true, |r| r.not_found),
                depth: 0,
                reached_via: None,
                ..DepNode::default()
            },
        );
        queue.push_back((canonical.clone(), 0));

        while let Some((name, depth)) = queue.pop_front() {
            let Some(record) = ms.units.get(&name) else {
                continue;
            };
            // Masked units enter the map but are never expanded.
            if record.masked {
                continue;
            }
            if depth_limit.map_or(false, |limit| depth >= limit) {
                continue;
            }

            for relation in &record.relations {
                if !relation.kind.in_closure() {
                    continue;
                }
                if nodes.contains_key(&relation.target) {
                    if is_ancestor(&nodes, &name, &relation.target) {
                        let note = format!("CycleRecorded: {} -> {}", name, relation.target);
                        log::debug!("{}", note);
                        cycles.push(note);
                    }
                    continue;
                }

                let target_record = ms.units.get(&relation.target);
                nodes.insert(
                    relation.target.clone(),
                    DepNode {
                        masked: target_record.map_or(false, |r| r.masked),
                        not_found: target_record.map_or(true, |r| r.not_found),
                        depth: depth + 1,
                        reached_via: Some(ReachedVia {
                            parent: name.clone(),
                            kind: relation.kind,
                        }),
                        ..DepNode::default()
                    },
                );
                queue.push_back((relation.target.clone(), depth + 1));
            }
        }

        // Second pass: attach edges, restricted to the reached set. A
        // masked unit keeps its incoming edges but contributes none.
        let mut edges: Vec<(String, Vec<Relation>, Vec<Relation>)> = Vec::new();
        for name in nodes.keys() {
            let Some(record) = ms.units.get(name) else {
                continue;
            };
            let mut forward = Vec::new();
            let mut backward = Vec::new();
            for relation in &record.relations {
                if relation.kind.is_forward() {
                    if record.masked {
                        continue;
                    }
                    if relation.kind.is_negative() || nodes.contains_key(&relation.target) {
                        forward.push(relation.clone());
                    }
                } else if nodes.contains_key(&relation.target) {
                    backward.push(relation.clone());
                }
            }
            edges.push((name.clone(), forward, backward));
        }
        for (name, forward, backward) in edges {
            if let Some(node) = nodes.get_mut(&name) {
                node.forward = forward;
                node.backward = backward;
            }
        }

        let mut meta = Meta::now(ms.meta.root_path.clone());
        meta.warnings = cycles;

        Ok(Self {
            root: canonical,
            depth_limit,
            nodes,
            meta,
        })
    }
}

/// Walk the provenance chain of `from` looking for `candidate`.
fn is_ancestor(nodes: &BTreeMap<String, DepNode>, from: &str, candidate: &str) -> bool {
    let mut current = from;
    while let Some(via) = nodes.get(current).and_then(|n| n.reached_via.as_ref()) {
        if via.parent == candidate {
            return true;
        }
        current = &via.parent;
    }
    false
}

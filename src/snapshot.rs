//! Store snapshot for the persistence boundary
//!
//! The hierarchical container format itself lives outside this crate; what
//! is pinned down here is the walk contract: the store is traversed
//! depth-first, every leaf with non-empty samples becomes a dataset entry,
//! and every other node (structural group, empty-valued leaf) becomes a
//! group entry carrying its children. Attributes, including
//! `sample_period`, round-trip unchanged.

use serde::{Deserialize, Serialize};

use crate::series::{AttrMap, Series};
use crate::store::{Node, NodeId, Store};

/// One node of a serialized store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SnapshotNode {
    /// A node written as a dataset: non-empty samples plus attributes
    Dataset {
        /// Display name
        name: String,
        /// Sample values
        samples: Vec<f64>,
        /// Attribute bag, round-tripped unchanged
        attrs: AttrMap,
    },
    /// A structural node, or one whose payload is empty
    Group {
        /// Display name
        name: String,
        /// Attribute bag of an empty-payload series, if the node had one
        attrs: Option<AttrMap>,
        /// Child nodes in tree order
        children: Vec<SnapshotNode>,
    },
}

impl SnapshotNode {
    /// Display name of this entry
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Dataset { name, .. } | Self::Group { name, .. } => name,
        }
    }
}

/// Walk the store depth-first and produce one snapshot tree per root
#[must_use]
pub fn snapshot(store: &Store) -> Vec<SnapshotNode> {
    store
        .roots()
        .iter()
        .map(|&root| snapshot_node(store, root))
        .collect()
}

fn snapshot_node(store: &Store, id: NodeId) -> SnapshotNode {
    let node = store.node(id);
    match node.series() {
        Some(series) if !series.is_empty() => SnapshotNode::Dataset {
            name: node.display_name().to_owned(),
            samples: series.samples().to_vec(),
            attrs: series.attrs().clone(),
        },
        series => SnapshotNode::Group {
            name: node.display_name().to_owned(),
            attrs: series.map(|s| s.attrs().clone()),
            children: node
                .children()
                .iter()
                .map(|&child| snapshot_node(store, child))
                .collect(),
        },
    }
}

/// Rebuild a store from snapshot trees. Names are re-inserted through the
/// normal uniqueness-enforcing path, so a well-formed snapshot restores to
/// identical display names.
#[must_use]
pub fn restore(roots: &[SnapshotNode]) -> Store {
    let mut store = Store::new();
    for root in roots {
        let id = store.add_root(Node::group(root.name()));
        restore_into(&mut store, id, root);
    }
    store
}

fn restore_into(store: &mut Store, id: NodeId, snap: &SnapshotNode) {
    match snap {
        SnapshotNode::Dataset {
            name,
            samples,
            attrs,
        } => {
            let mut series = Series::empty(name.clone());
            series.set_samples(samples.clone());
            *series.attrs_mut() = attrs.clone();
            store.set_series(id, series);
        }
        SnapshotNode::Group {
            name,
            attrs,
            children,
        } => {
            if let Some(attrs) = attrs {
                let mut series = Series::empty(name.clone());
                *series.attrs_mut() = attrs.clone();
                store.set_series(id, series);
            }
            for child in children {
                let child_id = store.add_child(id, Node::group(child.name()));
                restore_into(store, child_id, child);
            }
        }
    }
}

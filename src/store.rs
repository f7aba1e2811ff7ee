//! Hierarchical item store
//!
//! An arena-based forest of named nodes, each optionally holding a
//! [`Series`]. The store owns every node; parent links are plain ids, so
//! there is no ownership cycle. Sibling display names are kept unique on
//! every insertion path by suffixing `_1`, `_2`, ... on collision, which
//! makes first-match path lookup safe by construction.
//!
//! A flat, append-only leaf list supports index-based retrieval for
//! save/restore: a node's `store_index` stays stable for the life of the
//! session, including across removals (removed slots are tombstoned).

use tracing::debug;

use crate::series::Series;
use crate::{Error, Result};

/// Handle to a node owned by a [`Store`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Tree element: display name, children, optional series payload
#[derive(Debug)]
pub struct Node {
    display_name: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    series: Option<Series>,
    store_index: Option<usize>,
}

impl Node {
    /// A structural node with no series payload
    #[must_use]
    pub fn group(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            children: Vec::new(),
            parent: None,
            series: None,
            store_index: None,
        }
    }

    /// A node carrying a series, named after it
    #[must_use]
    pub fn leaf(series: Series) -> Self {
        Self {
            display_name: series.name().to_owned(),
            children: Vec::new(),
            parent: None,
            series: Some(series),
            store_index: None,
        }
    }

    /// Display name (unique among siblings)
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Child ids in insertion order
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Parent id, `None` for roots
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Series payload, if any
    #[must_use]
    pub fn series(&self) -> Option<&Series> {
        self.series.as_ref()
    }

    /// Mutable series payload, if any
    pub fn series_mut(&mut self) -> Option<&mut Series> {
        self.series.as_mut()
    }

    /// Position in the flat leaf allocation list, if registered
    #[must_use]
    pub fn store_index(&self) -> Option<usize> {
        self.store_index
    }
}

/// Forest of nodes with a flat leaf list
#[derive(Debug, Default)]
pub struct Store {
    nodes: Vec<Option<Node>>,
    roots: Vec<NodeId>,
    leaves: Vec<Option<NodeId>>,
}

impl Store {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow a node.
    ///
    /// # Panics
    /// Panics if `id` refers to a removed node. Ids handed out by this
    /// store stay valid until the subtree they belong to is removed.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.0].as_ref().expect("stale node id")
    }

    /// Mutably borrow a node.
    ///
    /// # Panics
    /// Panics if `id` refers to a removed node.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.0].as_mut().expect("stale node id")
    }

    /// Root ids in insertion order
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Number of slots in the flat leaf list (including tombstones)
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Leaf id at `store_index`, `None` if that leaf was removed
    #[must_use]
    pub fn leaf(&self, store_index: usize) -> Option<NodeId> {
        self.leaves.get(store_index).copied().flatten()
    }

    /// Insert a node as a new root, renaming on collision with existing
    /// root names.
    pub fn add_root(&mut self, node: Node) -> NodeId {
        let unique = self.unique_name(&self.roots, node.display_name());
        let id = self.alloc(node, unique, None);
        self.roots.push(id);
        id
    }

    /// Insert `node` as the last child of `parent`, renaming on collision
    /// so the display name is unique among the parent's current children.
    /// If the node carries a series it is appended to the flat leaf list.
    ///
    /// # Panics
    /// Panics if `parent` is stale.
    pub fn add_child(&mut self, parent: NodeId, node: Node) -> NodeId {
        let unique = self.unique_name(self.node(parent).children(), node.display_name());
        let id = self.alloc(node, unique, Some(parent));
        self.node_mut(parent).children.push(id);
        id
    }

    /// Attach a series to an existing node, registering it in the flat
    /// leaf list on first assignment. Re-runs of the same producer replace
    /// the payload in place and keep the original `store_index`.
    pub fn set_series(&mut self, id: NodeId, series: Series) {
        if self.node(id).store_index.is_none() {
            let store_index = self.leaves.len();
            self.leaves.push(Some(id));
            self.node_mut(id).store_index = Some(store_index);
        }
        self.node_mut(id).series = Some(series);
    }

    /// Direct lookup among a parent's immediate children. Absence is a
    /// normal outcome (e.g. probing whether a derived group already
    /// exists), so the return is an `Option`, not an error.
    #[must_use]
    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).display_name() == name)
    }

    /// Descend from `parent` matching each path segment to a child's
    /// display name at that depth.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] with the joined path on the first
    /// segment that fails to match.
    pub fn find_by_path(&self, parent: NodeId, path: &[&str]) -> Result<NodeId> {
        let mut current = parent;
        for segment in path {
            current = self
                .find_child(current, segment)
                .ok_or_else(|| Error::not_found(path))?;
        }
        Ok(current)
    }

    /// Resolve an absolute path: the first segment names a root, the rest
    /// descend as in [`Store::find_by_path`].
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if no root matches or descent fails.
    pub fn resolve(&self, path: &[&str]) -> Result<NodeId> {
        let (first, rest) = path.split_first().ok_or_else(|| Error::not_found(path))?;
        let root = self
            .roots
            .iter()
            .copied()
            .find(|&r| self.node(r).display_name() == *first)
            .ok_or_else(|| Error::not_found(path))?;
        self.find_by_path(root, rest)
            .map_err(|_| Error::not_found(path))
    }

    /// Remove the child named `name` and drop its whole subtree. Leaf-list
    /// slots of removed nodes are tombstoned so surviving `store_index`
    /// values stay stable.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if `parent` has no such child.
    pub fn remove_child(&mut self, parent: NodeId, name: &str) -> Result<()> {
        let child = self.find_child(parent, name).ok_or_else(|| Error::NotFound {
            path: format!("{}/{name}", self.path_of(parent)),
        })?;
        self.node_mut(parent).children.retain(|&c| c != child);
        self.drop_subtree(child);
        Ok(())
    }

    /// Root-to-node display-name path, slash-joined. Used for error
    /// context in user-visible failures.
    #[must_use]
    pub fn path_of(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(c) = current {
            let node = self.node(c);
            segments.push(node.display_name().to_owned());
            current = node.parent();
        }
        segments.reverse();
        segments.join("/")
    }

    fn alloc(&mut self, mut node: Node, unique_name: String, parent: Option<NodeId>) -> NodeId {
        node.display_name = unique_name;
        node.parent = parent;
        if node.series.is_some() {
            node.store_index = Some(self.leaves.len());
        }
        let id = NodeId(self.nodes.len());
        if node.store_index.is_some() {
            self.leaves.push(Some(id));
        }
        self.nodes.push(Some(node));
        id
    }

    fn unique_name(&self, siblings: &[NodeId], base: &str) -> String {
        let taken = |candidate: &str| {
            siblings
                .iter()
                .any(|&c| self.node(c).display_name() == candidate)
        };
        if !taken(base) {
            return base.to_owned();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{base}_{n}");
            if !taken(&candidate) {
                debug!(name = base, renamed = %candidate, "name collision resolved");
                return candidate;
            }
            n += 1;
        }
    }

    fn drop_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes[current.0].take() {
                if let Some(store_index) = node.store_index {
                    self.leaves[store_index] = None;
                }
                stack.extend(node.children);
            }
        }
    }
}

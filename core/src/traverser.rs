//! The leaf-range traverser: the central algorithm of this crate.
//!
//! Grounded on `LeafTraverser` and `DataTree::_traverseLeaves` /
//! `getOrCreateChildren` / `addChildTo` from the original implementation.
//! Visits every leaf index in `[begin, end)` exactly once, growing the
//! tree (deepening the root, extending the right spine, materializing
//! zero-filled gap leaves) as needed, and invokes three callbacks along
//! the way:
//!
//! - `on_existing(index, is_right_border, leaf)` for a leaf that already
//!   existed before this call,
//! - `on_create(index) -> bytes` for a leaf that must be created to reach
//!   `end`, inside the requested `[begin, end)` range,
//! - `on_backtrack(inner)` once per inner node after all of its children
//!   in range have been visited.
//!
//! Leaves strictly before `begin` that must nonetheless be created to keep
//! the tree left-maximal are filled with `maxBytesPerLeaf` zero bytes and
//! never reach `on_create`.

use crate::block_store::BlockStore;
use crate::depth::{ceil_division, max_leaves_at_depth, min_depth_for_leaf_count};
use crate::error::{Error, Result};
use crate::ids::BlockId;
use crate::node::{InnerNode, LeafNode, Node};
use crate::node_store::NodeStore;

pub(crate) type OnExisting<'a> = dyn FnMut(u64, bool, &mut LeafNode) -> Result<()> + 'a;
pub(crate) type OnCreate<'a> = dyn FnMut(u64) -> Result<Vec<u8>> + 'a;
pub(crate) type OnBacktrack<'a> = dyn FnMut(&InnerNode) -> Result<()> + 'a;

pub(crate) struct Traverser<'s, S: BlockStore> {
    nodes: &'s NodeStore<S>,
    read_only: bool,
}

impl<'s, S: BlockStore> Traverser<'s, S> {
    pub fn new(nodes: &'s NodeStore<S>, read_only: bool) -> Self {
        Self { nodes, read_only }
    }

    fn max_children(&self) -> u64 {
        self.nodes.layout().max_children_per_inner_node()
    }

    fn max_bytes_per_leaf(&self) -> u64 {
        self.nodes.layout().max_bytes_per_leaf()
    }

    /// Runs a full traversal of `[begin, end)` starting from `root`,
    /// returning the (possibly replaced) new root.
    pub fn traverse(
        &self,
        mut root: Node,
        begin: u64,
        end: u64,
        on_existing: &mut OnExisting<'_>,
        on_create: &mut OnCreate<'_>,
        on_backtrack: &mut OnBacktrack<'_>,
    ) -> Result<Node> {
        assert!(begin <= end, "begin {begin} must not exceed end {end}");

        let needed_depth = min_depth_for_leaf_count(self.max_children(), end);
        while (root.depth() as u64) < needed_depth as u64 {
            if self.read_only {
                return Err(Error::InvariantViolation(
                    "read-only traversal required growing the tree".into(),
                ));
            }
            root = self.increase_tree_depth(root)?;
        }

        if begin == end {
            return Ok(root);
        }

        let num_leaves = self.count_leaves(&root)?;
        if end > num_leaves {
            if self.read_only {
                return Err(Error::InvariantViolation(
                    "read-only traversal required creating new leaves".into(),
                ));
            }
            self.grow_rightmost_leaf_to_capacity(root.id())?;
        }

        let new_root = self.visit(root, 0, begin, end, on_existing, on_create, on_backtrack)?;
        self.canonicalize(new_root)
    }

    /// The number of leaves currently reachable from `node`, using the
    /// left-maximal invariant: every child but the last is a full subtree.
    pub fn count_leaves(&self, node: &Node) -> Result<u64> {
        match node {
            Node::Leaf(_) => Ok(1),
            Node::Inner(inner) => {
                let num_children = inner.num_children() as u64;
                if num_children == 0 {
                    return Err(Error::InvariantViolation(format!(
                        "inner node {} has no children",
                        inner.id()
                    )));
                }
                let leaves_per_full_child = max_leaves_at_depth(self.max_children(), inner.depth() - 1);
                let last_child_id = inner.read_last_child()?;
                let last_child = self
                    .nodes
                    .load(last_child_id)?
                    .ok_or(Error::NotFound(last_child_id))?;
                Ok((num_children - 1) * leaves_per_full_child + self.count_leaves(&last_child)?)
            }
        }
    }

    fn increase_tree_depth(&self, root: Node) -> Result<Node> {
        let root_id = root.id();
        let old_depth = root.depth();
        let clone = self.nodes.copy_to_new(&root)?;
        let temp_inner_id = self.nodes.create_inner(old_depth + 1, &[clone.id()])?.id();
        // The temporary inner node's own block is freed once its contents
        // have been copied onto `root_id`; the original `root` block now
        // holds what used to be at `temp_inner_id`.
        let temp_inner = self.nodes.load(temp_inner_id)?.ok_or(Error::NotFound(temp_inner_id))?;
        let new_root = self.nodes.overwrite(root_id, &temp_inner)?;
        self.nodes.remove(temp_inner)?;
        log::debug!("grew tree rooted at {root_id} from depth {old_depth} to {}", old_depth + 1);
        Ok(new_root)
    }

    /// Walks the rightmost-child chain from `id` down to the current last
    /// leaf and, if it is not already full, resizes it to `maxBytesPerLeaf`
    /// with zero padding. Must run before any leaf is appended after it, to
    /// preserve the left-maximal invariant.
    fn grow_rightmost_leaf_to_capacity(&self, id: BlockId) -> Result<()> {
        let node = self.nodes.load(id)?.ok_or(Error::NotFound(id))?;
        match node {
            Node::Leaf(mut leaf) => {
                let max = self.max_bytes_per_leaf() as u32;
                if leaf.num_bytes() < max {
                    leaf.resize(max)?;
                    self.nodes.overwrite(id, &Node::Leaf(leaf))?;
                }
                Ok(())
            }
            Node::Inner(inner) => {
                let last = inner.read_last_child()?;
                self.grow_rightmost_leaf_to_capacity(last)
            }
        }
    }

    /// Visits `node`, which covers absolute leaf indices
    /// `[node_offset, node_offset + capacity)`, against the traversal's
    /// global `[begin, end)`. `node` must already overlap that range.
    fn visit(
        &self,
        node: Node,
        node_offset: u64,
        begin: u64,
        end: u64,
        on_existing: &mut OnExisting<'_>,
        on_create: &mut OnCreate<'_>,
        on_backtrack: &mut OnBacktrack<'_>,
    ) -> Result<Node> {
        match node {
            Node::Leaf(mut leaf) => {
                debug_assert!(node_offset >= begin && node_offset < end);
                on_existing(node_offset, node_offset == end - 1, &mut leaf)?;
                if self.read_only {
                    Ok(Node::Leaf(leaf))
                } else {
                    self.nodes.overwrite(leaf.id(), &Node::Leaf(leaf))
                }
            }
            Node::Inner(mut inner) => {
                let depth = inner.depth();
                let leaves_per_child = max_leaves_at_depth(self.max_children(), depth - 1);
                let num_children = inner.num_children() as u64;

                let first_child = if begin > node_offset {
                    (begin - node_offset) / leaves_per_child
                } else {
                    0
                };
                let end_rel = end.saturating_sub(node_offset);
                let last_child = ceil_division(end_rel, leaves_per_child).min(self.max_children());

                if self.read_only && last_child > num_children {
                    return Err(Error::InvariantViolation(
                        "read-only traversal required creating new children".into(),
                    ));
                }

                for i in first_child..last_child.min(num_children) {
                    let child_abs = node_offset + i * leaves_per_child;
                    let child_id = inner.read_child(i as u32)?;
                    let child = self.nodes.load(child_id)?.ok_or(Error::NotFound(child_id))?;
                    // Ids never change on update (same block is overwritten
                    // in place), so no pointer fix-up is needed here.
                    self.visit(child, child_abs, begin, end, on_existing, on_create, on_backtrack)?;
                }

                for i in num_children..last_child {
                    let child_abs = node_offset + i * leaves_per_child;
                    let child = if child_abs + leaves_per_child <= begin {
                        self.create_zero_subtree(depth - 1)?
                    } else {
                        self.create_subtree(child_abs, begin, end, depth - 1, on_create, on_backtrack)?
                    };
                    inner.add_child(child.id())?;
                }

                on_backtrack(&inner)?;
                if self.read_only {
                    Ok(Node::Inner(inner))
                } else {
                    self.nodes.overwrite(inner.id(), &Node::Inner(inner))
                }
            }
        }
    }

    /// Builds a brand-new subtree of the given `depth` rooted at absolute
    /// offset `abs_offset`, mixing zero-filled gap leaves (for indices
    /// before `begin`) with `on_create`-sourced leaves (for indices in
    /// `[begin, end)`). Only called when this subtree's range overlaps
    /// `[begin, end)`.
    fn create_subtree(
        &self,
        abs_offset: u64,
        begin: u64,
        end: u64,
        depth: u8,
        on_create: &mut OnCreate<'_>,
        on_backtrack: &mut OnBacktrack<'_>,
    ) -> Result<Node> {
        if depth == 0 {
            let bytes = on_create(abs_offset)?;
            if bytes.len() as u64 > self.max_bytes_per_leaf() {
                return Err(Error::OutOfBounds {
                    offset: abs_offset,
                    count: bytes.len() as u64,
                    size: self.max_bytes_per_leaf(),
                });
            }
            Ok(Node::Leaf(self.nodes.create_leaf(&bytes)?))
        } else {
            let leaves_per_child = max_leaves_at_depth(self.max_children(), depth - 1);
            let needed = ceil_division((end - abs_offset).max(1), leaves_per_child)
                .max(1)
                .min(self.max_children());
            let mut children = Vec::with_capacity(needed as usize);
            for i in 0..needed {
                let child_abs = abs_offset + i * leaves_per_child;
                let child = if child_abs + leaves_per_child <= begin {
                    self.create_zero_subtree(depth - 1)?
                } else {
                    self.create_subtree(child_abs, begin, end, depth - 1, on_create, on_backtrack)?
                };
                children.push(child.id());
            }
            let inner = self.nodes.create_inner(depth, &children)?;
            on_backtrack(&inner)?;
            Ok(Node::Inner(inner))
        }
    }

    /// Builds a brand-new, fully zero-filled, maximum-size subtree of the
    /// given `depth`. Used for gap children entirely before `begin`; never
    /// invokes `on_create` or `on_backtrack`.
    fn create_zero_subtree(&self, depth: u8) -> Result<Node> {
        if depth == 0 {
            let zeros = vec![0u8; self.max_bytes_per_leaf() as usize];
            Ok(Node::Leaf(self.nodes.create_leaf(&zeros)?))
        } else {
            let n = self.max_children();
            let mut children = Vec::with_capacity(n as usize);
            for _ in 0..n {
                children.push(self.create_zero_subtree(depth - 1)?.id());
            }
            Ok(Node::Inner(self.nodes.create_inner(depth, &children)?))
        }
    }

    /// Collapses a root chain of single-child inner nodes, preserving the
    /// root's identifier throughout.
    pub(crate) fn canonicalize(&self, mut root: Node) -> Result<Node> {
        loop {
            let should_collapse = matches!(&root, Node::Inner(inner) if inner.num_children() == 1);
            if !should_collapse {
                break;
            }
            let Node::Inner(inner) = &root else {
                unreachable!()
            };
            let child_id = inner.read_child(0)?;
            let child = self.nodes.load(child_id)?.ok_or(Error::NotFound(child_id))?;
            let root_id = root.id();
            let old_depth = root.depth();
            let new_root = self.nodes.overwrite(root_id, &child)?;
            self.nodes.remove(child)?;
            log::debug!("shrunk tree rooted at {root_id} from depth {old_depth} to {}", new_root.depth());
            root = new_root;
        }
        Ok(root)
    }
}

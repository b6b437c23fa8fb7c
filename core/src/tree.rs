use std::sync::Arc;

use parking_lot::RwLock;

use crate::block_store::BlockStore;
use crate::error::{Error, Result};
use crate::ids::BlockId;
use crate::node::{InnerNode, LeafNode, Node};
use crate::node_store::NodeStore;
use crate::traverser::Traverser;

/// A balanced tree of fixed-size blocks backing one blob.
///
/// The tree's identifier ([`Tree::id`]) is its root block's id, which never
/// changes across grow or shrink: both operations overwrite the root block
/// in place rather than replacing it. Structural operations (`resize`,
/// `traverse_leaves`) take the tree's writer lock; observe-only operations
/// (`num_leaves`, `num_stored_bytes`, a read-only traversal) take the
/// reader lock. Per the concurrency design note, every write path takes
/// the writer lock even when a particular call turns out not to mutate
/// anything.
pub struct Tree<S: BlockStore> {
    id: BlockId,
    nodes: Arc<NodeStore<S>>,
    lock: RwLock<()>,
}

impl<S: BlockStore> Tree<S> {
    pub(crate) fn new(id: BlockId, nodes: Arc<NodeStore<S>>) -> Self {
        Self {
            id,
            nodes,
            lock: RwLock::new(()),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn max_bytes_per_leaf(&self) -> u64 {
        self.nodes.layout().max_bytes_per_leaf()
    }

    fn load_root(&self) -> Result<Node> {
        self.nodes.load(self.id)?.ok_or(Error::NotFound(self.id))
    }

    pub fn num_leaves(&self) -> Result<u64> {
        let _guard = self.lock.read();
        let root = self.load_root()?;
        Traverser::new(&self.nodes, true).count_leaves(&root)
    }

    pub fn num_stored_bytes(&self) -> Result<u64> {
        let _guard = self.lock.read();
        let root = self.load_root()?;
        self.num_stored_bytes_of(&root)
    }

    fn num_stored_bytes_of(&self, node: &Node) -> Result<u64> {
        match node {
            Node::Leaf(leaf) => Ok(leaf.num_bytes() as u64),
            Node::Inner(inner) => {
                let num_children = inner.num_children() as u64;
                if num_children == 0 {
                    return Err(Error::InvariantViolation(format!(
                        "inner node {} has no children",
                        inner.id()
                    )));
                }
                let max_children = self.nodes.layout().max_children_per_inner_node();
                let leaves_per_full_child =
                    crate::depth::max_leaves_at_depth(max_children, inner.depth() - 1);
                let bytes_per_full_child = leaves_per_full_child * self.max_bytes_per_leaf();
                let last_child_id = inner.read_last_child()?;
                let last_child = self
                    .nodes
                    .load(last_child_id)?
                    .ok_or(Error::NotFound(last_child_id))?;
                Ok((num_children - 1) * bytes_per_full_child + self.num_stored_bytes_of(&last_child)?)
            }
        }
    }

    /// Number of blocks (leaves and inner nodes) making up this tree.
    pub fn num_nodes(&self) -> Result<u64> {
        let _guard = self.lock.read();
        let root = self.load_root()?;
        self.num_nodes_of(&root)
    }

    fn num_nodes_of(&self, node: &Node) -> Result<u64> {
        match node {
            Node::Leaf(_) => Ok(1),
            Node::Inner(inner) => {
                let mut total = 1u64;
                for child_id in inner.children() {
                    let child = self.nodes.load(child_id)?.ok_or(Error::NotFound(child_id))?;
                    total += self.num_nodes_of(&child)?;
                }
                Ok(total)
            }
        }
    }

    /// Resizes the tree to hold exactly `new_num_bytes` bytes. Shrinking
    /// truncates and frees right-spine subtrees; growing creates
    /// zero-filled leaves up to `new_num_bytes - 1` and then resizes the
    /// new trailing leaf to its exact size.
    pub fn resize(&self, new_num_bytes: u64) -> Result<()> {
        let _guard = self.lock.write();
        let root = self.load_root()?;
        let current = self.num_stored_bytes_of(&root)?;
        if new_num_bytes == current {
            return Ok(());
        }
        let max_bytes_per_leaf = self.max_bytes_per_leaf();
        let new_num_leaves = (new_num_bytes / max_bytes_per_leaf
            + if new_num_bytes % max_bytes_per_leaf != 0 { 1 } else { 0 })
        .max(1);
        let new_root = if new_num_bytes > current {
            self.grow(root, new_num_leaves, new_num_bytes)?
        } else {
            self.shrink(root, new_num_leaves, new_num_bytes)?
        };
        drop(new_root);
        Ok(())
    }

    fn grow(&self, root: Node, new_num_leaves: u64, new_num_bytes: u64) -> Result<Node> {
        let current_num_leaves = Traverser::new(&self.nodes, true).count_leaves(&root)?;
        let traverser = Traverser::new(&self.nodes, false);
        let mut on_existing = |_index: u64, _is_right_border: bool, _leaf: &mut LeafNode| Ok(());
        let mut on_create = |_index: u64| Ok(vec![0u8; self.max_bytes_per_leaf() as usize]);
        let mut on_backtrack = |_inner: &InnerNode| Ok(());
        let new_root = traverser.traverse(
            root,
            current_num_leaves.saturating_sub(1),
            new_num_leaves,
            &mut on_existing,
            &mut on_create,
            &mut on_backtrack,
        )?;
        self.resize_last_leaf(&new_root, new_num_bytes)?;
        Ok(new_root)
    }

    fn shrink(&self, root: Node, new_num_leaves: u64, new_num_bytes: u64) -> Result<Node> {
        let new_root = self.remove_leaves_after(root, new_num_leaves)?;
        self.resize_last_leaf(&new_root, new_num_bytes)?;
        Ok(new_root)
    }

    /// Removes leaves `[new_num_leaves, old_num_leaves)` from the right
    /// spine, freeing their subtrees, then canonicalizes the root.
    fn remove_leaves_after(&self, root: Node, new_num_leaves: u64) -> Result<Node> {
        let new_root = self.shrink_node(root, new_num_leaves)?;
        Traverser::new(&self.nodes, false).canonicalize(new_root)
    }

    fn shrink_node(&self, node: Node, keep_leaves: u64) -> Result<Node> {
        match node {
            Node::Leaf(leaf) => {
                debug_assert!(keep_leaves >= 1);
                Ok(Node::Leaf(leaf))
            }
            Node::Inner(mut inner) => {
                let max_children = self.nodes.layout().max_children_per_inner_node();
                let leaves_per_full_child =
                    crate::depth::max_leaves_at_depth(max_children, inner.depth() - 1);
                let keep_children = crate::depth::ceil_division(keep_leaves, leaves_per_full_child)
                    .max(1)
                    .min(inner.num_children() as u64);
                while inner.num_children() as u64 > keep_children {
                    let removed = inner.remove_last_child()?;
                    let removed_node = self.nodes.load(removed)?.ok_or(Error::NotFound(removed))?;
                    self.nodes.remove_subtree(removed_node)?;
                }
                let last_index = inner.num_children() - 1;
                let last_child_id = inner.read_child(last_index)?;
                let kept_in_last = keep_leaves - (keep_children - 1) * leaves_per_full_child;
                let last_child = self
                    .nodes
                    .load(last_child_id)?
                    .ok_or(Error::NotFound(last_child_id))?;
                self.shrink_node(last_child, kept_in_last)?;
                self.nodes.overwrite(inner.id(), &Node::Inner(inner))
            }
        }
    }

    fn resize_last_leaf(&self, root: &Node, new_num_bytes: u64) -> Result<()> {
        let max_bytes_per_leaf = self.max_bytes_per_leaf();
        let full_leaves = new_num_bytes / max_bytes_per_leaf;
        let remainder = new_num_bytes % max_bytes_per_leaf;
        let last_leaf_size = if remainder == 0 && new_num_bytes > 0 {
            max_bytes_per_leaf
        } else {
            remainder
        };
        let last_leaf_index = if remainder == 0 && new_num_bytes > 0 {
            full_leaves - 1
        } else {
            full_leaves
        };
        self.resize_leaf_at(root, 0, last_leaf_index, last_leaf_size as u32)
    }

    fn resize_leaf_at(&self, node: &Node, node_offset: u64, target_index: u64, new_size: u32) -> Result<()> {
        match node {
            Node::Leaf(_) => {
                debug_assert_eq!(node_offset, target_index);
                let leaf = self.nodes.load(node.id())?.ok_or(Error::NotFound(node.id()))?;
                if let Node::Leaf(mut leaf) = leaf {
                    if leaf.num_bytes() != new_size {
                        leaf.resize(new_size)?;
                        self.nodes.overwrite(leaf.id(), &Node::Leaf(leaf))?;
                    }
                }
                Ok(())
            }
            Node::Inner(inner) => {
                let max_children = self.nodes.layout().max_children_per_inner_node();
                let leaves_per_child = crate::depth::max_leaves_at_depth(max_children, inner.depth() - 1);
                let rel = target_index - node_offset;
                let child_index = (rel / leaves_per_child) as u32;
                let child_offset = node_offset + child_index as u64 * leaves_per_child;
                let child_id = inner.read_child(child_index)?;
                let child = self.nodes.load(child_id)?.ok_or(Error::NotFound(child_id))?;
                self.resize_leaf_at(&child, child_offset, target_index, new_size)
            }
        }
    }

    /// Visits `[begin, end)`, growing and mutating the tree as needed.
    /// Always takes the writer lock.
    pub fn traverse_leaves(
        &self,
        begin: u64,
        end: u64,
        on_existing: &mut (dyn FnMut(u64, bool, &mut LeafNode) -> Result<()> + '_),
        on_create: &mut (dyn FnMut(u64) -> Result<Vec<u8>> + '_),
        on_backtrack: &mut (dyn FnMut(&InnerNode) -> Result<()> + '_),
    ) -> Result<()> {
        let _guard = self.lock.write();
        let root = self.load_root()?;
        Traverser::new(&self.nodes, false)
            .traverse(root, begin, end, on_existing, on_create, on_backtrack)?;
        Ok(())
    }

    /// Visits `[begin, end)` without mutating the tree. `end` must not
    /// exceed the tree's current leaf count.
    pub fn traverse_leaves_read_only(
        &self,
        begin: u64,
        end: u64,
        on_existing: &mut (dyn FnMut(u64, bool, &mut LeafNode) -> Result<()> + '_),
    ) -> Result<()> {
        let _guard = self.lock.read();
        let root = self.load_root()?;
        let mut on_create = |_index: u64| -> Result<Vec<u8>> { unreachable!("read-only traversal") };
        let mut on_backtrack = |_inner: &InnerNode| Ok(());
        Traverser::new(&self.nodes, true).traverse(
            root,
            begin,
            end,
            on_existing,
            &mut on_create,
            &mut on_backtrack,
        )?;
        Ok(())
    }

    /// Everything in this crate is written through immediately, so flush
    /// is a no-op kept for interface symmetry with the node and blob
    /// layers; it is always safe to call repeatedly.
    pub fn flush(&self) -> Result<()> {
        let _guard = self.lock.read();
        Ok(())
    }
}

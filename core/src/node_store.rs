use std::sync::Arc;

use crate::block_store::BlockStore;
use crate::error::{Error, Result};
use crate::ids::BlockId;
use crate::layout::NodeLayout;
use crate::node::{Node, NodeView};

/// Translates between [`Node`]s and the raw bytes a [`BlockStore`] deals in.
///
/// Every node-level operation named in the node layer goes through here:
/// `create_leaf`, `create_inner`, `load`, `overwrite`, `copy_to_new`,
/// `remove`, `remove_subtree`.
pub struct NodeStore<S: BlockStore> {
    store: Arc<S>,
    layout: NodeLayout,
}

impl<S: BlockStore> NodeStore<S> {
    pub fn new(store: Arc<S>) -> Result<Self> {
        let layout = NodeLayout::new(store.block_size_bytes())?;
        Ok(Self { store, layout })
    }

    pub fn layout(&self) -> NodeLayout {
        self.layout
    }

    pub fn block_store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn create_leaf(&self, initial_bytes: &[u8]) -> Result<crate::node::LeafNode> {
        let mut view = NodeView::new_zeroed(self.layout, 0);
        view.data_mut()[..initial_bytes.len()].copy_from_slice(initial_bytes);
        view.set_size(initial_bytes.len() as u32);
        let id = self
            .store
            .create(view.bytes())
            .map_err(|e| Error::BlockStore(e.to_string()))?;
        log::trace!("created leaf {id} ({} bytes)", initial_bytes.len());
        Ok(crate::node::LeafNode::new(id, view))
    }

    pub fn create_inner(&self, depth: u8, children: &[BlockId]) -> Result<crate::node::InnerNode> {
        let view = NodeView::new_zeroed(self.layout, depth);
        let id = self
            .store
            .create(view.bytes())
            .map_err(|e| Error::BlockStore(e.to_string()))?;
        let mut inner = crate::node::InnerNode::new(id, view);
        for child in children {
            inner.add_child(*child)?;
        }
        self.overwrite(id, &Node::Inner(inner))?;
        log::trace!("created inner {id} (depth {depth}, {} children)", children.len());
        let node = self.load(id)?.ok_or(Error::NotFound(id))?;
        match node {
            Node::Inner(inner) => Ok(inner),
            Node::Leaf(_) => unreachable!("just created as inner"),
        }
    }

    pub fn load(&self, id: BlockId) -> Result<Option<Node>> {
        let bytes = self
            .store
            .load(&id)
            .map_err(|e| Error::BlockStore(e.to_string()))?;
        let Some(bytes) = bytes else {
            return Ok(None);
        };
        let view = NodeView::from_bytes(self.layout, bytes)?;
        view.check_supported(id)?;
        log::trace!("loaded {id} (depth {})", view.depth());
        Ok(Some(Node::from_view(id, view)))
    }

    /// Replaces the block at `target_id` with `source`'s header and
    /// payload, returning a fresh [`Node`] with id `target_id`. `source`'s
    /// own block is left untouched; callers that no longer need it must
    /// `remove` it themselves.
    pub fn overwrite(&self, target_id: BlockId, source: &Node) -> Result<Node> {
        self.store
            .overwrite(&target_id, source.view().bytes())
            .map_err(|e| Error::BlockStore(e.to_string()))?;
        log::trace!("overwrote {target_id} (depth {})", source.depth());
        self.load(target_id)?.ok_or(Error::NotFound(target_id))
    }

    /// Creates a brand-new block whose contents are a copy of `source`.
    pub fn copy_to_new(&self, source: &Node) -> Result<Node> {
        let id = self
            .store
            .create(source.view().bytes())
            .map_err(|e| Error::BlockStore(e.to_string()))?;
        log::trace!("copied {} to new block {id}", source.id());
        self.load(id)?.ok_or(Error::NotFound(id))
    }

    /// Frees a single node's block. Does not touch its children, if any;
    /// use [`NodeStore::remove_subtree`] for that.
    pub fn remove(&self, node: Node) -> Result<()> {
        let id = node.id();
        self.store
            .remove(&id)
            .map_err(|e| Error::BlockStore(e.to_string()))?;
        log::trace!("removed {id}");
        Ok(())
    }

    /// Frees a node and, recursively, every block reachable from it.
    pub fn remove_subtree(&self, node: Node) -> Result<()> {
        if let Node::Inner(inner) = &node {
            for child_id in inner.children() {
                if let Some(child) = self.load(child_id)? {
                    self.remove_subtree(child)?;
                }
            }
        }
        self.remove(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryBlockStore;

    fn new_nodes() -> NodeStore<InMemoryBlockStore> {
        NodeStore::new(Arc::new(InMemoryBlockStore::new(40))).unwrap()
    }

    #[test]
    fn create_and_load_leaf_round_trips() {
        let nodes = new_nodes();
        let leaf = nodes.create_leaf(&[1, 2, 3]).unwrap();
        let loaded = nodes.load(leaf.id()).unwrap().unwrap();
        match loaded {
            Node::Leaf(l) => assert_eq!(l.num_bytes(), 3),
            Node::Inner(_) => panic!("expected a leaf"),
        }
    }

    #[test]
    fn create_inner_with_children() {
        let nodes = new_nodes();
        let a = nodes.create_leaf(&[]).unwrap();
        let b = nodes.create_leaf(&[]).unwrap();
        let a_id = a.id();
        let b_id = b.id();
        let inner = nodes.create_inner(1, &[a_id, b_id]).unwrap();
        assert_eq!(inner.num_children(), 2);
        assert_eq!(inner.read_child(0).unwrap(), a_id);
        assert_eq!(inner.read_child(1).unwrap(), b_id);
    }

    #[test]
    fn overwrite_preserves_id() {
        let nodes = new_nodes();
        let leaf = nodes.create_leaf(&[9, 9]).unwrap();
        let id = leaf.id();
        let other = nodes.create_leaf(&[1, 2, 3, 4]).unwrap();
        let overwritten = nodes.overwrite(id, &Node::Leaf(other)).unwrap();
        assert_eq!(overwritten.id(), id);
        match overwritten {
            Node::Leaf(l) => assert_eq!(l.num_bytes(), 4),
            Node::Inner(_) => panic!("expected a leaf"),
        }
    }

    #[test]
    fn copy_to_new_creates_distinct_block() {
        let nodes = new_nodes();
        let leaf = nodes.create_leaf(&[5, 6, 7]).unwrap();
        let original_id = leaf.id();
        let copy = nodes.copy_to_new(&Node::Leaf(leaf)).unwrap();
        assert_ne!(copy.id(), original_id);
        match copy {
            Node::Leaf(l) => assert_eq!(l.num_bytes(), 3),
            Node::Inner(_) => panic!("expected a leaf"),
        }
    }

    #[test]
    fn remove_subtree_frees_every_block() {
        let nodes = new_nodes();
        let a = nodes.create_leaf(&[]).unwrap();
        let a_id = a.id();
        let inner = nodes.create_inner(1, &[a_id]).unwrap();
        let inner_id = inner.id();
        nodes.remove_subtree(Node::Inner(inner)).unwrap();
        assert!(nodes.load(inner_id).unwrap().is_none());
        assert!(nodes.load(a_id).unwrap().is_none());
    }
}

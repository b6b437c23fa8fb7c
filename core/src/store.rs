use std::sync::Arc;

use crate::access::ParallelAccessStore;
use crate::blob::Blob;
use crate::block_store::BlockStore;
use crate::error::{Error, Result};
use crate::ids::BlockId;
use crate::node_store::NodeStore;
use crate::tree::Tree;

/// Owns the node store and the parallel-access coordinator for one
/// `BlockStore`, and exposes the blob-level API the rest of the crate's
/// consumers are expected to use.
///
/// Realized as an explicitly constructed, facade-owned object rather than
/// a process-wide singleton, as the concurrency design note requires: an
/// application that opens two independent block stores gets two
/// independent `BlobStore`s, each with its own tree cache. Supplemented
/// from `BlobStoreOnBlocks` in the original implementation, which plays
/// exactly this composition role.
pub struct BlobStore<S: BlockStore> {
    nodes: Arc<NodeStore<S>>,
    access: ParallelAccessStore<S>,
}

impl<S: BlockStore> BlobStore<S> {
    pub fn new(block_store: S) -> Result<Self> {
        let nodes = Arc::new(NodeStore::new(Arc::new(block_store))?);
        let access = ParallelAccessStore::new(nodes.clone());
        Ok(Self { nodes, access })
    }

    /// Creates a new, empty blob (a single zero-byte leaf) and returns a
    /// handle to it.
    pub fn create(&self) -> Result<Blob<S>> {
        let leaf = self.nodes.create_leaf(&[])?;
        let tree = Tree::new(leaf.id(), self.nodes.clone());
        let handle = self.access.add(tree);
        log::debug!("created blob {}", handle.id());
        Ok(Blob::new(handle))
    }

    /// Loads an existing blob by its root block id, or `None` if no block
    /// with that id exists.
    pub fn load(&self, id: BlockId) -> Result<Option<Blob<S>>> {
        if self.nodes.load(id)?.is_none() {
            return Ok(None);
        }
        let handle = self.access.load(id)?;
        Ok(Some(Blob::new(handle)))
    }

    /// Frees every block making up `blob`. The caller must drop `blob`
    /// (and any other outstanding references) for this to complete, since
    /// it waits for the tree to have no other open handles.
    pub fn remove(&self, blob: Blob<S>) -> Result<()> {
        let id = blob.id();
        // Release this handle before waiting for every other open handle
        // to close, or `wait_until_closed` would block on itself.
        drop(blob);
        self.remove_by_id(id)
    }

    /// Frees every block making up the blob rooted at `id`.
    pub fn remove_by_id(&self, id: BlockId) -> Result<()> {
        self.access.wait_until_closed(id);
        let root = self.nodes.load(id)?.ok_or(Error::NotFound(id))?;
        self.nodes.remove_subtree(root)?;
        log::debug!("removed blob {id}");
        Ok(())
    }

    pub fn num_blocks(&self) -> u64 {
        self.nodes.block_store().num_blocks()
    }

    pub fn estimate_num_free_blocks(&self) -> u64 {
        self.nodes.block_store().estimate_num_free_blocks()
    }
}

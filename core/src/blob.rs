use crate::access::TreeHandle;
use crate::block_store::BlockStore;
use crate::depth::ceil_division;
use crate::error::{Error, Result};
use crate::ids::BlockId;
use crate::node::{InnerNode, LeafNode};

/// A variable-length byte container layered over a [`crate::tree::Tree`].
///
/// Thin offset/count-to-leaf-range adapter, grounded on `BlobOnBlocks` from
/// the original implementation: it translates byte offsets into leaf
/// indices and delegates everything structural to the tree.
pub struct Blob<S: BlockStore> {
    tree: TreeHandle<S>,
}

impl<S: BlockStore> Blob<S> {
    pub(crate) fn new(tree: TreeHandle<S>) -> Self {
        Self { tree }
    }

    pub fn id(&self) -> BlockId {
        self.tree.id()
    }

    pub fn size(&self) -> Result<u64> {
        self.tree.num_stored_bytes()
    }

    pub fn num_nodes(&self) -> Result<u64> {
        self.tree.num_nodes()
    }

    /// Reads exactly `count` bytes at `offset` into `dst`. Errors if the
    /// range exceeds the blob's current size.
    pub fn read(&self, dst: &mut [u8], offset: u64, count: u64) -> Result<()> {
        let size = self.size()?;
        if offset + count > size {
            return Err(Error::OutOfBounds { offset, count, size });
        }
        self.read_unchecked(dst, offset, count)
    }

    /// Reads up to `count` bytes at `offset`, clamped to the blob's
    /// current size, returning the number of bytes actually read. Never
    /// errors on an out-of-range request; returns `0` if `offset` is at or
    /// past the end of the blob.
    pub fn try_read(&self, dst: &mut [u8], offset: u64, count: u64) -> Result<u64> {
        let size = self.size()?;
        if offset >= size {
            return Ok(0);
        }
        let actual = count.min(size - offset);
        self.read_unchecked(&mut dst[..actual as usize], offset, actual)?;
        Ok(actual)
    }

    fn read_unchecked(&self, dst: &mut [u8], offset: u64, count: u64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let l = self.tree.max_bytes_per_leaf();
        let begin_leaf = offset / l;
        let end_leaf = ceil_division(offset + count, l);
        let mut on_existing = |index: u64, _is_right_border: bool, leaf: &mut LeafNode| {
            let leaf_start = index * l;
            let read_start = offset.max(leaf_start) - leaf_start;
            let read_end = (offset + count).min(leaf_start + leaf.num_bytes() as u64) - leaf_start;
            let read_count = read_end - read_start;
            let dst_offset = leaf_start + read_start - offset;
            leaf.read(
                &mut dst[dst_offset as usize..(dst_offset + read_count) as usize],
                read_start,
                read_count,
            )
        };
        self.tree
            .traverse_leaves_read_only(begin_leaf, end_leaf, &mut on_existing)
    }

    /// Writes `src` at `offset`, growing the blob first if the write
    /// extends past its current size.
    pub fn write(&self, src: &[u8], offset: u64) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        let end = offset + src.len() as u64;
        let size = self.size()?;
        if end > size {
            self.tree.resize(end)?;
        }
        let l = self.tree.max_bytes_per_leaf();
        let begin_leaf = offset / l;
        let end_leaf = ceil_division(end, l);
        let mut on_existing = |index: u64, _is_right_border: bool, leaf: &mut LeafNode| {
            let leaf_start = index * l;
            let write_start = offset.max(leaf_start) - leaf_start;
            let write_end = end.min(leaf_start + leaf.max_bytes()) - leaf_start;
            let write_count = write_end - write_start;
            let src_offset = leaf_start + write_start - offset;
            leaf.write(
                &src[src_offset as usize..(src_offset + write_count) as usize],
                write_start,
            )
        };
        let mut on_create =
            |_index: u64| -> Result<Vec<u8>> { unreachable!("resize already grew the tree") };
        let mut on_backtrack = |_inner: &InnerNode| Ok(());
        self.tree
            .traverse_leaves(begin_leaf, end_leaf, &mut on_existing, &mut on_create, &mut on_backtrack)
    }

    pub fn resize(&self, new_size: u64) -> Result<()> {
        self.tree.resize(new_size)
    }

    pub fn flush(&self) -> Result<()> {
        self.tree.flush()
    }
}

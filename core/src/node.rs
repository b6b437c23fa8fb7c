use crate::error::{Error, Result};
use crate::ids::BlockId;
use crate::layout::{
    FORMAT_VERSION, ID_SIZE_BYTES, MAX_DEPTH, NodeLayout, OFFSET_DATA, OFFSET_DEPTH,
    OFFSET_FORMAT_VERSION, OFFSET_RESERVED, OFFSET_SIZE,
};

/** Data structure of a node header (8 bytes):

```text
| Offset | Size | Field          |
|--------|------|----------------|
| 0      | 2    | format version |
| 2      | 1    | reserved       |
| 3      | 1    | depth          |
| 4      | 4    | size           |
| 8      | ...  | payload        |
```

`size` means "number of valid data bytes" for a leaf (depth 0) and "number
of children" for an inner node (depth > 0). */
pub(crate) struct NodeView {
    layout: NodeLayout,
    bytes: Vec<u8>,
}

impl NodeView {
    /// A freshly zeroed node of the given depth, header already filled in
    /// with `size = 0`.
    pub fn new_zeroed(layout: NodeLayout, depth: u8) -> Self {
        let mut bytes = vec![0u8; layout.block_size_bytes() as usize];
        bytes[OFFSET_FORMAT_VERSION..OFFSET_FORMAT_VERSION + 2]
            .copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes[OFFSET_DEPTH] = depth;
        Self { layout, bytes }
    }

    /// Parses an existing block's raw bytes. Does not validate depth
    /// against `MAX_DEPTH` or the format version against what this crate
    /// supports; callers check that via [`NodeView::format_version`] and
    /// [`NodeView::depth`] themselves so they can attach the block id to
    /// the resulting error.
    pub fn from_bytes(layout: NodeLayout, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() as u64 != layout.block_size_bytes() {
            return Err(Error::InvariantViolation(format!(
                "block has {} bytes, expected {}",
                bytes.len(),
                layout.block_size_bytes()
            )));
        }
        Ok(Self { layout, bytes })
    }

    pub fn layout(&self) -> NodeLayout {
        self.layout
    }

    pub fn format_version(&self) -> u16 {
        u16::from_le_bytes([self.bytes[0], self.bytes[1]])
    }

    pub fn reserved_byte(&self) -> u8 {
        self.bytes[OFFSET_RESERVED]
    }

    pub fn depth(&self) -> u8 {
        self.bytes[OFFSET_DEPTH]
    }

    pub fn set_depth(&mut self, depth: u8) {
        self.bytes[OFFSET_DEPTH] = depth;
    }

    pub fn size(&self) -> u32 {
        u32::from_le_bytes(
            self.bytes[OFFSET_SIZE..OFFSET_SIZE + 4]
                .try_into()
                .expect("4-byte slice"),
        )
    }

    pub fn set_size(&mut self, size: u32) {
        self.bytes[OFFSET_SIZE..OFFSET_SIZE + 4].copy_from_slice(&size.to_le_bytes());
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes[OFFSET_DATA..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[OFFSET_DATA..]
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Validates this view's header is something the rest of the crate can
    /// work with, attaching `id` to the error for diagnostics.
    pub fn check_supported(&self, id: BlockId) -> Result<()> {
        if self.format_version() != FORMAT_VERSION {
            return Err(Error::FormatUnsupported {
                id,
                version: Some(self.format_version()),
                depth: None,
            });
        }
        if self.depth() > MAX_DEPTH {
            return Err(Error::FormatUnsupported {
                id,
                version: Some(self.format_version()),
                depth: Some(self.depth()),
            });
        }
        if self.reserved_byte() != 0 {
            log::warn!("block {id} has a nonzero reserved header byte; tolerating");
        }
        Ok(())
    }
}

/// A leaf node: raw user-visible bytes, `numBytes <= maxBytesPerLeaf`.
pub struct LeafNode {
    id: BlockId,
    view: NodeView,
}

impl LeafNode {
    pub(crate) fn new(id: BlockId, view: NodeView) -> Self {
        debug_assert_eq!(view.depth(), 0);
        Self { id, view }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn num_bytes(&self) -> u32 {
        self.view.size()
    }

    pub fn max_bytes(&self) -> u64 {
        self.view.layout().max_bytes_per_leaf()
    }

    /// Reads `count` bytes starting at `offset` into `dst`. `offset + count`
    /// must not exceed `num_bytes()`.
    pub fn read(&self, dst: &mut [u8], offset: u64, count: u64) -> Result<()> {
        let num_bytes = self.num_bytes() as u64;
        if offset + count > num_bytes {
            return Err(Error::OutOfBounds {
                offset,
                count,
                size: num_bytes,
            });
        }
        let offset = offset as usize;
        let count = count as usize;
        dst[..count].copy_from_slice(&self.view.data()[offset..offset + count]);
        Ok(())
    }

    /// Writes `src` at `offset`, growing `num_bytes()` if the write extends
    /// past the current size. `offset + src.len()` must not exceed
    /// `max_bytes()`.
    pub fn write(&mut self, src: &[u8], offset: u64) -> Result<()> {
        let max_bytes = self.max_bytes();
        let end = offset + src.len() as u64;
        if end > max_bytes {
            return Err(Error::OutOfBounds {
                offset,
                count: src.len() as u64,
                size: max_bytes,
            });
        }
        let offset_usize = offset as usize;
        self.view.data_mut()[offset_usize..offset_usize + src.len()].copy_from_slice(src);
        if end > self.num_bytes() as u64 {
            self.view.set_size(end as u32);
        }
        Ok(())
    }

    /// Resizes the leaf to exactly `new_size` bytes. Shrinking truncates
    /// (the truncated bytes are discarded, not merely hidden); growing
    /// zero-fills the newly exposed region.
    pub fn resize(&mut self, new_size: u32) -> Result<()> {
        if new_size as u64 > self.max_bytes() {
            return Err(Error::OutOfBounds {
                offset: 0,
                count: new_size as u64,
                size: self.max_bytes(),
            });
        }
        let old_size = self.num_bytes();
        if new_size > old_size {
            let start = old_size as usize;
            let end = new_size as usize;
            self.view.data_mut()[start..end].fill(0);
        } else if new_size < old_size {
            let start = new_size as usize;
            let end = old_size as usize;
            self.view.data_mut()[start..end].fill(0);
        }
        self.view.set_size(new_size);
        Ok(())
    }

    pub(crate) fn view(&self) -> &NodeView {
        &self.view
    }

    pub(crate) fn into_view(self) -> NodeView {
        self.view
    }
}

/// An inner node: an ordered list of `numChildren <= maxChildrenPerInnerNode`
/// child block ids, all of depth `self.depth() - 1`.
pub struct InnerNode {
    id: BlockId,
    view: NodeView,
}

impl InnerNode {
    pub(crate) fn new(id: BlockId, view: NodeView) -> Self {
        debug_assert!(view.depth() > 0);
        Self { id, view }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn depth(&self) -> u8 {
        self.view.depth()
    }

    pub fn num_children(&self) -> u32 {
        self.view.size()
    }

    pub fn max_children(&self) -> u64 {
        self.view.layout().max_children_per_inner_node()
    }

    fn child_offset(index: u32) -> usize {
        index as usize * ID_SIZE_BYTES as usize
    }

    pub fn read_child(&self, index: u32) -> Result<BlockId> {
        if index >= self.num_children() {
            return Err(Error::OutOfBounds {
                offset: index as u64,
                count: 1,
                size: self.num_children() as u64,
            });
        }
        let start = Self::child_offset(index);
        let bytes: [u8; 16] = self.view.data()[start..start + 16]
            .try_into()
            .expect("16-byte slice");
        Ok(BlockId::from_bytes(bytes))
    }

    pub fn read_last_child(&self) -> Result<BlockId> {
        if self.num_children() == 0 {
            return Err(Error::InvariantViolation(format!(
                "inner node {} has no children",
                self.id
            )));
        }
        self.read_child(self.num_children() - 1)
    }

    pub fn children(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.num_children()).map(move |i| self.read_child(i).expect("index within bounds"))
    }

    /// Appends a child pointer. The caller is responsible for ensuring
    /// `child`'s depth is `self.depth() - 1`.
    pub fn add_child(&mut self, child: BlockId) -> Result<()> {
        let num_children = self.num_children();
        if num_children as u64 >= self.max_children() {
            return Err(Error::InvariantViolation(format!(
                "inner node {} is already at max_children",
                self.id
            )));
        }
        let start = Self::child_offset(num_children);
        self.view.data_mut()[start..start + 16].copy_from_slice(child.as_bytes());
        self.view.set_size(num_children + 1);
        Ok(())
    }

    pub fn remove_last_child(&mut self) -> Result<BlockId> {
        let num_children = self.num_children();
        if num_children == 0 {
            return Err(Error::InvariantViolation(format!(
                "inner node {} has no children to remove",
                self.id
            )));
        }
        let removed = self.read_child(num_children - 1)?;
        let start = Self::child_offset(num_children - 1);
        self.view.data_mut()[start..start + 16].fill(0);
        self.view.set_size(num_children - 1);
        Ok(removed)
    }

    pub(crate) fn view(&self) -> &NodeView {
        &self.view
    }

    pub(crate) fn into_view(self) -> NodeView {
        self.view
    }
}

/// A node freshly loaded from, or about to be written to, the block store:
/// either a [`LeafNode`] or an [`InnerNode`], dynamically down-cast by
/// `depth`.
pub enum Node {
    Leaf(LeafNode),
    Inner(InnerNode),
}

impl Node {
    pub(crate) fn from_view(id: BlockId, view: NodeView) -> Self {
        if view.depth() == 0 {
            Node::Leaf(LeafNode::new(id, view))
        } else {
            Node::Inner(InnerNode::new(id, view))
        }
    }

    pub fn id(&self) -> BlockId {
        match self {
            Node::Leaf(l) => l.id(),
            Node::Inner(i) => i.id(),
        }
    }

    pub fn depth(&self) -> u8 {
        match self {
            Node::Leaf(_) => 0,
            Node::Inner(i) => i.depth(),
        }
    }

    pub(crate) fn view(&self) -> &NodeView {
        match self {
            Node::Leaf(l) => l.view(),
            Node::Inner(i) => i.view(),
        }
    }

    pub(crate) fn into_view(self) -> NodeView {
        match self {
            Node::Leaf(l) => l.into_view(),
            Node::Inner(i) => i.into_view(),
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafNode> {
        match self {
            Node::Leaf(l) => Some(l),
            Node::Inner(_) => None,
        }
    }

    pub fn as_inner(&self) -> Option<&InnerNode> {
        match self {
            Node::Inner(i) => Some(i),
            Node::Leaf(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> NodeLayout {
        NodeLayout::new(40).unwrap() // H=8, D=32, K=16 => L=32, N=2
    }

    fn new_leaf() -> LeafNode {
        let view = NodeView::new_zeroed(layout(), 0);
        LeafNode::new(BlockId::new_random(), view)
    }

    fn new_inner(depth: u8) -> InnerNode {
        let view = NodeView::new_zeroed(layout(), depth);
        InnerNode::new(BlockId::new_random(), view)
    }

    #[test]
    fn leaf_write_grows_size() {
        let mut leaf = new_leaf();
        assert_eq!(leaf.num_bytes(), 0);
        leaf.write(&[1, 2, 3], 0).unwrap();
        assert_eq!(leaf.num_bytes(), 3);
        let mut buf = [0u8; 3];
        leaf.read(&mut buf, 0, 3).unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn leaf_write_past_max_bytes_errors() {
        let mut leaf = new_leaf();
        assert!(leaf.write(&[0u8; 33], 0).is_err());
    }

    #[test]
    fn leaf_resize_zero_fills_growth_and_truncates_shrink() {
        let mut leaf = new_leaf();
        leaf.write(&[0xFF; 4], 0).unwrap();
        leaf.resize(8).unwrap();
        let mut buf = [0u8; 8];
        leaf.read(&mut buf, 0, 8).unwrap();
        assert_eq!(buf, [0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);

        leaf.resize(2).unwrap();
        assert_eq!(leaf.num_bytes(), 2);
        leaf.resize(8).unwrap();
        let mut buf = [0u8; 8];
        leaf.read(&mut buf, 0, 8).unwrap();
        // Bytes beyond the shrunk size must have been zeroed, not just hidden.
        assert_eq!(buf, [0xFF, 0xFF, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn inner_add_and_remove_child() {
        let mut inner = new_inner(1);
        let a = BlockId::new_random();
        let b = BlockId::new_random();
        inner.add_child(a).unwrap();
        inner.add_child(b).unwrap();
        assert_eq!(inner.num_children(), 2);
        assert_eq!(inner.read_child(0).unwrap(), a);
        assert_eq!(inner.read_last_child().unwrap(), b);

        let removed = inner.remove_last_child().unwrap();
        assert_eq!(removed, b);
        assert_eq!(inner.num_children(), 1);
    }

    #[test]
    fn inner_add_child_beyond_max_errors() {
        let mut inner = new_inner(1);
        inner.add_child(BlockId::new_random()).unwrap();
        inner.add_child(BlockId::new_random()).unwrap();
        assert!(inner.add_child(BlockId::new_random()).is_err());
    }
}

use thiserror::Error;

use crate::ids::BlockId;

/// Every fallible operation in this crate returns this error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying `BlockStore` failed to perform an operation.
    #[error("block store error: {0}")]
    BlockStore(String),

    /// A block could not be decoded because its header declares a format
    /// this crate cannot read, or its declared depth exceeds `MAX_DEPTH`.
    #[error("block {id} has an unsupported on-disk format (version={version:?}, depth={depth:?})")]
    FormatUnsupported {
        id: BlockId,
        version: Option<u16>,
        depth: Option<u8>,
    },

    /// A read or write range fell outside the addressable size of a node
    /// or blob.
    #[error("out of bounds: offset {offset} + count {count} exceeds size {size}")]
    OutOfBounds { offset: u64, count: u64, size: u64 },

    /// An internal structural invariant (left-maximality, depth bound,
    /// read-only growth) would have been violated.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The block store has no room left for a new block.
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// A block referenced by an id was expected to exist but did not.
    #[error("block {0} not found")]
    NotFound(BlockId),
}

pub type Result<T> = std::result::Result<T, Error>;

//! A blob-on-blocks storage engine: variable-length byte containers
//! ("blobs") layered over a fixed-size block store, physically
//! represented as a balanced tree of fixed-size blocks.
//!
//! The block store itself - its encryption, integrity checking, and
//! physical storage - is a collaborator this crate consumes through the
//! [`BlockStore`] trait; it is not implemented here except for the
//! in-memory reference implementation under [`testing`]. Filesystem-level
//! interpretation of blob content (directories, files, symlinks), mounting,
//! and key derivation are likewise out of scope.

mod access;
mod blob;
mod block_store;
mod depth;
mod error;
mod ids;
mod layout;
mod node;
mod node_store;
mod store;
mod traverser;
mod tree;

pub mod testing;

pub use access::{ParallelAccessStore, TreeHandle};
pub use blob::Blob;
pub use block_store::BlockStore;
pub use error::{Error, Result};
pub use ids::BlockId;
pub use layout::{FORMAT_VERSION, HEADER_SIZE_BYTES, ID_SIZE_BYTES, MAX_DEPTH, NodeLayout};
pub use node::{InnerNode, LeafNode, Node};
pub use node_store::NodeStore;
pub use store::BlobStore;
pub use tree::Tree;

pub use depth::{max_leaves_at_depth, min_depth_for_leaf_count};

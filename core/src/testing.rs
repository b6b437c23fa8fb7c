//! Test- and demo-only support code.
//!
//! [`InMemoryBlockStore`] is not a production block store: it has no
//! encryption, no integrity checking, and no persistence. It exists so the
//! node, tree, blob, and access layers are exercisable without a real
//! block store.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::block_store::BlockStore;
use crate::error::{Error, Result};
use crate::ids::BlockId;

pub struct InMemoryBlockStore {
    block_size_bytes: u64,
    blocks: Mutex<HashMap<BlockId, Vec<u8>>>,
}

impl InMemoryBlockStore {
    pub fn new(block_size_bytes: u64) -> Self {
        Self {
            block_size_bytes,
            blocks: Mutex::new(HashMap::new()),
        }
    }

    fn check_size(&self, content: &[u8]) -> Result<()> {
        if content.len() as u64 != self.block_size_bytes {
            return Err(Error::InvariantViolation(format!(
                "block content is {} bytes, expected {}",
                content.len(),
                self.block_size_bytes
            )));
        }
        Ok(())
    }
}

impl BlockStore for InMemoryBlockStore {
    fn num_blocks(&self) -> u64 {
        self.blocks.lock().len() as u64
    }

    fn estimate_num_free_blocks(&self) -> u64 {
        u64::MAX
    }

    fn block_size_bytes(&self) -> u64 {
        self.block_size_bytes
    }

    fn create(&self, content: &[u8]) -> Result<BlockId> {
        self.check_size(content)?;
        let id = BlockId::new_random();
        self.blocks.lock().insert(id, content.to_vec());
        Ok(id)
    }

    fn try_create(&self, id: &BlockId, content: &[u8]) -> Result<bool> {
        self.check_size(content)?;
        let mut blocks = self.blocks.lock();
        if blocks.contains_key(id) {
            return Ok(false);
        }
        blocks.insert(*id, content.to_vec());
        Ok(true)
    }

    fn load(&self, id: &BlockId) -> Result<Option<Vec<u8>>> {
        Ok(self.blocks.lock().get(id).cloned())
    }

    fn overwrite(&self, id: &BlockId, new_content: &[u8]) -> Result<()> {
        self.check_size(new_content)?;
        let mut blocks = self.blocks.lock();
        match blocks.get_mut(id) {
            Some(slot) => {
                slot.copy_from_slice(new_content);
                Ok(())
            }
            None => Err(Error::NotFound(*id)),
        }
    }

    fn remove(&self, id: &BlockId) -> Result<bool> {
        Ok(self.blocks.lock().remove(id).is_some())
    }

    fn for_each_block(&self, callback: &mut dyn FnMut(&BlockId)) -> Result<()> {
        for id in self.blocks.lock().keys() {
            callback(id);
        }
        Ok(())
    }
}

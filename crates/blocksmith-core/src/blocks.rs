//! Ordered block storage.
//!
//! Positions are the document order. Callers get shared references or
//! explicit mutators; the backing sequence is never handed out mutably.
//! A holder index maps presentation nodes back to their block.

use std::collections::HashMap;

use blocksmith_types::{BlockId, NodeId};

use crate::block::Block;

#[derive(Debug, Default)]
pub struct BlockCollection {
    blocks: Vec<Block>,
    holders: HashMap<NodeId, BlockId>,
}

impl BlockCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Block> {
        self.blocks.get_mut(index)
    }

    pub fn index_of(&self, id: &BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id() == id)
    }

    pub fn last(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Block> {
        self.blocks.iter_mut()
    }

    /// The block whose holder is `holder`.
    pub fn by_holder(&self, holder: NodeId) -> Option<&BlockId> {
        self.holders.get(&holder)
    }

    /// Insert at `index`, shifting later blocks. `index` is clamped to the end.
    pub(crate) fn insert(&mut self, index: usize, block: Block) {
        let index = index.min(self.blocks.len());
        self.holders.insert(block.holder(), block.id().clone());
        self.blocks.insert(index, block);
    }

    /// Insert a run of blocks starting at `index` in one splice.
    pub(crate) fn insert_many(&mut self, index: usize, blocks: Vec<Block>) {
        let index = index.min(self.blocks.len());
        for block in &blocks {
            self.holders.insert(block.holder(), block.id().clone());
        }
        self.blocks.splice(index..index, blocks);
    }

    /// Swap the block at `index`, returning the old one.
    pub(crate) fn replace(&mut self, index: usize, block: Block) -> Option<Block> {
        let slot = self.blocks.get_mut(index)?;
        let old = std::mem::replace(slot, block);
        self.holders.remove(&old.holder());
        let new = &self.blocks[index];
        self.holders.insert(new.holder(), new.id().clone());
        Some(old)
    }

    pub(crate) fn remove(&mut self, index: usize) -> Option<Block> {
        if index >= self.blocks.len() {
            return None;
        }
        let block = self.blocks.remove(index);
        self.holders.remove(&block.holder());
        Some(block)
    }

    /// Relocate the block at `from` so that it ends up at `to`.
    pub(crate) fn move_block(&mut self, to: usize, from: usize) -> bool {
        let len = self.blocks.len();
        if to >= len || from >= len {
            return false;
        }
        let block = self.blocks.remove(from);
        self.blocks.insert(to, block);
        true
    }

    /// Take every block out, in document order.
    pub(crate) fn drain(&mut self) -> Vec<Block> {
        self.holders.clear();
        std::mem::take(&mut self.blocks)
    }
}

impl<'a> IntoIterator for &'a BlockCollection {
    type Item = &'a Block;
    type IntoIter = std::slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

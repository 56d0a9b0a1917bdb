//! Fixed-capacity open-addressing block index
//!
//! Slots are addressed by `hash % capacity` with forward, wrap-around linear
//! probing. A slot whose id is [`EMPTY_ID`] is unused. Probing always stops
//! after `capacity` steps, which matters because a finished index is full.

use crate::archive::format::{BlockRecord, BLOCK_RECORD_SIZE};
use crate::hash::EMPTY_ID;

/// Storage the probe sequence can walk over
pub trait SlotTable {
    /// Number of slots
    fn capacity(&self) -> usize;

    /// Id stored in `slot`; `slot` is always below `capacity()`
    fn id_at(&self, slot: usize) -> u64;
}

impl SlotTable for [BlockRecord] {
    fn capacity(&self) -> usize {
        self.len()
    }

    fn id_at(&self, slot: usize) -> u64 {
        self[slot].id
    }
}

impl SlotTable for Vec<BlockRecord> {
    fn capacity(&self) -> usize {
        self.len()
    }

    fn id_at(&self, slot: usize) -> u64 {
        self[slot].id
    }
}

/// Find the slot holding `id`, starting from the home slot of `hash`
pub fn find_slot<T: SlotTable + ?Sized>(table: &T, hash: u64, id: u64) -> Option<usize> {
    let capacity = table.capacity();
    if capacity == 0 {
        return None;
    }

    let mut slot = (hash % capacity as u64) as usize;
    for probes in 0..capacity {
        if table.id_at(slot) == id {
            if probes > 0 {
                tracing::trace!(slot, probes, "resolved after probing");
            }
            return Some(slot);
        }
        slot = (slot + 1) % capacity;
    }

    None
}

/// Find the first unused slot on the probe sequence of `hash`
pub fn find_empty_slot<T: SlotTable + ?Sized>(table: &T, hash: u64) -> Option<usize> {
    find_slot(table, hash, EMPTY_ID)
}

/// Read-only view of an encoded block index
#[derive(Debug, Clone, Copy)]
pub struct IndexView<'a> {
    bytes: &'a [u8],
}

impl<'a> IndexView<'a> {
    /// Wrap encoded records; a trailing partial record is not part of the view
    pub fn new(bytes: &'a [u8]) -> Self {
        let whole = bytes.len() - bytes.len() % BLOCK_RECORD_SIZE;
        Self {
            bytes: &bytes[..whole],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / BLOCK_RECORD_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode the record in `slot`
    pub fn get(&self, slot: usize) -> Option<BlockRecord> {
        let start = slot.checked_mul(BLOCK_RECORD_SIZE)?;
        let raw = self.bytes.get(start..start + BLOCK_RECORD_SIZE)?;
        let mut fixed = [0u8; BLOCK_RECORD_SIZE];
        fixed.copy_from_slice(raw);
        Some(BlockRecord::decode(&fixed))
    }

    /// Iterate records in slot order
    pub fn iter(&self) -> impl Iterator<Item = BlockRecord> + 'a {
        let view = *self;
        (0..view.len()).filter_map(move |slot| view.get(slot))
    }
}

impl SlotTable for IndexView<'_> {
    fn capacity(&self) -> usize {
        self.len()
    }

    fn id_at(&self, slot: usize) -> u64 {
        self.get(slot).map_or(EMPTY_ID, |record| record.id)
    }
}

// Fixed-capacity connection table.
//
// `ConnectionTable<T>` maps slot positions to live connection handles. It is
// the relay's only shared mutable state and is owned outright by the event
// loop in `server.rs` with no locking and no global. Generic over the handle type
// so tests can drive it with plain values.
//
// Slot selection is always the lowest free index, which makes slot identities
// deterministic: after a removal, the next insert reuses the lowest vacated
// position.

use chatcast_protocol::SlotId;

/// Returned by `try_insert` when every slot is occupied. Gives the rejected
/// handle back so the caller can release it.
#[derive(Debug)]
pub struct TableFull<T>(pub T);

/// Bounded registry of live connections, indexed by `SlotId`.
#[derive(Debug)]
pub struct ConnectionTable<T> {
    slots: Vec<Option<T>>,
    occupied: usize,
}

impl<T> ConnectionTable<T> {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, occupied: 0 }
    }

    /// Place `handle` in the lowest empty slot. Leaves the table untouched
    /// when it is full.
    pub fn try_insert(&mut self, handle: T) -> Result<SlotId, TableFull<T>> {
        match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = Some(handle);
                self.occupied += 1;
                Ok(SlotId(index))
            }
            None => Err(TableFull(handle)),
        }
    }

    /// Empty a slot and hand back its handle. Removing an empty or
    /// out-of-range slot is a no-op.
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        let handle = self.slots.get_mut(id.0)?.take()?;
        self.occupied -= 1;
        Some(handle)
    }

    /// Live slots in ascending id order.
    pub fn for_each_live(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|h| (SlotId(i), h)))
    }

    /// Snapshot of the live ids, for loops that need `get_mut` per slot.
    pub fn live_ids(&self) -> Vec<SlotId> {
        self.for_each_live().map(|(id, _)| id).collect()
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots.get(id.0)?.as_ref()
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.slots.get_mut(id.0)?.as_mut()
    }

    pub fn contains(&self, id: SlotId) -> bool {
        self.get(id).is_some()
    }

    pub fn occupancy(&self) -> usize {
        self.occupied
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.occupied == self.slots.len()
    }

    /// Empty every slot, yielding the handles in ascending id order.
    pub fn drain(&mut self) -> Vec<(SlotId, T)> {
        self.occupied = 0;
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.take().map(|h| (SlotId(i), h)))
            .collect()
    }
}

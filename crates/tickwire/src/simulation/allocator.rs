use std::collections::BTreeSet;

use super::object::ObjectId;

const ID_SPACE: u32 = u16::MAX as u32 + 1;

/// Lowest-free-first object id allocator.
///
/// `free` never contains `next - 1`, so releasing the most recent allocation
/// shrinks the high-water mark and leaves the allocator exactly as it was
/// before that allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdAllocator {
    next: u32,
    free: BTreeSet<u16>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next call to `allocate` returns.
    pub fn peek(&self) -> Option<ObjectId> {
        match self.free.first() {
            Some(&id) => Some(ObjectId(id)),
            None if self.next < ID_SPACE => Some(ObjectId(self.next as u16)),
            None => None,
        }
    }

    pub fn allocate(&mut self) -> Option<ObjectId> {
        if let Some(id) = self.free.pop_first() {
            return Some(ObjectId(id));
        }
        if self.next >= ID_SPACE {
            return None;
        }
        let id = self.next as u16;
        self.next += 1;
        Some(ObjectId(id))
    }

    pub fn release(&mut self, id: ObjectId) {
        let raw = id.0 as u32;
        if raw >= self.next {
            return;
        }
        if raw + 1 == self.next {
            self.next = raw;
            while self.next > 0 && self.free.remove(&((self.next - 1) as u16)) {
                self.next -= 1;
            }
        } else {
            self.free.insert(id.0);
        }
    }

    /// Marks `id` as allocated again, undoing a `release`.
    pub fn reclaim(&mut self, id: ObjectId) -> bool {
        let raw = id.0 as u32;
        if raw >= self.next {
            self.free.extend((self.next..raw).map(|free| free as u16));
            self.next = raw + 1;
            true
        } else {
            self.free.remove(&id.0)
        }
    }

    /// True when releasing `id` and allocating again would hand out `id`.
    pub fn is_latest(&self, id: ObjectId) -> bool {
        let raw = id.0 as u32;
        raw < self.next
            && !self.free.contains(&id.0)
            && self.free.first().is_none_or(|&lowest| lowest > id.0)
    }

    pub fn is_allocated(&self, id: ObjectId) -> bool {
        (id.0 as u32) < self.next && !self.free.contains(&id.0)
    }

    /// One past the highest id ever handed out and not yet released.
    pub fn high_water_mark(&self) -> u32 {
        self.next
    }

    pub fn free_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.free.iter().map(|&id| ObjectId(id))
    }

    pub fn clear(&mut self) {
        self.next = 0;
        self.free.clear();
    }
}

use std::fmt::Debug;
use std::hash::Hash;

use arrayvec::ArrayVec;

use super::{PagePayload, PAGE_SIZE};
use crate::tuple::Rid;

/// Compile-time slot cap; the runtime `max_size` passed to `init` may be
/// smaller (tests shrink it to force splits).
pub const HASH_BUCKET_SLOTS: usize = 48;

/// Keys an extendible hash bucket can store in-page.
pub trait HashKey:
    Copy + PartialEq + Eq + Hash + Default + Debug + Send + Sync + 'static
{
}

impl HashKey for u32 {}
impl HashKey for u64 {}

#[repr(C)]
pub struct HashBucketPageData<K: HashKey> {
    max_size: u32,
    entries: ArrayVec<(K, Rid), HASH_BUCKET_SLOTS>,
}

unsafe impl<K: HashKey> PagePayload for HashBucketPageData<K> {}

impl<K: HashKey> HashBucketPageData<K> {
    pub fn init(&mut self, max_size: usize) {
        assert!(std::mem::size_of::<Self>() <= PAGE_SIZE);
        assert!(max_size <= HASH_BUCKET_SLOTS);
        self.max_size = max_size as u32;
        self.entries.clear();
    }

    pub fn lookup(&self, key: &K) -> Option<Rid> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    /// Appends the pair; duplicates and full buckets are rejected.
    pub fn insert(&mut self, key: K, value: Rid) -> bool {
        if self.is_full() || self.entries.iter().any(|(k, _)| *k == key) {
            return false;
        }
        self.entries.push((key, value));
        true
    }

    pub fn remove(&mut self, key: &K) -> bool {
        match self.entries.iter().position(|(k, _)| k == key) {
            Some(idx) => {
                self.remove_at(idx);
                true
            }
            None => false,
        }
    }

    /// Order-preserving removal.
    pub fn remove_at(&mut self, idx: usize) {
        self.entries.remove(idx);
    }

    pub fn key_at(&self, idx: usize) -> K {
        self.entries[idx].0
    }

    pub fn value_at(&self, idx: usize) -> Rid {
        self.entries[idx].1
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size as usize
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empties the bucket and hands back its entries, used when splitting.
    pub fn take_entries(&mut self) -> ArrayVec<(K, Rid), HASH_BUCKET_SLOTS> {
        std::mem::take(&mut self.entries)
    }
}

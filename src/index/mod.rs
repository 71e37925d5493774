pub mod extendible_hash;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

pub use crate::pages::hash_bucket_page::HashKey;
use crate::types::Value;

/// Fixed-width key buffer for index columns. Values serialize into the
/// front of the buffer; the tail stays zeroed.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericKey<const N: usize>(pub [u8; N]);

impl<const N: usize> Default for GenericKey<N> {
    fn default() -> Self {
        Self([0u8; N])
    }
}

impl<const N: usize> GenericKey<N> {
    pub fn from_value(value: &Value) -> Self {
        let mut buf = Vec::new();
        value.write_bytes(&mut buf);
        let mut key = [0u8; N];
        let take = buf.len().min(N);
        key[..take].copy_from_slice(&buf[..take]);
        Self(key)
    }
}

impl<const N: usize> HashKey for GenericKey<N> {}

/// Hashes keys to the 32 bits the header and directory consume. Tests
/// override it to steer keys into chosen buckets.
pub struct HashFunction<K> {
    f: Option<fn(&K) -> u32>,
    _marker: PhantomData<K>,
}

impl<K: HashKey> Default for HashFunction<K> {
    fn default() -> Self {
        Self {
            f: None,
            _marker: PhantomData,
        }
    }
}

impl<K: HashKey> HashFunction<K> {
    pub fn with(f: fn(&K) -> u32) -> Self {
        Self {
            f: Some(f),
            _marker: PhantomData,
        }
    }

    pub fn hash(&self, key: &K) -> u32 {
        if let Some(f) = self.f {
            return f(key);
        }
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let h = hasher.finish();
        (h ^ (h >> 32)) as u32
    }
}

use anyhow::{bail, Result};

use crate::buffer_pool::{ArcBufferPool, BufferPoolManager, WritePageGuard};
use crate::errors::Error;
use crate::pages::hash_bucket_page::HashBucketPageData;
use crate::pages::hash_directory_page::{HashDirectoryPageData, HASH_DIRECTORY_MAX_DEPTH};
use crate::pages::hash_header_page::{HashHeaderPageData, HASH_HEADER_MAX_DEPTH};
use crate::pages::{PageId, INVALID_PAGE_ID};
use crate::printdbg;
use crate::tuple::Rid;

use super::{HashFunction, HashKey};

/// Three-tier on-disk extendible hash table: one header page fans out to
/// directories by the hash's top bits, directories fan out to buckets by
/// its low bits. Buckets split on overflow and merge back when they empty.
pub struct DiskExtendibleHashTable<K: HashKey> {
    index_name: String,
    bpm: ArcBufferPool,
    hash_fn: HashFunction<K>,
    header_page_id: PageId,
    directory_max_depth: u32,
    bucket_max_size: usize,
}

impl<K: HashKey> DiskExtendibleHashTable<K> {
    pub fn new(
        index_name: String,
        bpm: ArcBufferPool,
        header_max_depth: u32,
        directory_max_depth: u32,
        bucket_max_size: usize,
        hash_fn: HashFunction<K>,
    ) -> Result<Self> {
        assert!(header_max_depth <= HASH_HEADER_MAX_DEPTH);
        assert!(directory_max_depth <= HASH_DIRECTORY_MAX_DEPTH);

        let mut header = BufferPoolManager::new_page_guarded(&bpm)?.upgrade_write();
        header
            .view_mut::<HashHeaderPageData>()
            .init(header_max_depth);
        let header_page_id = header.page_id();
        drop(header);

        Ok(Self {
            index_name,
            bpm,
            hash_fn,
            header_page_id,
            directory_max_depth,
            bucket_max_size,
        })
    }

    /// Reopens an index whose header already exists on disk.
    pub fn fetch(
        index_name: String,
        bpm: ArcBufferPool,
        header_page_id: PageId,
        directory_max_depth: u32,
        bucket_max_size: usize,
        hash_fn: HashFunction<K>,
    ) -> Self {
        Self {
            index_name,
            bpm,
            hash_fn,
            header_page_id,
            directory_max_depth,
            bucket_max_size,
        }
    }

    pub fn name(&self) -> &str {
        &self.index_name
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    fn hash(&self, key: &K) -> u32 {
        self.hash_fn.hash(key)
    }

    /// Latch-crabbed read: each parent guard drops before the child is
    /// probed.
    pub fn get_value(&self, key: &K) -> Result<Option<Rid>> {
        let hash = self.hash(key);

        let header = BufferPoolManager::fetch_page_read(&self.bpm, self.header_page_id)?;
        let header_page = header.view::<HashHeaderPageData>();
        let directory_id =
            header_page.directory_page_id(header_page.hash_to_directory_index(hash));
        drop(header);
        if directory_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let directory = BufferPoolManager::fetch_page_read(&self.bpm, directory_id)?;
        let directory_page = directory.view::<HashDirectoryPageData>();
        let bucket_id =
            directory_page.bucket_page_id(directory_page.hash_to_bucket_index(hash));
        drop(directory);
        if bucket_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let bucket = BufferPoolManager::fetch_page_read(&self.bpm, bucket_id)?;
        Ok(bucket.view::<HashBucketPageData<K>>().lookup(key))
    }

    /// Unique-index scan: all RIDs stored under the key.
    pub fn scan_key(&self, key: &K) -> Result<Vec<Rid>> {
        Ok(self.get_value(key)?.into_iter().collect())
    }

    /// Inserts the pair, splitting buckets (and growing the directory) as
    /// needed. Duplicate keys and a full directory are errors.
    pub fn insert(&self, key: K, rid: Rid) -> Result<()> {
        let hash = self.hash(&key);

        let mut header = BufferPoolManager::fetch_page_write(&self.bpm, self.header_page_id)?;
        let directory_idx = header
            .view::<HashHeaderPageData>()
            .hash_to_directory_index(hash);
        let mut directory_id = header
            .view::<HashHeaderPageData>()
            .directory_page_id(directory_idx);

        if directory_id == INVALID_PAGE_ID {
            // first key under this prefix: one directory, one empty bucket
            let mut bucket = BufferPoolManager::new_page_guarded(&self.bpm)?.upgrade_write();
            bucket
                .view_mut::<HashBucketPageData<K>>()
                .init(self.bucket_max_size);
            let bucket_id = bucket.page_id();
            drop(bucket);

            let mut directory = BufferPoolManager::new_page_guarded(&self.bpm)?.upgrade_write();
            let directory_page = directory.view_mut::<HashDirectoryPageData>();
            directory_page.init(self.directory_max_depth);
            directory_page.set_bucket_page_id(0, bucket_id);
            directory_id = directory.page_id();
            drop(directory);

            header
                .view_mut::<HashHeaderPageData>()
                .set_directory_page_id(directory_idx, directory_id);
            printdbg!(
                "{}: created directory {directory_id} for prefix {directory_idx}",
                self.index_name
            );
        }

        let mut directory = BufferPoolManager::fetch_page_write(&self.bpm, directory_id)?;
        loop {
            let bucket_idx = directory
                .view::<HashDirectoryPageData>()
                .hash_to_bucket_index(hash);
            let bucket_id = directory
                .view::<HashDirectoryPageData>()
                .bucket_page_id(bucket_idx);
            let mut bucket = BufferPoolManager::fetch_page_write(&self.bpm, bucket_id)?;
            let bucket_page = bucket.view_mut::<HashBucketPageData<K>>();

            if bucket_page.lookup(&key).is_some() {
                bail!(Error::DuplicateKey(format!("{key:?}")));
            }
            if !bucket_page.is_full() {
                bucket_page.insert(key, rid);
                return Ok(());
            }

            self.split_bucket(&mut directory, &mut bucket, hash)?;
            // retry against the refreshed directory mapping
        }
    }

    /// Splits the full `bucket`. Grows the directory first when the
    /// bucket's prefix already spans the whole active range.
    fn split_bucket(
        &self,
        directory: &mut WritePageGuard,
        bucket: &mut WritePageGuard,
        hash: u32,
    ) -> Result<()> {
        let bucket_id = bucket.page_id();
        let directory_page = directory.view_mut::<HashDirectoryPageData>();
        let bucket_idx = directory_page.hash_to_bucket_index(hash);

        if directory_page.local_depth(bucket_idx) == directory_page.global_depth() {
            if directory_page.global_depth() == self.directory_max_depth {
                bail!(Error::DirectoryFull);
            }
            directory_page.incr_global_depth();
        }

        let mut new_bucket = BufferPoolManager::new_page_guarded(&self.bpm)?.upgrade_write();
        let new_bucket_id = new_bucket.page_id();
        let new_bucket_page = new_bucket.view_mut::<HashBucketPageData<K>>();
        new_bucket_page.init(self.bucket_max_size);

        let local_depth = directory_page.local_depth(directory_page.hash_to_bucket_index(hash));
        let split_bit = 1u32 << local_depth;

        for i in 0..directory_page.size() {
            if directory_page.bucket_page_id(i) == bucket_id {
                directory_page.incr_local_depth(i);
                if i as u32 & split_bit != 0 {
                    directory_page.set_bucket_page_id(i, new_bucket_id);
                }
            }
        }

        let bucket_page = bucket.view_mut::<HashBucketPageData<K>>();
        let entries = bucket_page.take_entries();
        for (k, v) in entries {
            let target = if self.hash(&k) & split_bit != 0 {
                &mut *new_bucket_page
            } else {
                &mut *bucket_page
            };
            assert!(target.insert(k, v), "rehashed entry must fit");
        }

        printdbg!(
            "{}: split bucket {bucket_id} into {new_bucket_id} at depth {}",
            self.index_name,
            local_depth + 1
        );
        Ok(())
    }

    /// Removes the key if present. An emptied bucket is merged with its
    /// split image, cascading while images keep emptying.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let hash = self.hash(key);

        let mut header = BufferPoolManager::fetch_page_write(&self.bpm, self.header_page_id)?;
        let directory_idx = header
            .view::<HashHeaderPageData>()
            .hash_to_directory_index(hash);
        let directory_id = header
            .view::<HashHeaderPageData>()
            .directory_page_id(directory_idx);
        if directory_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let mut directory = BufferPoolManager::fetch_page_write(&self.bpm, directory_id)?;
        let bucket_idx = directory
            .view::<HashDirectoryPageData>()
            .hash_to_bucket_index(hash);
        let bucket_id = directory
            .view::<HashDirectoryPageData>()
            .bucket_page_id(bucket_idx);
        if bucket_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let mut bucket = BufferPoolManager::fetch_page_write(&self.bpm, bucket_id)?;
        if !bucket.view_mut::<HashBucketPageData<K>>().remove(key) {
            return Ok(false);
        }

        if bucket.view::<HashBucketPageData<K>>().is_empty() {
            self.merge_bucket(&mut header, directory, bucket, directory_idx, hash)?;
        }
        Ok(true)
    }

    /// Folds an empty bucket into its split image and shrinks the
    /// directory when every local depth allows it. At global depth 0 the
    /// last empty bucket takes the whole directory down with it.
    fn merge_bucket(
        &self,
        header: &mut WritePageGuard,
        mut directory: WritePageGuard,
        mut bucket: WritePageGuard,
        directory_idx: usize,
        hash: u32,
    ) -> Result<()> {
        let directory_id = directory.page_id();
        loop {
            let bucket_id = bucket.page_id();
            let directory_page = directory.view_mut::<HashDirectoryPageData>();

            if directory_page.global_depth() == 0 {
                header
                    .view_mut::<HashHeaderPageData>()
                    .set_directory_page_id(directory_idx, INVALID_PAGE_ID);
                drop(bucket);
                drop(directory);
                self.bpm.lock().delete_page(bucket_id)?;
                self.bpm.lock().delete_page(directory_id)?;
                printdbg!("{}: dropped directory {directory_id}", self.index_name);
                return Ok(());
            }

            let bucket_idx = directory_page.hash_to_bucket_index(hash);
            let image_idx =
                directory_page.split_image_index(bucket_idx, directory_page.global_depth());
            if directory_page.local_depth(bucket_idx) != directory_page.local_depth(image_idx) {
                // folding here would break the shared-prefix invariant
                return Ok(());
            }
            let image_id = directory_page.bucket_page_id(image_idx);

            for i in 0..directory_page.size() {
                if directory_page.bucket_page_id(i) == bucket_id {
                    directory_page.set_bucket_page_id(i, image_id);
                    directory_page.decr_local_depth(i);
                } else if directory_page.bucket_page_id(i) == image_id {
                    directory_page.decr_local_depth(i);
                }
            }
            if directory_page.can_shrink() {
                directory_page.decr_global_depth();
            }

            drop(bucket);
            self.bpm.lock().delete_page(bucket_id)?;
            printdbg!(
                "{}: merged bucket {bucket_id} into {image_id}",
                self.index_name
            );

            let image = BufferPoolManager::fetch_page_write(&self.bpm, image_id)?;
            if !image.view::<HashBucketPageData<K>>().is_empty() {
                return Ok(());
            }
            bucket = image;
        }
    }

    /// Walks the whole structure checking the directory invariants and
    /// that every stored key lives under its own hash prefix.
    pub fn verify_integrity(&self) -> Result<()> {
        let header = BufferPoolManager::fetch_page_read(&self.bpm, self.header_page_id)?;
        let header_page = header.view::<HashHeaderPageData>();

        for directory_idx in 0..header_page.max_size() {
            let directory_id = header_page.directory_page_id(directory_idx);
            if directory_id == INVALID_PAGE_ID {
                continue;
            }
            let directory = BufferPoolManager::fetch_page_read(&self.bpm, directory_id)?;
            let directory_page = directory.view::<HashDirectoryPageData>();
            directory_page.verify_integrity();

            for i in 0..directory_page.size() {
                let bucket_id = directory_page.bucket_page_id(i);
                if bucket_id == INVALID_PAGE_ID {
                    continue;
                }
                let mask = (1u32 << directory_page.local_depth(i)) - 1;
                let bucket = BufferPoolManager::fetch_page_read(&self.bpm, bucket_id)?;
                let bucket_page = bucket.view::<HashBucketPageData<K>>();
                for e in 0..bucket_page.size() {
                    let key_hash = self.hash(&bucket_page.key_at(e));
                    assert_eq!(
                        key_hash & mask,
                        i as u32 & mask,
                        "key hashed to the wrong bucket"
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::tests::test_arc_bpm;
    use crate::pages::hash_directory_page::HashDirectoryPageData;
    use rand::seq::SliceRandom;
    use rand::thread_rng;

    fn identity(k: &u32) -> u32 {
        *k
    }

    fn small_table(bpm: &ArcBufferPool) -> Result<DiskExtendibleHashTable<u32>> {
        DiskExtendibleHashTable::new(
            "test_index".into(),
            bpm.clone(),
            0, // one directory
            4,
            2,
            HashFunction::with(identity),
        )
    }

    #[test]
    fn test_insert_then_lookup() -> Result<()> {
        let bpm = test_arc_bpm(64);
        let table = small_table(&bpm)?;

        table.insert(1, Rid::new(9, 0))?;
        table.insert(2, Rid::new(9, 1))?;

        assert_eq!(table.get_value(&1)?, Some(Rid::new(9, 0)));
        assert_eq!(table.get_value(&2)?, Some(Rid::new(9, 1)));
        assert_eq!(table.get_value(&3)?, None);
        Ok(())
    }

    #[test]
    fn test_duplicate_key_fails() -> Result<()> {
        let bpm = test_arc_bpm(64);
        let table = small_table(&bpm)?;

        table.insert(1, Rid::new(9, 0))?;
        assert!(table.insert(1, Rid::new(9, 1)).is_err());
        assert_eq!(table.get_value(&1)?, Some(Rid::new(9, 0)));
        Ok(())
    }

    #[test]
    fn test_split_grows_directory() -> Result<()> {
        let bpm = test_arc_bpm(64);
        let table = small_table(&bpm)?;

        // two keys fill the first bucket, the third forces splits
        table.insert(0b00, Rid::new(9, 0))?;
        table.insert(0b10, Rid::new(9, 1))?;
        table.insert(0b100, Rid::new(9, 2))?;

        for (key, slot) in [(0b00u32, 0), (0b10, 1), (0b100, 2)] {
            assert_eq!(table.get_value(&key)?, Some(Rid::new(9, slot)));
        }

        // all three hashes are even, so the split had to go two levels
        let header = BufferPoolManager::fetch_page_read(&bpm, table.header_page_id())?;
        let directory_id = header.view::<HashHeaderPageData>().directory_page_id(0);
        drop(header);
        let directory = BufferPoolManager::fetch_page_read(&bpm, directory_id)?;
        assert_eq!(directory.view::<HashDirectoryPageData>().global_depth(), 2);
        drop(directory);

        table.verify_integrity()?;
        Ok(())
    }

    #[test]
    fn test_directory_full_rejects() -> Result<()> {
        let bpm = test_arc_bpm(64);
        let table = DiskExtendibleHashTable::new(
            "tiny".into(),
            bpm.clone(),
            0,
            1, // at most two buckets
            1, // one entry each
            HashFunction::with(identity),
        )?;

        table.insert(0, Rid::new(9, 0))?;
        table.insert(1, Rid::new(9, 1))?;
        // both buckets full and the directory can't grow
        assert!(table.insert(2, Rid::new(9, 2)).is_err());
        Ok(())
    }

    #[test]
    fn test_remove_merges_back() -> Result<()> {
        let bpm = test_arc_bpm(64);
        let table = small_table(&bpm)?;

        table.insert(0b00, Rid::new(9, 0))?;
        table.insert(0b10, Rid::new(9, 1))?;
        table.insert(0b100, Rid::new(9, 2))?;

        assert!(table.remove(&0b10)?);
        assert!(!table.remove(&0b10)?);
        assert_eq!(table.get_value(&0b10)?, None);
        assert_eq!(table.get_value(&0b100)?, Some(Rid::new(9, 2)));
        table.verify_integrity()?;

        assert!(table.remove(&0b00)?);
        assert!(table.remove(&0b100)?);
        table.verify_integrity()?;
        Ok(())
    }

    #[test]
    fn test_last_remove_clears_header_slot() -> Result<()> {
        let bpm = test_arc_bpm(64);
        let table = small_table(&bpm)?;

        table.insert(7, Rid::new(9, 0))?;
        assert!(table.remove(&7)?);

        let header = BufferPoolManager::fetch_page_read(&bpm, table.header_page_id())?;
        assert_eq!(
            header.view::<HashHeaderPageData>().directory_page_id(0),
            INVALID_PAGE_ID
        );
        drop(header);

        // the index keeps working from scratch
        table.insert(7, Rid::new(9, 1))?;
        assert_eq!(table.get_value(&7)?, Some(Rid::new(9, 1)));
        Ok(())
    }

    #[test]
    fn test_randomized_workload() -> Result<()> {
        let bpm = test_arc_bpm(256);
        let table = DiskExtendibleHashTable::new(
            "random".into(),
            bpm.clone(),
            2,
            6,
            4,
            HashFunction::default(),
        )?;

        let mut keys: Vec<u32> = (0..300).collect();
        keys.shuffle(&mut thread_rng());

        for &k in &keys {
            table.insert(k, Rid::new(2, k as u16))?;
        }
        table.verify_integrity()?;
        for &k in &keys {
            assert_eq!(table.get_value(&k)?, Some(Rid::new(2, k as u16)));
        }

        let (gone, kept) = keys.split_at(150);
        for &k in gone {
            assert!(table.remove(&k)?);
        }
        table.verify_integrity()?;
        for &k in gone {
            assert_eq!(table.get_value(&k)?, None);
        }
        for &k in kept {
            assert_eq!(table.get_value(&k)?, Some(Rid::new(2, k as u16)));
        }
        Ok(())
    }
}

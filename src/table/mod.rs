pub mod table_iterator;

use anyhow::{bail, Result};
use parking_lot::Mutex;

use crate::buffer_pool::{ArcBufferPool, BufferPoolManager};
use crate::errors::Error;
use crate::pages::table_page::{TablePageData, MAX_TUPLE_SIZE};
use crate::pages::PageId;
use crate::printdbg;
use crate::tuple::{Entry, Rid, Tuple, TupleMeta};

pub use table_iterator::TableIterator;

/// Linked sequence of slotted pages. Appends go to the last page; a full
/// page links a fresh one. Slots are never reclaimed here, MVCC GC works
/// above the heap.
pub struct TableHeap {
    bpm: ArcBufferPool,
    first_page: PageId,
    last_page: Mutex<PageId>,
}

impl TableHeap {
    pub fn new(bpm: ArcBufferPool) -> Result<Self> {
        let mut guard = BufferPoolManager::new_page_guarded(&bpm)?.upgrade_write();
        guard.view_mut::<TablePageData>().init();
        let first_page = guard.page_id();
        drop(guard);

        Ok(Self {
            bpm,
            first_page,
            last_page: Mutex::new(first_page),
        })
    }

    /// Reopens a heap whose pages already exist on disk.
    pub fn fetch(bpm: ArcBufferPool, first_page: PageId, last_page: PageId) -> Self {
        Self {
            bpm,
            first_page,
            last_page: Mutex::new(last_page),
        }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page
    }

    pub fn last_page_id(&self) -> PageId {
        *self.last_page.lock()
    }

    /// Appends `(meta, tuple)` and returns the new RID, or fails when the
    /// payload can't fit any page.
    pub fn insert_tuple(&self, meta: TupleMeta, tuple: &Tuple) -> Result<Rid> {
        if tuple.len() > MAX_TUPLE_SIZE {
            bail!(Error::TupleTooBig(MAX_TUPLE_SIZE, tuple.len()));
        }

        let mut last = self.last_page.lock();
        loop {
            let mut guard = BufferPoolManager::fetch_page_write(&self.bpm, *last)?;
            let page = guard.view_mut::<TablePageData>();
            if let Ok(slot) = page.insert_tuple(meta, tuple) {
                return Ok(Rid::new(*last, slot));
            }

            // page is full, link another one
            let mut new_guard = BufferPoolManager::new_page_guarded(&self.bpm)?.upgrade_write();
            new_guard.view_mut::<TablePageData>().init();
            let new_page_id = new_guard.page_id();
            drop(new_guard);

            guard.view_mut::<TablePageData>().set_next_page(new_page_id);
            printdbg!("table heap grew: page {} -> {}", *last, new_page_id);
            *last = new_page_id;
        }
    }

    pub fn get_tuple(&self, rid: Rid) -> Result<Entry> {
        let guard = BufferPoolManager::fetch_page_read(&self.bpm, rid.page_id)?;
        Ok(guard.view::<TablePageData>().get_tuple(rid.slot))
    }

    pub fn get_tuple_meta(&self, rid: Rid) -> Result<TupleMeta> {
        let guard = BufferPoolManager::fetch_page_read(&self.bpm, rid.page_id)?;
        Ok(guard.view::<TablePageData>().get_meta(rid.slot))
    }

    /// Overwrites the slot in place. The new payload must fit the space
    /// reserved when the tuple was first placed; executors that grow a
    /// tuple insert-then-delete instead.
    pub fn update_tuple_in_place(&self, meta: TupleMeta, tuple: &Tuple, rid: Rid) -> Result<()> {
        let mut guard = BufferPoolManager::fetch_page_write(&self.bpm, rid.page_id)?;
        guard
            .view_mut::<TablePageData>()
            .update_tuple_in_place(meta, tuple, rid.slot)
    }

    pub fn update_tuple_meta(&self, meta: TupleMeta, rid: Rid) -> Result<()> {
        let mut guard = BufferPoolManager::fetch_page_write(&self.bpm, rid.page_id)?;
        guard.view_mut::<TablePageData>().update_tuple_meta(meta, rid.slot);
        Ok(())
    }

    /// Walks every slot in page/slot order. Tombstones are yielded too;
    /// whether they matter is the reader's concern.
    pub fn iter(&self) -> TableIterator {
        TableIterator::new(self.bpm.clone(), self.first_page)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::buffer_pool::tests::test_arc_bpm;
    use crate::pages::table_page::SLOT_SIZE;
    use crate::pages::table_page::TABLE_PAGE_DATA_LEN;
    use crate::tuple::schema::{Field, Schema};
    use crate::types::{Types, Value};

    pub fn test_heap(pool_size: usize) -> Result<(ArcBufferPool, TableHeap)> {
        let bpm = test_arc_bpm(pool_size);
        let heap = TableHeap::new(bpm.clone())?;
        Ok((bpm, heap))
    }

    fn uint_schema() -> Schema {
        Schema::new(vec![Field::new("a", Types::UInt)])
    }

    #[test]
    fn test_insert_and_get() -> Result<()> {
        let (_bpm, heap) = test_heap(8)?;
        let schema = uint_schema();

        let tuple = Tuple::new(vec![Value::UInt(11)], &schema);
        let rid = heap.insert_tuple(TupleMeta::new(1, false), &tuple)?;

        let (meta, read) = heap.get_tuple(rid)?;
        assert_eq!(meta.ts, 1);
        assert_eq!(read.values(&schema), vec![Value::UInt(11)]);
        Ok(())
    }

    #[test]
    fn test_spills_to_new_pages() -> Result<()> {
        let (_bpm, heap) = test_heap(8)?;
        let schema = uint_schema();

        let tuple = Tuple::new(vec![Value::UInt(0)], &schema);
        let per_page = TABLE_PAGE_DATA_LEN / (SLOT_SIZE + tuple.len());

        for i in 0..per_page + 1 {
            let tuple = Tuple::new(vec![Value::UInt(i as u64)], &schema);
            heap.insert_tuple(TupleMeta::new(0, false), &tuple)?;
        }
        assert_ne!(heap.first_page_id(), heap.last_page_id());

        let count = heap.iter().count();
        assert_eq!(count, per_page + 1);

        // tuples come back in page/slot order
        let all: Vec<_> = heap.iter().collect();
        for (i, (_, (_, tuple))) in all.iter().enumerate() {
            assert_eq!(tuple.values(&schema), vec![Value::UInt(i as u64)]);
        }
        Ok(())
    }

    #[test]
    fn test_iterator_yields_tombstones() -> Result<()> {
        let (_bpm, heap) = test_heap(8)?;
        let schema = uint_schema();

        let t1 = heap.insert_tuple(
            TupleMeta::new(0, false),
            &Tuple::new(vec![Value::UInt(1)], &schema),
        )?;
        heap.insert_tuple(
            TupleMeta::new(0, false),
            &Tuple::new(vec![Value::UInt(2)], &schema),
        )?;

        heap.update_tuple_meta(TupleMeta::new(3, true), t1)?;

        let metas: Vec<bool> = heap.iter().map(|(_, (meta, _))| meta.is_deleted).collect();
        assert_eq!(metas, vec![true, false]);
        Ok(())
    }

    #[test]
    fn test_update_in_place() -> Result<()> {
        let (_bpm, heap) = test_heap(8)?;
        let schema = uint_schema();

        let rid = heap.insert_tuple(
            TupleMeta::new(0, false),
            &Tuple::new(vec![Value::UInt(1)], &schema),
        )?;

        heap.update_tuple_in_place(
            TupleMeta::new(7, false),
            &Tuple::new(vec![Value::UInt(9)], &schema),
            rid,
        )?;

        let (meta, tuple) = heap.get_tuple(rid)?;
        assert_eq!(meta.ts, 7);
        assert_eq!(tuple.values(&schema), vec![Value::UInt(9)]);
        Ok(())
    }
}

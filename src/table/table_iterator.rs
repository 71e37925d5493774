use crate::buffer_pool::{ArcBufferPool, BufferPoolManager};
use crate::pages::table_page::TablePageData;
use crate::pages::{PageId, INVALID_PAGE_ID};
use crate::tuple::{Entry, Rid};

/// Walks a heap slot by slot. Nothing is pinned between calls, so callers
/// may freely write to pages they've already passed (or are standing on).
pub struct TableIterator {
    bpm: ArcBufferPool,
    page_id: PageId,
    slot: u16,
}

impl TableIterator {
    pub(super) fn new(bpm: ArcBufferPool, first_page: PageId) -> Self {
        Self {
            bpm,
            page_id: first_page,
            slot: 0,
        }
    }
}

impl Iterator for TableIterator {
    type Item = (Rid, Entry);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.page_id == INVALID_PAGE_ID {
                return None;
            }
            let guard = BufferPoolManager::fetch_page_read(&self.bpm, self.page_id).ok()?;
            let page = guard.view::<TablePageData>();

            if (self.slot as usize) < page.num_tuples() {
                let rid = Rid::new(self.page_id, self.slot);
                let entry = page.get_tuple(self.slot);
                self.slot += 1;
                return Some((rid, entry));
            }

            self.page_id = page.next_page();
            self.slot = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use crate::table::tests::test_heap;
    use crate::tuple::schema::{Field, Schema};
    use crate::tuple::{Tuple, TupleMeta};
    use crate::types::{Types, Value};

    #[test]
    fn test_empty_heap() -> Result<()> {
        let (_bpm, heap) = test_heap(4)?;
        assert_eq!(heap.iter().next(), None);
        Ok(())
    }

    #[test]
    fn test_rids_match_slots() -> Result<()> {
        let (_bpm, heap) = test_heap(4)?;
        let schema = Schema::new(vec![Field::new("a", Types::Int)]);

        let mut rids = vec![];
        for i in 0..5 {
            let tuple = Tuple::new(vec![Value::Int(i)], &schema);
            rids.push(heap.insert_tuple(TupleMeta::new(0, false), &tuple)?);
        }

        let walked: Vec<_> = heap.iter().map(|(rid, _)| rid).collect();
        assert_eq!(walked, rids);
        Ok(())
    }

    #[test]
    fn test_writes_allowed_mid_scan() -> Result<()> {
        let (_bpm, heap) = test_heap(4)?;
        let schema = Schema::new(vec![Field::new("a", Types::Int)]);

        for i in 0..3 {
            let tuple = Tuple::new(vec![Value::Int(i)], &schema);
            heap.insert_tuple(TupleMeta::new(0, false), &tuple)?;
        }

        // marking tuples while standing on their page must not block
        for (rid, (meta, _)) in heap.iter() {
            heap.update_tuple_meta(TupleMeta::new(meta.ts, true), rid)?;
        }
        assert!(heap.iter().all(|(_, (meta, _))| meta.is_deleted));
        Ok(())
    }
}

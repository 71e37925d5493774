use anyhow::{bail, Result};

use super::{PageId, PagePayload, INVALID_PAGE_ID, PAGE_SIZE};
use crate::errors::Error;
use crate::tuple::{Tuple, TupleMeta};

pub const TABLE_PAGE_HEADER_SIZE: usize = 16;
pub const TABLE_PAGE_DATA_LEN: usize = PAGE_SIZE - TABLE_PAGE_HEADER_SIZE;
pub const SLOT_SIZE: usize = std::mem::size_of::<TupleSlot>();
/// Largest tuple a fresh page can take.
pub const MAX_TUPLE_SIZE: usize = TABLE_PAGE_DATA_LEN - SLOT_SIZE;

/// One entry of the slot array. `capacity` is the space reserved when the
/// tuple was first placed; in-place updates may shrink `len` but never
/// outgrow `capacity`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TupleSlot {
    pub offset: u16,
    pub capacity: u16,
    pub len: u16,
    _pad: u16,
    pub meta: TupleMeta,
}

/// Slotted table page: the slot array grows forward from the start of the
/// data area, tuple bytes grow backward from the end.
#[repr(C)]
pub struct TablePageData {
    next_page: PageId,
    num_tuples: u16,
    num_deleted: u16,
    free_end: u16,
    _pad: [u8; 6],
    data: [u8; TABLE_PAGE_DATA_LEN],
}

const _: () = assert!(std::mem::size_of::<TablePageData>() == PAGE_SIZE);
const _: () = assert!(SLOT_SIZE == 24);

unsafe impl PagePayload for TablePageData {}

impl TablePageData {
    /// Must run once on a freshly allocated page before any insert.
    pub fn init(&mut self) {
        self.next_page = INVALID_PAGE_ID;
        self.num_tuples = 0;
        self.num_deleted = 0;
        self.free_end = TABLE_PAGE_DATA_LEN as u16;
    }

    pub fn next_page(&self) -> PageId {
        self.next_page
    }

    pub fn set_next_page(&mut self, page_id: PageId) {
        self.next_page = page_id;
    }

    pub fn num_tuples(&self) -> usize {
        self.num_tuples as usize
    }

    pub fn num_deleted(&self) -> usize {
        self.num_deleted as usize
    }

    fn free_space(&self) -> usize {
        self.free_end as usize - self.num_tuples as usize * SLOT_SIZE
    }

    fn slot(&self, idx: usize) -> &TupleSlot {
        assert!(idx < self.num_tuples as usize, "slot {idx} out of bounds");
        unsafe { &*(self.data.as_ptr().add(idx * SLOT_SIZE) as *const TupleSlot) }
    }

    fn slot_mut(&mut self, idx: usize) -> &mut TupleSlot {
        assert!(idx < self.num_tuples as usize, "slot {idx} out of bounds");
        unsafe { &mut *(self.data.as_mut_ptr().add(idx * SLOT_SIZE) as *mut TupleSlot) }
    }

    /// Appends `tuple` and returns its slot number, or fails when the page
    /// can't fit another entry.
    pub fn insert_tuple(&mut self, meta: TupleMeta, tuple: &Tuple) -> Result<u16> {
        let len = tuple.len();
        if len > MAX_TUPLE_SIZE {
            bail!(Error::TupleTooBig(MAX_TUPLE_SIZE, len));
        }
        if self.free_space() < len + SLOT_SIZE {
            bail!(Error::Internal(format!(
                "page full: {} bytes left, {} needed",
                self.free_space(),
                len + SLOT_SIZE
            )));
        }

        let offset = self.free_end as usize - len;
        self.data[offset..offset + len].copy_from_slice(tuple.data());
        self.free_end = offset as u16;

        let idx = self.num_tuples as usize;
        self.num_tuples += 1;
        *self.slot_mut(idx) = TupleSlot {
            offset: offset as u16,
            capacity: len as u16,
            len: len as u16,
            _pad: 0,
            meta,
        };
        Ok(idx as u16)
    }

    pub fn get_tuple(&self, slot_idx: u16) -> (TupleMeta, Tuple) {
        let slot = self.slot(slot_idx as usize);
        let start = slot.offset as usize;
        let tuple = Tuple::from_bytes(&self.data[start..start + slot.len as usize]);
        (slot.meta, tuple)
    }

    pub fn get_meta(&self, slot_idx: u16) -> TupleMeta {
        self.slot(slot_idx as usize).meta
    }

    /// Overwrites a slot's payload and meta. The new payload must fit the
    /// space reserved at insert time.
    pub fn update_tuple_in_place(
        &mut self,
        meta: TupleMeta,
        tuple: &Tuple,
        slot_idx: u16,
    ) -> Result<()> {
        let slot = *self.slot(slot_idx as usize);
        if tuple.len() > slot.capacity as usize {
            bail!(Error::SlotTooSmall(slot.capacity as usize, tuple.len()));
        }
        let start = slot.offset as usize;
        self.data[start..start + tuple.len()].copy_from_slice(tuple.data());
        let slot = self.slot_mut(slot_idx as usize);
        slot.len = tuple.len() as u16;
        slot.meta = meta;
        Ok(())
    }

    pub fn update_tuple_meta(&mut self, meta: TupleMeta, slot_idx: u16) {
        let was_deleted = self.slot(slot_idx as usize).meta.is_deleted;
        let slot = self.slot_mut(slot_idx as usize);
        slot.meta = meta;
        if meta.is_deleted && !was_deleted {
            self.num_deleted += 1;
        } else if !meta.is_deleted && was_deleted {
            self.num_deleted -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::Page;
    use crate::tuple::schema::{Field, Schema};
    use crate::types::{Types, Value};

    fn page_view(page: &Page) -> &mut TablePageData {
        let buf = unsafe { page.data_mut() };
        let view = unsafe { &mut *(buf.as_mut_ptr() as *mut TablePageData) };
        view.init();
        view
    }

    fn uint_schema() -> Schema {
        Schema::new(vec![Field::new("a", Types::UInt)])
    }

    #[test]
    fn test_insert_then_get() -> anyhow::Result<()> {
        let page = Page::new();
        let view = page_view(&page);
        let schema = uint_schema();

        let tuple = Tuple::new(vec![Value::UInt(77)], &schema);
        let slot = view.insert_tuple(TupleMeta::new(3, false), &tuple)?;

        let (meta, read) = view.get_tuple(slot);
        assert_eq!(meta.ts, 3);
        assert!(!meta.is_deleted);
        assert_eq!(read.values(&schema), vec![Value::UInt(77)]);
        Ok(())
    }

    #[test]
    fn test_fill_page() -> anyhow::Result<()> {
        let page = Page::new();
        let view = page_view(&page);
        let schema = uint_schema();

        let tuple = Tuple::new(vec![Value::UInt(0)], &schema);
        let per_page = TABLE_PAGE_DATA_LEN / (SLOT_SIZE + tuple.len());

        for _ in 0..per_page {
            view.insert_tuple(TupleMeta::new(0, false), &tuple)?;
        }
        assert!(view.insert_tuple(TupleMeta::new(0, false), &tuple).is_err());
        assert_eq!(view.num_tuples(), per_page);
        Ok(())
    }

    #[test]
    fn test_update_in_place_respects_capacity() -> anyhow::Result<()> {
        let page = Page::new();
        let view = page_view(&page);
        let schema = Schema::new(vec![Field::new("s", Types::Str)]);

        let tuple = Tuple::new(vec![Value::Str("abcdef".into())], &schema);
        let slot = view.insert_tuple(TupleMeta::new(0, false), &tuple)?;

        let smaller = Tuple::new(vec![Value::Str("xy".into())], &schema);
        view.update_tuple_in_place(TupleMeta::new(1, false), &smaller, slot)?;
        let (meta, read) = view.get_tuple(slot);
        assert_eq!(meta.ts, 1);
        assert_eq!(read.values(&schema), vec![Value::Str("xy".into())]);

        let bigger = Tuple::new(vec![Value::Str("somewhat longer".into())], &schema);
        assert!(view
            .update_tuple_in_place(TupleMeta::new(2, false), &bigger, slot)
            .is_err());
        Ok(())
    }

    #[test]
    fn test_meta_tracks_deleted_count() -> anyhow::Result<()> {
        let page = Page::new();
        let view = page_view(&page);
        let schema = uint_schema();

        let tuple = Tuple::new(vec![Value::UInt(5)], &schema);
        let slot = view.insert_tuple(TupleMeta::new(0, false), &tuple)?;

        view.update_tuple_meta(TupleMeta::new(4, true), slot);
        assert_eq!(view.num_deleted(), 1);
        assert!(view.get_meta(slot).is_deleted);

        view.update_tuple_meta(TupleMeta::new(5, false), slot);
        assert_eq!(view.num_deleted(), 0);
        Ok(())
    }
}

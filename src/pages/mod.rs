pub(crate) mod latch;
pub(crate) mod hash_bucket_page;
pub(crate) mod hash_directory_page;
pub(crate) mod hash_header_page;
pub(crate) mod table_page;

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use latch::Latch;

pub const PAGE_SIZE: usize = 4096; // 4 KBs
pub const INVALID_PAGE_ID: PageId = 0;

pub type PageId = u32;
pub type PageBuf = [u8; PAGE_SIZE];

/// A page frame's contents: [`PAGE_SIZE`] bytes plus the in-memory header
/// (id, pin count, dirty flag, latch). Pages are shared between the pool
/// and guards through `Arc`; the byte buffer is only touched while holding
/// the latch (guards) or the pool mutex with pin count 0 (the pool itself).
///
/// The buffer comes first and the struct is 8-aligned so typed payload
/// views can sit directly over the bytes.
#[repr(C, align(8))]
#[derive(Debug)]
pub struct Page {
    data: UnsafeCell<PageBuf>,
    page_id: AtomicU32,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
    latch: Latch,
}

unsafe impl Send for Page {}
unsafe impl Sync for Page {}

impl Default for Page {
    fn default() -> Self {
        Page::new()
    }
}

impl Page {
    pub fn new() -> Self {
        Page {
            data: UnsafeCell::new([0u8; PAGE_SIZE]),
            page_id: AtomicU32::new(INVALID_PAGE_ID),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            latch: Latch::new(),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id.load(Ordering::Acquire)
    }

    pub(crate) fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id, Ordering::Release);
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    pub(crate) fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unpin(&self) -> u32 {
        self.pin_count.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    pub(crate) fn latch(&self) -> &Latch {
        &self.latch
    }

    /// # Safety
    /// Caller must hold the latch (shared is enough) or otherwise have
    /// exclusive access to the frame.
    pub(crate) unsafe fn data(&self) -> &PageBuf {
        &*self.data.get()
    }

    /// # Safety
    /// Caller must hold the exclusive latch or otherwise have exclusive
    /// access to the frame.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn data_mut(&self) -> &mut PageBuf {
        &mut *self.data.get()
    }

    /// Zero the buffer and clear the header. Only the pool calls this,
    /// while the frame is unmapped.
    pub(crate) fn reset(&self) {
        unsafe { self.data_mut() }.fill(0);
        self.page_id.store(INVALID_PAGE_ID, Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
    }
}

/// Marker for `#[repr(C)]` structs that reinterpret a page buffer. The
/// same bytes are viewed as a table page, a hash header, a directory or a
/// bucket depending on caller intent.
///
/// # Safety
/// Implementors must be `#[repr(C)]`, fit in [`PAGE_SIZE`], and be valid
/// for the all-zeroes bit pattern (a freshly reset page).
pub unsafe trait PagePayload: Sized {}

pub(crate) mod frame;
mod guards;
mod replacer;

use std::collections::{HashMap, LinkedList};
use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::FairMutex;

#[cfg(debug_assertions)]
use crate::get_caller_name;
use crate::disk_manager::DiskManager;
use crate::disk_scheduler::{DiskRequest, DiskScheduler};
use crate::errors::Error;
use crate::pages::{Page, PageId, PAGE_SIZE};
use crate::printdbg;
use frame::Frame;
use replacer::LruKReplacer;

pub use guards::{PageGuard, ReadPageGuard, WritePageGuard};

pub const DEFAULT_POOL_SIZE: usize = 1024;
pub const LRUK_REPLACER_K: usize = 2;

/// page 0 is invalid, page 1 holds the catalog snapshot
pub const CATALOG_PAGE_ID: PageId = 1;
const STARTING_PAGE_ID: PageId = 2;

pub type FrameId = usize;
pub type ArcBufferPool = Arc<FairMutex<BufferPoolManager>>;

/// Fixed array of frames fronting the disk. One mutex guards the whole
/// structure; I/O is waited for while holding it. Simplicity over
/// throughput.
pub struct BufferPoolManager {
    free_frames: LinkedList<FrameId>,
    page_table: HashMap<PageId, FrameId>,
    frames: Vec<Frame>,
    replacer: LruKReplacer,
    next_page_id: PageId,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    pub fn new(size: usize, path: &str) -> Self {
        let frames = (0..size).map(Frame::new).collect::<Vec<_>>();
        Self {
            free_frames: LinkedList::from_iter(0..size),
            page_table: HashMap::new(),
            frames,
            replacer: LruKReplacer::new(size, LRUK_REPLACER_K),
            next_page_id: STARTING_PAGE_ID,
            disk_scheduler: DiskScheduler::new(DiskManager::new(path)),
        }
    }

    pub fn new_arc(size: usize, path: &str) -> ArcBufferPool {
        Arc::new(FairMutex::new(Self::new(size, path)))
    }

    #[cfg(test)]
    pub fn inspect(&self) {
        println!("Free Frames: {:?}", self.free_frames);
        println!("Page Table: {:?}", self.page_table);
    }

    #[cfg(test)]
    pub fn get_pin_count(&self, page_id: &PageId) -> Option<u32> {
        let frame_id = *self.page_table.get(page_id)?;
        Some(self.frames[frame_id].page().pin_count())
    }

    #[cfg(test)]
    pub fn page_is_dirty(&self, page_id: &PageId) -> Option<bool> {
        let frame_id = *self.page_table.get(page_id)?;
        Some(self.frames[frame_id].page().is_dirty())
    }

    fn allocate_page_id(&mut self) -> PageId {
        let id = self.next_page_id;
        self.next_page_id += 1;
        id
    }

    fn schedule_write(&self, page: &Arc<Page>) {
        let data = Box::new(*unsafe { page.data() });
        let (callback, future) = DiskScheduler::create_promise();
        self.disk_scheduler.schedule(DiskRequest {
            is_write: true,
            data,
            page_id: page.page_id(),
            callback,
        });
        future.wait();
    }

    /// Free list first, eviction second. The evicted page is written back
    /// when dirty and unmapped.
    fn acquire_frame(&mut self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_frames.pop_front() {
            return Ok(frame_id);
        }
        let Some(frame_id) = self.replacer.evict() else {
            bail!(Error::NoFreeFrames);
        };
        let page = self.frames[frame_id].page();
        assert_eq!(page.pin_count(), 0, "evicted a pinned page");

        printdbg!(
            "Page {} (frame: {frame_id}) chosen for eviction, is dirty: {}",
            page.page_id(),
            page.is_dirty()
        );

        self.page_table.remove(&page.page_id());
        if page.is_dirty() {
            self.schedule_write(page);
            page.set_dirty(false);
        }
        Ok(frame_id)
    }

    fn install(&mut self, frame_id: FrameId, page_id: PageId) -> Result<Arc<Page>> {
        let page = self.frames[frame_id].page().clone();
        page.set_page_id(page_id);
        page.pin();
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false)?;
        self.page_table.insert(page_id, frame_id);
        Ok(page)
    }

    /// Allocates a fresh page id in a frame, pinned once. Fails when no
    /// frame is free and nothing is evictable.
    pub fn new_page(&mut self) -> Result<Arc<Page>> {
        let frame_id = self.acquire_frame()?;
        let page_id = self.allocate_page_id();

        self.frames[frame_id].page().reset();

        printdbg!("Created page {page_id} in frame {frame_id}");
        self.install(frame_id, page_id)
    }

    /// Pins the resident page, or reads it in through the scheduler.
    pub fn fetch_page(&mut self, page_id: PageId) -> Result<Arc<Page>> {
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            let page = self.frames[frame_id].page().clone();
            page.pin();
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false)?;

            printdbg!(
                "{} Fetched page {page_id} (frame: {frame_id}) with pin count {}",
                get_caller_name!(),
                page.pin_count()
            );
            return Ok(page);
        }

        let frame_id = self.acquire_frame()?;
        let (callback, future) = DiskScheduler::create_promise();
        self.disk_scheduler.schedule(DiskRequest {
            is_write: false,
            data: Box::new([0u8; PAGE_SIZE]),
            page_id,
            callback,
        });
        let (_, data) = future.wait();

        let frame = &self.frames[frame_id];
        frame.page().reset();
        unsafe { frame.page().data_mut() }.copy_from_slice(&*data);

        printdbg!(
            "{} Fetched page {page_id} from disk into frame {frame_id}",
            get_caller_name!()
        );
        self.install(frame_id, page_id)
    }

    /// Drops one pin; at zero the frame becomes evictable. The dirty flag
    /// is OR-ed in, never cleared here.
    pub fn unpin_page(&mut self, page_id: &PageId, is_dirty: bool) -> Result<()> {
        let Some(&frame_id) = self.page_table.get(page_id) else {
            bail!(Error::UnknownPage(*page_id));
        };
        let page = self.frames[frame_id].page();
        if page.pin_count() == 0 {
            bail!(Error::PinCountZero(*page_id));
        }
        if is_dirty {
            page.set_dirty(true);
        }
        let remaining = page.unpin();

        printdbg!(
            "{} page {page_id} (frame: {frame_id}) unpinned, pin count: {remaining}",
            get_caller_name!()
        );

        if remaining == 0 {
            self.replacer.set_evictable(frame_id, true)?;
        }
        Ok(())
    }

    /// Writes the page out and clears its dirty bit. Idempotent.
    pub fn flush_page(&mut self, page_id: &PageId) -> Result<()> {
        let Some(&frame_id) = self.page_table.get(page_id) else {
            bail!(Error::UnknownPage(*page_id));
        };
        let page = self.frames[frame_id].page();
        self.schedule_write(page);
        page.set_dirty(false);
        Ok(())
    }

    pub fn flush_all_pages(&mut self) -> Result<()> {
        let resident = self.page_table.values().copied().collect::<Vec<_>>();
        for frame_id in resident {
            let page = self.frames[frame_id].page();
            self.schedule_write(page);
            page.set_dirty(false);
        }
        Ok(())
    }

    /// Evicts a page from the pool entirely. Succeeds when the page isn't
    /// resident, fails when it is pinned.
    pub fn delete_page(&mut self, page_id: PageId) -> Result<()> {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return Ok(());
        };
        let page = self.frames[frame_id].page();
        if page.pin_count() > 0 {
            bail!(Error::PagePinned(page_id));
        }
        if page.is_dirty() {
            self.schedule_write(page);
        }
        self.replacer.remove(frame_id)?;
        self.page_table.remove(&page_id);
        self.frames[frame_id].page().reset();
        self.free_frames.push_back(frame_id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // guarded entry points

    pub fn new_page_guarded(bpm: &ArcBufferPool) -> Result<PageGuard> {
        let page = bpm.lock().new_page()?;
        Ok(PageGuard::new(bpm.clone(), page))
    }

    pub fn fetch_page_basic(bpm: &ArcBufferPool, page_id: PageId) -> Result<PageGuard> {
        let page = bpm.lock().fetch_page(page_id)?;
        Ok(PageGuard::new(bpm.clone(), page))
    }

    pub fn fetch_page_read(bpm: &ArcBufferPool, page_id: PageId) -> Result<ReadPageGuard> {
        Ok(Self::fetch_page_basic(bpm, page_id)?.upgrade_read())
    }

    pub fn fetch_page_write(bpm: &ArcBufferPool, page_id: PageId) -> Result<WritePageGuard> {
        Ok(Self::fetch_page_basic(bpm, page_id)?.upgrade_write())
    }
}

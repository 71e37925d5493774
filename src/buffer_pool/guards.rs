use std::sync::Arc;

use crate::pages::{Page, PageId, PagePayload};

use super::ArcBufferPool;

/// Scoped pin on a page, no latch. Dropping it unpins exactly once; a
/// moved-from guard is inert. Upgrade into a latched guard without a
/// second pin.
pub struct PageGuard {
    bpm: ArcBufferPool,
    page: Option<Arc<Page>>,
    is_dirty: bool,
}

impl PageGuard {
    pub(super) fn new(bpm: ArcBufferPool, page: Arc<Page>) -> Self {
        Self {
            bpm,
            page: Some(page),
            is_dirty: false,
        }
    }

    fn page(&self) -> &Arc<Page> {
        self.page.as_ref().expect("use of a dropped guard")
    }

    pub fn page_id(&self) -> PageId {
        self.page().page_id()
    }

    /// Typed view over the page bytes. Unlatched; only safe to rely on
    /// while no writer can exist (e.g. right after `new_page`).
    pub fn view<T: PagePayload>(&self) -> &T {
        unsafe { &*((*self.page().data()).as_ptr() as *const T) }
    }

    pub fn view_mut<T: PagePayload>(&mut self) -> &mut T {
        self.is_dirty = true;
        unsafe { &mut *((*self.page().data_mut()).as_mut_ptr() as *mut T) }
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    /// Takes the shared latch, consuming the pin into the new guard.
    pub fn upgrade_read(mut self) -> ReadPageGuard {
        let page = self.page.take().unwrap();
        page.latch().rlock();
        ReadPageGuard {
            inner: PageGuard {
                bpm: self.bpm.clone(),
                page: Some(page),
                is_dirty: self.is_dirty,
            },
        }
    }

    /// Takes the exclusive latch, consuming the pin into the new guard.
    pub fn upgrade_write(mut self) -> WritePageGuard {
        let page = self.page.take().unwrap();
        page.latch().wlock();
        WritePageGuard {
            inner: PageGuard {
                bpm: self.bpm.clone(),
                page: Some(page),
                is_dirty: self.is_dirty,
            },
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            // a failed unpin here is a bug in the guard itself
            self.bpm
                .lock()
                .unpin_page(&page.page_id(), self.is_dirty)
                .expect("guard unpin failed");
        }
    }
}

/// Pin + shared latch for the guard's lifetime. Unlatches, then unpins.
pub struct ReadPageGuard {
    inner: PageGuard,
}

impl ReadPageGuard {
    pub fn page_id(&self) -> PageId {
        self.inner.page_id()
    }

    pub fn view<T: PagePayload>(&self) -> &T {
        self.inner.view()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        if let Some(page) = &self.inner.page {
            page.latch().runlock();
        }
        // inner's drop unpins after the unlatch above
    }
}

/// Pin + exclusive latch for the guard's lifetime. Unlatches, then unpins.
pub struct WritePageGuard {
    inner: PageGuard,
}

impl WritePageGuard {
    pub fn page_id(&self) -> PageId {
        self.inner.page_id()
    }

    pub fn view<T: PagePayload>(&self) -> &T {
        self.inner.view()
    }

    pub fn view_mut<T: PagePayload>(&mut self) -> &mut T {
        self.inner.view_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        if let Some(page) = &self.inner.page {
            page.latch().wunlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_arc_bpm;
    use super::super::BufferPoolManager;
    use crate::pages::table_page::TablePageData;
    use anyhow::Result;

    #[test]
    fn test_guard_unpins_on_drop() -> Result<()> {
        let bpm = test_arc_bpm(2);

        let guard = BufferPoolManager::new_page_guarded(&bpm)?;
        let page_id = guard.page_id();
        assert_eq!(bpm.lock().get_pin_count(&page_id), Some(1));

        drop(guard);
        assert_eq!(bpm.lock().get_pin_count(&page_id), Some(0));
        Ok(())
    }

    #[test]
    fn test_upgrade_keeps_single_pin() -> Result<()> {
        let bpm = test_arc_bpm(2);

        let guard = BufferPoolManager::new_page_guarded(&bpm)?;
        let page_id = guard.page_id();

        let mut write = guard.upgrade_write();
        assert_eq!(bpm.lock().get_pin_count(&page_id), Some(1));
        write.view_mut::<TablePageData>().init();
        drop(write);

        assert_eq!(bpm.lock().get_pin_count(&page_id), Some(0));

        // the latch is free again
        let read = BufferPoolManager::fetch_page_read(&bpm, page_id)?;
        assert_eq!(read.view::<TablePageData>().num_tuples(), 0);
        Ok(())
    }

    #[test]
    fn test_shared_readers_coexist() -> Result<()> {
        let bpm = test_arc_bpm(2);

        let page_id = {
            let guard = BufferPoolManager::new_page_guarded(&bpm)?;
            guard.page_id()
        };

        let r1 = BufferPoolManager::fetch_page_read(&bpm, page_id)?;
        let r2 = BufferPoolManager::fetch_page_read(&bpm, page_id)?;
        assert_eq!(bpm.lock().get_pin_count(&page_id), Some(2));

        drop(r1);
        assert_eq!(bpm.lock().get_pin_count(&page_id), Some(1));
        drop(r2);
        assert_eq!(bpm.lock().get_pin_count(&page_id), Some(0));
        Ok(())
    }

    #[test]
    fn test_dirty_guard_marks_page() -> Result<()> {
        let bpm = test_arc_bpm(2);

        let guard = BufferPoolManager::new_page_guarded(&bpm)?;
        let page_id = guard.page_id();
        let mut write = guard.upgrade_write();
        write.view_mut::<TablePageData>().init();
        drop(write);

        assert_eq!(bpm.lock().page_is_dirty(&page_id), Some(true));
        Ok(())
    }
}

use std::sync::Arc;

use crate::pages::Page;

use super::FrameId;

/// A cell of the pool's frame array. At most one page lives in a frame;
/// the page itself is shared with guards through the `Arc`.
#[derive(Debug)]
pub struct Frame {
    id: FrameId,
    page: Arc<Page>,
}

impl Frame {
    pub fn new(id: FrameId) -> Self {
        Self {
            id,
            page: Arc::new(Page::new()),
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }
}

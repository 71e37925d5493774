use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::pages::{PageBuf, PageId, INVALID_PAGE_ID};

pub const DISK_STORAGE: &str = "data/data/";

#[cfg(test)]
pub fn test_path() -> String {
    use uuid::Uuid;

    let id = Uuid::new_v4();
    format!("data/test/test_{}/", id)
}

/// Blocking page I/O over a storage directory, one file per page id.
#[derive(Debug)]
pub struct DiskManager {
    path: PathBuf,
}

impl DiskManager {
    pub fn new(path: &str) -> Self {
        let path = Path::new(path);
        std::fs::create_dir_all(path).unwrap();
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn write_page(&self, page_id: PageId, buf: &PageBuf) -> Result<()> {
        if page_id == INVALID_PAGE_ID {
            return Err(anyhow!("Asked to write a page with invalid ID"));
        }

        let path = self.path.join(page_id.to_string());
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.write_all(buf)?;
        Ok(())
    }

    /// Reads a page into `buf`. A page that was never written reads back
    /// as zeroes, the same as a freshly allocated one.
    pub fn read_page(&self, page_id: PageId, buf: &mut PageBuf) -> Result<()> {
        if page_id == INVALID_PAGE_ID {
            return Err(anyhow!("Asked to read a page with invalid ID"));
        }

        let path = self.path.join(page_id.to_string());
        if !path.exists() {
            buf.fill(0);
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .read(true)
            .open(path)
            .context("file opened for reading")?;
        file.read_exact(buf)?;
        Ok(())
    }

    /// Whether the page has ever been written.
    pub fn page_exists(&self, page_id: PageId) -> bool {
        self.path.join(page_id.to_string()).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::PAGE_SIZE;
    use std::fs::remove_dir_all;

    #[test]
    fn test_write_then_read() -> Result<()> {
        let path = test_path();
        let disk = DiskManager::new(&path);

        let mut buf = [0u8; PAGE_SIZE];
        buf[0] = 0xAB;
        buf[PAGE_SIZE - 1] = 0xCD;
        disk.write_page(9999, &buf)?;

        let mut read = [0u8; PAGE_SIZE];
        disk.read_page(9999, &mut read)?;
        assert_eq!(read, buf);

        remove_dir_all(path)?;
        Ok(())
    }

    #[test]
    fn test_invalid_page_id() {
        let path = test_path();
        let disk = DiskManager::new(&path);

        let mut buf = [0u8; PAGE_SIZE];
        assert!(disk.read_page(INVALID_PAGE_ID, &mut buf).is_err());
        assert!(disk.write_page(INVALID_PAGE_ID, &buf).is_err());

        remove_dir_all(path).unwrap();
    }
}

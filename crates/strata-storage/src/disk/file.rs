//! File-backed disk manager.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use strata_common::PageId;

use super::error::{IoError, IoResult};
use super::manager::DiskManager;

/// Disk manager backed by a single data file.
///
/// Pages live at `page_id * page_size` offsets. The underlying file is
/// wrapped in a mutex, so reads and writes serialize; this is the simple
/// blocking backend the engine is specified against.
pub struct FileDiskManager {
    file: Mutex<File>,
    path: PathBuf,
    page_size: usize,
    shut_down: AtomicBool,
}

impl FileDiskManager {
    /// Opens (or creates) the data file at `path`.
    pub fn open(path: impl AsRef<Path>, page_size: usize) -> IoResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| IoError::open(&path, e))?;

        Ok(Self {
            file: Mutex::new(file),
            path,
            page_size,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Returns the path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the page size this manager was opened with.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn check_open(&self) -> IoResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            Err(IoError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn offset_of(&self, page_id: PageId) -> u64 {
        page_id.as_u64() * self.page_size as u64
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> IoResult<()> {
        self.check_open()?;
        debug_assert_eq!(buf.len(), self.page_size);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.offset_of(page_id)))?;

        // A page beyond the current end of file has never been written;
        // the tail past EOF reads back as zeroes.
        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        buf[total..].fill(0);
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> IoResult<()> {
        self.check_open()?;
        if buf.len() != self.page_size {
            return Err(IoError::short_write(self.page_size, buf.len()));
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.offset_of(page_id)))?;
        file.write_all(buf)?;
        file.flush()?;
        Ok(())
    }

    fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            // Best effort; there is nowhere to report the error during teardown.
            let _ = self.file.lock().sync_all();
        }
    }
}

impl std::fmt::Debug for FileDiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDiskManager")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PAGE_SIZE: usize = 4096;

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("data.db"), PAGE_SIZE).unwrap();

        let mut out = vec![0u8; PAGE_SIZE];
        out[..5].copy_from_slice(b"hello");
        disk.write_page(PageId::new(3), &out).unwrap();

        let mut buf = vec![0u8; PAGE_SIZE];
        disk.read_page(PageId::new(3), &mut buf).unwrap();
        assert_eq!(buf, out);
    }

    #[test]
    fn test_unwritten_page_reads_zeroes() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("data.db"), PAGE_SIZE).unwrap();

        let mut buf = vec![0xffu8; PAGE_SIZE];
        disk.read_page(PageId::new(9), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_wrong_buffer_size_rejected() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("data.db"), PAGE_SIZE).unwrap();

        let result = disk.write_page(PageId::new(0), &[0u8; 100]);
        assert!(matches!(result, Err(IoError::ShortIo { .. })));
    }

    #[test]
    fn test_shutdown_rejects_io() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("data.db"), PAGE_SIZE).unwrap();

        disk.shutdown();
        let mut buf = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            disk.read_page(PageId::new(0), &mut buf),
            Err(IoError::ShutDown)
        ));
    }
}

//! File-backed page store.
//!
//! One file per page under a single directory, named by zero-padded page id
//! with a `.page` suffix. Each file carries the raw payload followed by a
//! trailing CRC32 (little-endian), verified on every load.
//!
//! Saves are atomic: write to `<name>.tmp`, `sync_all`, rename over the
//! final name, then fsync the directory so the rename itself is durable.
//! A crash mid-save leaves either the old page or a stray `.tmp` file,
//! never a torn page.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crc32fast::Hasher as Crc32;
use tracing::{info, trace};

use super::{PageId, PageStore, PageStoreError};

const PAGE_SUFFIX: &str = "page";
const TMP_SUFFIX: &str = "tmp";
const CRC_LEN: usize = 4;

/// A [`PageStore`] keeping each page in its own checksummed file.
#[derive(Debug)]
pub struct FilePageStore {
    dir: PathBuf,
    next_id: AtomicU64,
}

impl FilePageStore {
    /// Opens (or creates) a page directory.
    ///
    /// Existing `.page` files are scanned to resume identifier allocation
    /// past the highest id already on disk. Stray `.tmp` files from an
    /// interrupted save are removed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, PageStoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut max_id: PageId = 0;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(TMP_SUFFIX) => {
                    let _ = fs::remove_file(&path);
                }
                Some(PAGE_SUFFIX) => {
                    if let Some(id) = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .and_then(|s| s.parse::<PageId>().ok())
                    {
                        max_id = max_id.max(id);
                    }
                }
                _ => {}
            }
        }

        info!(dir = %dir.display(), max_page_id = max_id, "page store opened");

        Ok(Self {
            dir,
            next_id: AtomicU64::new(max_id + 1),
        })
    }

    fn page_path(&self, page_id: PageId) -> PathBuf {
        self.dir.join(format!("{page_id:016}.{PAGE_SUFFIX}"))
    }

    fn fsync_dir(&self) -> Result<(), PageStoreError> {
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }
}

impl PageStore for FilePageStore {
    fn load_page(&self, page_id: PageId) -> Result<Vec<u8>, PageStoreError> {
        let path = self.page_path(page_id);
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PageStoreError::PageNotFound(page_id));
            }
            Err(e) => return Err(e.into()),
        };

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;

        if raw.len() < CRC_LEN {
            return Err(PageStoreError::Corrupted {
                page_id,
                reason: format!("file too short ({} bytes)", raw.len()),
            });
        }

        let payload_len = raw.len() - CRC_LEN;
        let mut stored = [0u8; CRC_LEN];
        stored.copy_from_slice(&raw[payload_len..]);
        let stored = u32::from_le_bytes(stored);

        let mut hasher = Crc32::new();
        hasher.update(&raw[..payload_len]);
        if hasher.finalize() != stored {
            return Err(PageStoreError::ChecksumMismatch { page_id });
        }

        raw.truncate(payload_len);
        trace!(page_id, bytes = raw.len(), "page loaded");
        Ok(raw)
    }

    fn save_page(&self, page_id: Option<PageId>, data: &[u8]) -> Result<PageId, PageStoreError> {
        let id = page_id.unwrap_or_else(|| self.next_id.fetch_add(1, Ordering::Relaxed));

        let mut hasher = Crc32::new();
        hasher.update(data);
        let checksum = hasher.finalize();

        let final_path = self.page_path(id);
        let tmp_path = final_path.with_extension(TMP_SUFFIX);
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(data)?;
            file.write_all(&checksum.to_le_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &final_path)?;
        self.fsync_dir()?;

        trace!(page_id = id, bytes = data.len(), "page saved");
        Ok(id)
    }
}

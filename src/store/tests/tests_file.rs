//! File store tests: durability across reopen, checksum verification, and
//! recovery from interrupted saves.

#[cfg(test)]
mod tests {
    use crate::store::{FilePageStore, PageStore, PageStoreError};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn save_then_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = FilePageStore::open(tmp.path()).unwrap();

        let id = store.save_page(None, b"hello pages").unwrap();
        assert_eq!(store.load_page(id).unwrap(), b"hello pages");
    }

    #[test]
    fn pages_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let id = {
            let store = FilePageStore::open(tmp.path()).unwrap();
            store.save_page(None, b"durable").unwrap()
        };

        let store = FilePageStore::open(tmp.path()).unwrap();
        assert_eq!(store.load_page(id).unwrap(), b"durable");

        // Identifier allocation resumes past what is on disk.
        let fresh = store.save_page(None, b"next").unwrap();
        assert!(fresh > id);
    }

    #[test]
    fn overwrite_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let store = FilePageStore::open(tmp.path()).unwrap();

        let id = store.save_page(None, b"v1").unwrap();
        store.save_page(Some(id), b"v2-longer-payload").unwrap();
        assert_eq!(store.load_page(id).unwrap(), b"v2-longer-payload");
    }

    #[test]
    fn missing_page_reported() {
        let tmp = TempDir::new().unwrap();
        let store = FilePageStore::open(tmp.path()).unwrap();
        let err = store.load_page(42).unwrap_err();
        assert!(matches!(err, PageStoreError::PageNotFound(42)));
    }

    #[test]
    fn flipped_bit_detected() {
        let tmp = TempDir::new().unwrap();
        let store = FilePageStore::open(tmp.path()).unwrap();
        let id = store.save_page(None, b"sensitive data").unwrap();

        // Corrupt one payload byte on disk.
        let path = tmp.path().join(format!("{id:016}.page"));
        let mut raw = fs::read(&path).unwrap();
        raw[0] ^= 0xFF;
        fs::write(&path, raw).unwrap();

        let err = store.load_page(id).unwrap_err();
        assert!(matches!(err, PageStoreError::ChecksumMismatch { page_id } if page_id == id));
    }

    #[test]
    fn truncated_file_reported_as_corrupted() {
        let tmp = TempDir::new().unwrap();
        let store = FilePageStore::open(tmp.path()).unwrap();
        let id = store.save_page(None, b"abc").unwrap();

        let path = tmp.path().join(format!("{id:016}.page"));
        fs::write(&path, [0u8; 2]).unwrap();

        let err = store.load_page(id).unwrap_err();
        assert!(matches!(err, PageStoreError::Corrupted { .. }));
    }

    #[test]
    fn stray_tmp_file_removed_on_open() {
        let tmp = TempDir::new().unwrap();
        {
            let store = FilePageStore::open(tmp.path()).unwrap();
            store.save_page(None, b"real").unwrap();
        }
        // Simulate a crash between write and rename.
        fs::write(tmp.path().join("0000000000000009.tmp"), b"garbage").unwrap();

        let _store = FilePageStore::open(tmp.path()).unwrap();
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}

//! Archive construction
//!
//! [`BundleWriter`] is the narrow seam between the assembler and the archive
//! format. A handle is opened, filled with named entries in any order, and
//! closed exactly once; `close` consumes the handle, and dropping an unclosed
//! handle releases everything it holds.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{BundleError, Result};

/// Builds an archive from named byte payloads
pub trait BundleWriter {
    type Handle;

    fn open(&self) -> Result<Self::Handle>;

    fn add_entry(&self, handle: &mut Self::Handle, name: &str, bytes: &[u8]) -> Result<()>;

    /// Finish the archive and return its bytes
    fn close(&self, handle: Self::Handle) -> Result<Vec<u8>>;
}

/// In-progress zip archive
pub struct ZipHandle {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    names: HashSet<String>,
}

/// Writes zip archives into memory
#[derive(Debug, Clone, Copy)]
pub struct ZipBundleWriter {
    compression: CompressionMethod,
}

impl ZipBundleWriter {
    pub fn new() -> Self {
        Self { compression: CompressionMethod::Deflated }
    }

    /// Store entries without compression
    pub fn stored() -> Self {
        Self { compression: CompressionMethod::Stored }
    }
}

impl Default for ZipBundleWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BundleWriter for ZipBundleWriter {
    type Handle = ZipHandle;

    fn open(&self) -> Result<ZipHandle> {
        Ok(ZipHandle {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            names: HashSet::new(),
        })
    }

    fn add_entry(&self, handle: &mut ZipHandle, name: &str, bytes: &[u8]) -> Result<()> {
        if name.is_empty() {
            return Err(BundleError::BundleWrite("entry name must not be empty".to_string()));
        }
        if !handle.names.insert(name.to_string()) {
            return Err(BundleError::BundleWrite(format!("duplicate entry {}", name)));
        }

        let options = SimpleFileOptions::default().compression_method(self.compression);
        handle.zip.start_file(name, options)?;
        handle
            .zip
            .write_all(bytes)
            .map_err(|e| BundleError::BundleWrite(format!("writing {}: {}", name, e)))?;

        tracing::debug!("Added bundle entry {} ({} bytes)", name, bytes.len());
        Ok(())
    }

    fn close(&self, handle: ZipHandle) -> Result<Vec<u8>> {
        let cursor = handle.zip.finish()?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    #[test]
    fn test_entries_in_any_order() {
        let writer = ZipBundleWriter::new();
        let mut handle = writer.open().unwrap();
        writer.add_entry(&mut handle, "z.txt", b"last").unwrap();
        writer.add_entry(&mut handle, "dir/a.txt", b"first").unwrap();
        let bytes = writer.close(handle).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut content = String::new();
        archive.by_name("dir/a.txt").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "first");
    }

    #[test]
    fn test_duplicate_entry_fails() {
        let writer = ZipBundleWriter::stored();
        let mut handle = writer.open().unwrap();
        writer.add_entry(&mut handle, "env", b"A=1").unwrap();
        let err = writer.add_entry(&mut handle, "env", b"A=2").unwrap_err();
        assert!(matches!(err, BundleError::BundleWrite(_)));
    }

    #[test]
    fn test_empty_archive_is_valid() {
        let writer = ZipBundleWriter::new();
        let handle = writer.open().unwrap();
        let bytes = writer.close(handle).unwrap();
        assert_eq!(ZipArchive::new(Cursor::new(bytes)).unwrap().len(), 0);
    }
}

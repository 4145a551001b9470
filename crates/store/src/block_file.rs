use crate::error::{Result, StoreError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Leaf I/O collaborator: a single binary file supporting typed fixed-size
/// reads and writes at arbitrary byte offsets.
///
/// All integers are stored little-endian. Exactly one open handle per file
/// is assumed; concurrent access must be serialized by the caller.
#[derive(Debug)]
pub struct BlockFile {
    file: Option<File>,
    path: PathBuf,
}

impl BlockFile {
    /// Create a brand-new file. Fails if the file already exists.
    pub fn create_new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        Ok(Self {
            file: Some(file),
            path,
        })
    }

    /// Open an existing file for reading and writing.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(Self {
            file: Some(file),
            path,
        })
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the handle. Safe to call when already closed.
    pub fn close(&mut self) {
        self.file = None;
    }

    fn handle(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(StoreError::NotOpen)
    }

    pub fn read_exact_at(&mut self, buf: &mut [u8], pos: u64) -> Result<()> {
        let file = self.handle()?;
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_all_at(&mut self, buf: &[u8], pos: u64) -> Result<()> {
        let file = self.handle()?;
        file.seek(SeekFrom::Start(pos))?;
        file.write_all(buf)?;
        Ok(())
    }

    pub fn read_u64(&mut self, pos: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact_at(&mut buf, pos)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn write_u64(&mut self, value: u64, pos: u64) -> Result<()> {
        self.write_all_at(&value.to_le_bytes(), pos)
    }

    pub fn read_i64(&mut self, pos: u64) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_exact_at(&mut buf, pos)?;
        Ok(i64::from_le_bytes(buf))
    }

    pub fn write_i64(&mut self, value: i64, pos: u64) -> Result<()> {
        self.write_all_at(&value.to_le_bytes(), pos)
    }
}

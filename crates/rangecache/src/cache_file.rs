//! Random-access cache file with a lazily positioned cursor.

use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// The single backing file of one engine.
///
/// The OS file cursor is only moved when it differs from the offset an operation needs,
/// so sequential hits and appends never issue a seek.
#[derive(Debug)]
pub(crate) struct CacheFile {
    file: Option<File>,
    path: PathBuf,
    /// Known OS cursor position; `None` after a failed operation.
    cursor: Option<u64>,
    len: u64,
}

impl CacheFile {
    pub(crate) fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Some(file),
            path: path.to_path_buf(),
            cursor: Some(0),
            len,
        })
    }

    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Read up to `buf.len()` bytes at `offset`; short only at end of file.
    pub(crate) fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.position(offset)?;
        let file = handle(&mut self.file)?;
        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.cursor = None;
                    return Err(e);
                }
            }
        }
        self.cursor = Some(offset + total as u64);
        Ok(total)
    }

    pub(crate) fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.position(offset)?;
        let file = handle(&mut self.file)?;
        if let Err(e) = file.write_all(data) {
            self.cursor = None;
            return Err(e);
        }
        let end = offset + data.len() as u64;
        self.cursor = Some(end);
        self.len = self.len.max(end);
        Ok(())
    }

    /// Drop all cached bytes.
    pub(crate) fn truncate(&mut self) -> io::Result<()> {
        handle(&mut self.file)?.set_len(0)?;
        self.len = 0;
        Ok(())
    }

    /// Flush and release the handle. Later operations fail.
    pub(crate) fn close(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(file) => file.sync_data(),
            None => Ok(()),
        }
    }

    fn position(&mut self, offset: u64) -> io::Result<()> {
        if self.cursor == Some(offset) {
            return Ok(());
        }
        let file = handle(&mut self.file)?;
        match file.seek(SeekFrom::Start(offset)) {
            Ok(pos) => {
                self.cursor = Some(pos);
                Ok(())
            }
            Err(e) => {
                self.cursor = None;
                Err(e)
            }
        }
    }
}

fn handle(file: &mut Option<File>) -> io::Result<&mut File> {
    file.as_mut()
        .ok_or_else(|| io::Error::other("cache file closed"))
}

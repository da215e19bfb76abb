use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use memmap2::MmapMut;
use tracing::debug;

use crate::error::Result;

mod bitmap;
mod pages;

pub use bitmap::Bitmap;
pub use pages::PageFile;

/// Index of a fixed-size slot in the data file.
pub type Slot = usize;

/// A file on disk that is mapped into memory as a whole.
///
/// Growing the file remaps it. Every byte keeps its offset, new space is only ever appended.
pub struct MappedFile {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
}

impl MappedFile {
    /// Opens or creates the file at `path` and maps it.
    /// Files smaller than `min_size` are extended with zeros first.
    pub fn open(path: &Path, min_size: usize) -> Result<MappedFile> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let file_size = file.metadata()?.len() as usize;
        if file_size < min_size {
            file.set_len(min_size as u64)?;
        }

        // SAFETY: map_mut is unsafe because the file could be changed by another process
        // while it is mapped. The store files are owned by a single store instance, and
        // the mapping never outlives the `File` it was created from.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(MappedFile {
            path: path.to_path_buf(),
            file,
            mmap,
        })
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Grows the file to contain at least the requested number of bytes.
    /// Returns whether the file had to be resized.
    pub fn grow(&mut self, requested_size: usize) -> Result<bool> {
        if requested_size <= self.mmap.len() {
            // Still enough space, no action required
            return Ok(false);
        }

        // Everything written through the old mapping must reach the file before it is replaced
        self.mmap.flush()?;
        self.file.set_len(requested_size as u64)?;

        // SAFETY: the old mapping is dropped by the assignment. `grow` takes `&mut self`,
        // so no slice of the old mapping can still be borrowed.
        self.mmap = unsafe { MmapMut::map_mut(&self.file)? };

        debug!(
            path = %self.path.display(),
            size = requested_size,
            "file.grow"
        );
        Ok(true)
    }

    /// Synchronously writes all modified pages back to the file.
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }
}

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Bitmap, MappedFile, Slot};
use crate::{error::Result, Error, StoreConfig};

/// A data file split into page-sized slots, each holding at most one document.
///
/// Slot `n` starts at byte `n * page_size`. Occupancy is tracked by a [`Bitmap`] in a
/// sibling `.idx` file, the data file itself has no header.
pub struct PageFile {
    file: MappedFile,
    bitmap: Bitmap,
    page_size: usize,
    grow_size: usize,
    growable: bool,
}

impl PageFile {
    /// Opens `<base>.dat` and `<base>.idx`, creating both if they don't exist.
    pub fn open(base: &Path, config: &StoreConfig) -> Result<PageFile> {
        let grow_size = config.aligned_data_grow_size();
        let file = MappedFile::open(&file_name(base, "dat"), grow_size)?;
        let bitmap = Bitmap::open(&file_name(base, "idx"), config)?;

        Ok(PageFile {
            file,
            bitmap,
            page_size: config.get_page_size(),
            grow_size,
            growable: config.is_growable(),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of slots that fit into the data file without growing it.
    pub fn capacity(&self) -> usize {
        self.file.len() / self.page_size
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.bitmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }

    pub fn has(&self, slot: Slot) -> bool {
        self.bitmap.has(slot)
    }

    /// Reserves the lowest free slot and makes sure the data file can hold it.
    pub fn allocate(&mut self) -> Result<Slot> {
        let Some(slot) = self.bitmap.add()? else {
            debug!(capacity = self.bitmap.capacity(), "pages.allocate.full");
            return Err(Error::StoreFull);
        };
        if let Err(e) = self.ensure_slot(slot) {
            self.bitmap.del(slot);
            debug!(slot, capacity = self.capacity(), "pages.allocate.full");
            return Err(e);
        }
        Ok(slot)
    }

    /// Writes a document into the slot and marks it occupied.
    pub fn set(&mut self, slot: Slot, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.page_size {
            return Err(Error::TooLarge {
                size: bytes.len(),
                limit: self.page_size,
            });
        }
        self.ensure_slot(slot)?;
        self.bitmap.reserve(slot)?;

        let occupied = self.bitmap.has(slot);
        let page = self.page_mut(slot);
        if occupied {
            // A shorter document must not keep the tail of the old one
            page.fill(0);
        }
        page[..bytes.len()].copy_from_slice(bytes);
        self.bitmap.set(slot)
    }

    /// Returns the document of an occupied slot without its zero padding.
    pub fn get(&self, slot: Slot) -> Option<&[u8]> {
        if !self.bitmap.has(slot) || slot >= self.capacity() {
            return None;
        }
        let page = self.page(slot);
        let end = page.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        Some(&page[..end])
    }

    /// Zero-fills the slot and marks it free.
    pub fn del(&mut self, slot: Slot) {
        if slot < self.capacity() {
            self.page_mut(slot).fill(0);
        }
        self.bitmap.del(slot);
    }

    /// Returns the occupied slots in ascending order.
    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        self.bitmap.all()
    }

    pub fn set_growable(&mut self, growable: bool) {
        self.growable = growable;
        self.bitmap.set_growable(growable);
    }

    pub fn flush(&self) -> Result<()> {
        self.file.flush()?;
        self.bitmap.flush()
    }

    /// Flushes both files and releases the mappings.
    pub fn close(self) -> Result<()> {
        self.flush()
    }

    fn page(&self, slot: Slot) -> &[u8] {
        let offset = slot * self.page_size;
        &self.file.bytes()[offset..offset + self.page_size]
    }

    fn page_mut(&mut self, slot: Slot) -> &mut [u8] {
        let offset = slot * self.page_size;
        &mut self.file.bytes_mut()[offset..offset + self.page_size]
    }

    /// Grows the data file in whole increments until it contains `slot`.
    fn ensure_slot(&mut self, slot: Slot) -> Result<()> {
        let required = (slot + 1) * self.page_size;
        if required <= self.file.len() {
            return Ok(());
        }
        if !self.growable {
            return Err(Error::StoreFull);
        }
        let missing = required - self.file.len();
        let increments = (missing + self.grow_size - 1) / self.grow_size;
        self.file.grow(self.file.len() + increments * self.grow_size)?;
        Ok(())
    }
}

/// Appends `.<extension>` to the base path. Dots already in the base name are kept.
pub(crate) fn file_name(base: &Path, extension: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

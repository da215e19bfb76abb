use std::path::Path;

use binary_layout::prelude::*;
use tracing::debug;

use super::{MappedFile, Slot};
use crate::{error::Result, Error, StoreConfig};

const MAGIC: u64 = u64::from_le_bytes(*b"MBTSIDX\0");
const VERSION: u32 = 1;

// First page of an index file, the bitmap itself starts at the next page.
define_layout!(index_header, LittleEndian, {
    magic: u64,
    version: u32,
    page_size: u32,
});

/// A persisted bit vector with one bit per slot, set if the slot is occupied.
///
/// The bitmap lives in its own memory-mapped file behind a header page.
/// Allocation always hands out the lowest free slot.
pub struct Bitmap {
    file: MappedFile,
    header_size: usize,
    grow_size: usize,
    growable: bool,
    used: usize,
    /// All bytes before this index have all bits set.
    hint: usize,
}

impl Bitmap {
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Bitmap> {
        let header_size = config.get_page_size();
        let grow_size = config.aligned_bitmap_grow_size();
        let mut file = MappedFile::open(path, header_size + grow_size)?;

        {
            let mut header = index_header::View::new(&mut file.bytes_mut()[..header_size]);
            if header.magic().read() == 0 {
                header.magic_mut().write(MAGIC);
                header.version_mut().write(VERSION);
                header.page_size_mut().write(header_size as u32);
            } else if header.magic().read() != MAGIC {
                return Err(Error::NotAnIndexFile(path.to_path_buf()));
            } else if header.version().read() != VERSION {
                return Err(Error::UnsupportedVersion(header.version().read()));
            } else if header.page_size().read() as usize != header_size {
                return Err(Error::PageSizeMismatch {
                    expected: header_size,
                    found: header.page_size().read() as usize,
                });
            }
        }

        let mut bitmap = Bitmap {
            file,
            header_size,
            grow_size,
            growable: config.is_growable(),
            used: 0,
            hint: 0,
        };
        bitmap.used = bitmap.used();
        Ok(bitmap)
    }

    fn bits(&self) -> &[u8] {
        &self.file.bytes()[self.header_size..]
    }

    fn bits_mut(&mut self) -> &mut [u8] {
        &mut self.file.bytes_mut()[self.header_size..]
    }

    /// Number of slots the bitmap can currently track.
    pub fn capacity(&self) -> usize {
        self.bits().len() * 8
    }

    pub fn has(&self, slot: Slot) -> bool {
        match self.bits().get(slot / 8) {
            Some(b) => b & (1 << (slot % 8)) != 0,
            None => false,
        }
    }

    /// Marks the lowest free slot as occupied and returns it.
    ///
    /// Returns `None` if all slots are occupied and the bitmap may not grow.
    pub fn add(&mut self) -> Result<Option<Slot>> {
        if self.used >= self.capacity() {
            if !self.growable {
                return Ok(None);
            }
            self.grow()?;
        }

        let Some(slot) = self.next_free() else {
            return Ok(None);
        };
        self.set(slot)?;
        Ok(Some(slot))
    }

    fn next_free(&mut self) -> Option<Slot> {
        let bits = self.bits();
        let start = self.hint.min(bits.len());
        let offset = bits[start..].iter().position(|b| b.count_ones() < 8)?;
        let index = start + offset;
        let slot = index * 8 + bits[index].trailing_ones() as usize;
        self.hint = index;
        Some(slot)
    }

    /// Marks the given slot as occupied, growing the bitmap if it is beyond the capacity.
    pub fn set(&mut self, slot: Slot) -> Result<()> {
        self.reserve(slot)?;
        let b = &mut self.bits_mut()[slot / 8];
        let mask = 1 << (slot % 8);
        if *b & mask == 0 {
            *b |= mask;
            self.used += 1;
        }
        Ok(())
    }

    /// Marks the given slot as free. Slots beyond the capacity are always free.
    pub fn del(&mut self, slot: Slot) {
        let index = slot / 8;
        let mask = 1 << (slot % 8);
        if let Some(b) = self.bits_mut().get_mut(index) {
            if *b & mask != 0 {
                *b &= !mask;
                self.used -= 1;
                self.hint = self.hint.min(index);
            }
        }
    }

    /// Returns the occupied slots in ascending order.
    pub fn all(&self) -> impl Iterator<Item = Slot> + '_ {
        self.bits()
            .iter()
            .enumerate()
            .filter(|(_, b)| **b != 0)
            .flat_map(|(i, b)| {
                (0..8)
                    .filter(move |bit| b & (1 << bit) != 0)
                    .map(move |bit| i * 8 + bit)
            })
    }

    /// Counts the occupied slots by summing the population count of every byte.
    ///
    /// `u8::count_ones` takes the place of a nibble lookup table. The result is
    /// recomputed from the mapped bytes, so it is also correct for a reopened file.
    pub fn used(&self) -> usize {
        self.bits().iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Number of occupied slots, maintained on every change.
    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Makes sure the bitmap can track `slot`, growing it in whole increments if needed.
    pub fn reserve(&mut self, slot: Slot) -> Result<()> {
        while slot >= self.capacity() {
            if !self.growable {
                return Err(Error::StoreFull);
            }
            self.grow()?;
        }
        Ok(())
    }

    /// Extends the bitmap region by one increment.
    pub fn grow(&mut self) -> Result<()> {
        let new_size = self.file.len() + self.grow_size;
        self.file.grow(new_size)?;
        debug!(capacity = self.capacity(), "bitmap.grow");
        Ok(())
    }

    pub fn set_growable(&mut self, growable: bool) {
        self.growable = growable;
    }

    pub fn flush(&self) -> Result<()> {
        self.file.flush()
    }
}

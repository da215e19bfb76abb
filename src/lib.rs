//! An embedded key/value store.
//!
//! Documents are stored as `[key, value]` JSON blobs, one per page-sized slot of a
//! memory-mapped data file. A bitmap in a second mapped file tracks which slots are
//! occupied, and an in-memory [`BtreeIndex`] maps every key to its slot. The index is
//! never written to disk: it is rebuilt from the occupied slots whenever a [`Store`]
//! is opened.
//!
//! ```rust
//! use mapped_btree_store::{Error, Store, StoreConfig};
//!
//! fn main() -> std::result::Result<(), Error> {
//!     let store = Store::temporary(StoreConfig::default().data_grow_size(1 << 16))?;
//!     store.add("bob", &vec![1, 2, 3])?;
//!     store.set("alice", &vec![4])?;
//!
//!     let bob: Vec<u32> = store.get("bob")?;
//!     assert_eq!(vec![1, 2, 3], bob);
//!
//!     let all: Vec<Vec<u32>> = store.all()?;
//!     assert_eq!(vec![vec![4], vec![1, 2, 3]], all);
//!     Ok(())
//! }
//! ```

mod btree;
pub mod codec;
mod error;
mod file;
pub mod query;
mod store;

pub use btree::{BtreeIndex, Iter, DEFAULT_ORDER};
pub use error::{Error, Result};
pub use file::{Bitmap, MappedFile, PageFile, Slot};
pub use query::Predicate;
pub use store::Store;

/// Page size used when the host page size can not be determined.
pub const FALLBACK_PAGE_SIZE: usize = 4096;

/// Initial size and growth increment of the data file (16 MiB).
pub const DEFAULT_DATA_GROW_SIZE: usize = 1 << 24;

/// Initial size and growth increment of the bitmap region (2^19 slots).
pub const DEFAULT_BITMAP_GROW_SIZE: usize = (1 << 19) / 8;

const MIN_PAGE_SIZE: usize = 512;

/// Configuration of the files backing a [`Store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    page_size: usize,
    data_grow_size: usize,
    bitmap_grow_size: usize,
    growable: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: host_page_size(),
            data_grow_size: DEFAULT_DATA_GROW_SIZE,
            bitmap_grow_size: DEFAULT_BITMAP_GROW_SIZE,
            growable: true,
        }
    }
}

impl StoreConfig {
    /// Size of a single slot in bytes. This is also the maximum size of an encoded document.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Initial size of the data file and the number of bytes it grows by when it is full.
    pub fn data_grow_size(mut self, data_grow_size: usize) -> Self {
        self.data_grow_size = data_grow_size;
        self
    }

    /// Initial size of the bitmap region and the number of bytes it grows by.
    ///
    /// Each byte of the bitmap tracks eight slots.
    pub fn bitmap_grow_size(mut self, bitmap_grow_size: usize) -> Self {
        self.bitmap_grow_size = bitmap_grow_size;
        self
    }

    /// Set to `false` to keep the files at their current size.
    /// Allocating a slot beyond the capacity then fails with [`Error::StoreFull`].
    pub fn growable(mut self, growable: bool) -> Self {
        self.growable = growable;
        self
    }

    pub fn get_page_size(&self) -> usize {
        self.page_size
    }

    pub fn is_growable(&self) -> bool {
        self.growable
    }

    /// Data file growth increment, rounded up to whole pages.
    pub(crate) fn aligned_data_grow_size(&self) -> usize {
        align(self.data_grow_size, self.page_size)
    }

    /// Bitmap growth increment, rounded up to whole pages.
    pub(crate) fn aligned_bitmap_grow_size(&self) -> usize {
        align(self.bitmap_grow_size, self.page_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size < MIN_PAGE_SIZE || !self.page_size.is_power_of_two() {
            return Err(Error::InvalidPageSize(self.page_size));
        }
        if self.data_grow_size == 0 {
            return Err(Error::GrowSizeTooSmall(self.data_grow_size));
        }
        if self.bitmap_grow_size == 0 {
            return Err(Error::GrowSizeTooSmall(self.bitmap_grow_size));
        }
        Ok(())
    }
}

/// Rounds `size` up to the next multiple of `page_size`, which must be a power of two.
/// A size of zero is rounded up to a single page.
pub(crate) fn align(size: usize, page_size: usize) -> usize {
    if size == 0 {
        return page_size;
    }
    (size + page_size - 1) & !(page_size - 1)
}

#[cfg(unix)]
fn host_page_size() -> usize {
    // SAFETY: sysconf only reads a system constant
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        FALLBACK_PAGE_SIZE
    }
}

#[cfg(not(unix))]
fn host_page_size() -> usize {
    FALLBACK_PAGE_SIZE
}

use std::{
    fs,
    path::{Path, PathBuf},
    str,
};

use parking_lot::RwLock;
use regex::bytes::Regex;
use serde::{de::DeserializeOwned, Serialize};
use tempfile::TempDir;
use tracing::{error, info, warn};

use crate::{
    btree::BtreeIndex,
    codec,
    error::Result,
    file::{PageFile, Slot},
    query::{self, Predicate},
    Error, StoreConfig,
};

struct Inner {
    index: BtreeIndex<Slot>,
    pages: PageFile,
}

/// A persistent key/value store.
///
/// Values are serialized together with their key into a single slot of the data file,
/// the in-memory index maps every key to its slot.
/// All operations of a store are guarded by one reader/writer lock, so a store can be
/// shared between threads, e.g. with an `Arc`.
pub struct Store {
    inner: RwLock<Inner>,
    path: PathBuf,
    _temp_dir: Option<TempDir>,
}

impl Store {
    /// Opens the store with the files `<path>.dat` and `<path>.idx`,
    /// using the default configuration.
    pub fn open(path: impl AsRef<Path>) -> Result<Store> {
        Self::open_with_config(path, StoreConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: StoreConfig) -> Result<Store> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut pages = PageFile::open(&path, &config)?;
        let index = rebuild_index(&mut pages)?;
        info!(
            path = %path.display(),
            documents = index.len(),
            capacity = pages.capacity(),
            "store.open"
        );

        Ok(Store {
            inner: RwLock::new(Inner { index, pages }),
            path,
            _temp_dir: None,
        })
    }

    /// Opens the store `name` inside the directory `root`, as `<root>/<name>/<name>.dat`.
    pub fn open_in(root: impl AsRef<Path>, name: &str, config: StoreConfig) -> Result<Store> {
        let dir = root.as_ref().join(name);
        fs::create_dir_all(&dir)?;
        Self::open_with_config(dir.join(name), config)
    }

    /// Opens an empty store in a temporary directory, which is deleted when the store is dropped.
    pub fn temporary(config: StoreConfig) -> Result<Store> {
        let dir = TempDir::new()?;
        let mut store = Self::open_in(dir.path(), "store", config)?;
        store._temp_dir = Some(dir);
        Ok(store)
    }

    /// Inserts a new document.
    ///
    /// Fails with [`Error::AlreadyExists`] if the key is already present,
    /// the stored value is not changed.
    pub fn add<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> Result<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if inner.index.contains_key(key.as_bytes()) {
            return Err(Error::AlreadyExists);
        }
        let doc = codec::encode(key, value, inner.pages.page_size())?;
        let slot = write_new(&mut inner.pages, &doc)?;
        inner.index.add(key.as_bytes(), slot);
        Ok(())
    }

    /// Inserts a document or replaces the value of an existing key.
    pub fn set<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> Result<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let doc = codec::encode(key, value, inner.pages.page_size())?;
        match inner.index.get(key.as_bytes()).copied() {
            Some(slot) => inner.pages.set(slot, &doc)?,
            None => {
                let slot = write_new(&mut inner.pages, &doc)?;
                inner.index.set(key.as_bytes(), slot);
            }
        }
        Ok(())
    }

    /// Returns the value of a key.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let inner = self.inner.read();
        let value = inner.value(key.as_bytes())?;
        codec::decode_value(value)
    }

    /// Deserializes the value of a key into `target`.
    pub fn get_into<T: DeserializeOwned>(&self, key: &str, target: &mut T) -> Result<()> {
        let inner = self.inner.read();
        let value = inner.value(key.as_bytes())?;
        codec::decode_into(value, target)
    }

    /// Returns the value of a key as it is stored, without deserializing it.
    pub fn get_raw(&self, key: &str) -> Result<Vec<u8>> {
        let inner = self.inner.read();
        Ok(inner.value(key.as_bytes())?.to_vec())
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.read().index.contains_key(key.as_bytes())
    }

    /// Removes a key and frees its slot.
    /// Returns `false` if the key did not exist.
    pub fn del(&self, key: &str) -> bool {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        match inner.index.del(key.as_bytes()) {
            Some(slot) => {
                inner.pages.del(slot);
                true
            }
            None => false,
        }
    }

    /// Returns all values, ordered by their key.
    pub fn all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let inner = self.inner.read();
        inner
            .values()
            .map(|value| value.and_then(codec::decode_value))
            .collect()
    }

    /// Deserializes the ordered sequence of all values into any collection type.
    pub fn all_into<C: DeserializeOwned>(&self) -> Result<C> {
        let inner = self.inner.read();
        let values = inner.values().collect::<Result<Vec<_>>>()?;
        codec::decode_value(&codec::join(values))
    }

    /// Returns the values of all documents matching the regular expression.
    ///
    /// The expression is matched against the whole stored document, key included.
    pub fn find<T: DeserializeOwned>(&self, pattern: &Regex) -> Result<Vec<T>> {
        let inner = self.inner.read();
        let mut result = Vec::new();
        for (key, slot) in inner.index.iter() {
            let doc = inner.pages.get(*slot).ok_or(Error::Corrupt(*slot))?;
            if pattern.is_match(doc) {
                result.push(codec::decode_value(value_of(doc, key, *slot)?)?);
            }
        }
        Ok(result)
    }

    /// Compiles `pattern` and returns the values of all documents matching it.
    pub fn find_str<T: DeserializeOwned>(&self, pattern: &str) -> Result<Vec<T>> {
        self.find(&Regex::new(pattern)?)
    }

    /// Returns the values that satisfy every predicate.
    pub fn query<T: DeserializeOwned>(&self, predicates: &[Predicate]) -> Result<Vec<T>> {
        let inner = self.inner.read();
        let mut result = Vec::new();
        for value in inner.values() {
            let value = value?;
            if query::matches_all(predicates, value)? {
                result.push(codec::decode_value(value)?);
            }
        }
        Ok(result)
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.inner.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().index.is_empty()
    }

    /// Allows or forbids the files to grow.
    /// Without growth, inserting beyond the current capacity fails with [`Error::StoreFull`].
    pub fn set_growable(&self, growable: bool) {
        self.inner.write().pages.set_growable(growable);
    }

    /// Writes all changes to disk.
    pub fn flush(&self) -> Result<()> {
        self.inner.read().pages.flush()
    }

    /// Flushes and closes the store.
    pub fn close(self) -> Result<()> {
        let inner = self.inner.into_inner();
        let documents = inner.index.len();
        inner.pages.close()?;
        info!(path = %self.path.display(), documents, "store.close");
        Ok(())
    }

    /// Base path of the store files, without extension.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Inner {
    fn value(&self, key: &[u8]) -> Result<&[u8]> {
        let slot = *self.index.get(key).ok_or(Error::NotFound)?;
        let doc = self.pages.get(slot).ok_or(Error::Corrupt(slot))?;
        value_of(doc, key, slot)
    }

    fn values(&self) -> impl Iterator<Item = Result<&[u8]>> + '_ {
        self.index.iter().map(move |(key, slot)| {
            let doc = self.pages.get(*slot).ok_or(Error::Corrupt(*slot))?;
            value_of(doc, key, *slot)
        })
    }
}

/// Cuts the value out of the document stored for `key`.
fn value_of<'a>(doc: &'a [u8], key: &[u8], slot: Slot) -> Result<&'a [u8]> {
    let key = str::from_utf8(key).map_err(|_| Error::Corrupt(slot))?;
    codec::decode(doc, codec::key_len(key))
}

/// Stores a document in a newly allocated slot.
fn write_new(pages: &mut PageFile, doc: &[u8]) -> Result<Slot> {
    let slot = pages.allocate()?;
    if let Err(e) = pages.set(slot, doc) {
        pages.del(slot);
        return Err(e);
    }
    Ok(slot)
}

/// Recovers the key of every occupied slot.
/// Of two slots holding the same key the lower one is kept and the other one is freed.
fn rebuild_index(pages: &mut PageFile) -> Result<BtreeIndex<Slot>> {
    let mut index = BtreeIndex::new();
    let slots: Vec<Slot> = pages.slots().collect();
    for slot in slots {
        let key = pages
            .get(slot)
            .ok_or(Error::Corrupt(slot))
            .and_then(codec::decode_key)
            .map_err(|err| {
                error!(slot, error = %err, "store.open.corrupt");
                Error::Corrupt(slot)
            })?;
        if !index.add(key.as_bytes(), slot) {
            warn!(slot, key = %key, "store.open.duplicate");
            pages.del(slot);
        }
    }
    Ok(index)
}

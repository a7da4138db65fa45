//! Adapters that turn a plain file store into the on-disk cache layout:
//! `DatasetRef` keys mapped to `{owner}/{name}.{ext}` paths, JSON-encoded
//! values, and appending records under their own `ref`.

use std::borrow::Borrow;
use std::marker::PhantomData;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::domain::{DatasetInfo, DatasetRef};
use crate::error::HaggleError;
use crate::store::{AutoMkDirs, FsRooted, FsStore, KeyedReader, KeyedStore};

/// Bidirectional key mapping applied at a store boundary.
pub trait KeyCodec {
    type Outer;
    type Inner: ?Sized + ToOwned;

    fn encode(&self, key: &Self::Outer) -> <Self::Inner as ToOwned>::Owned;

    /// `None` for inner keys that do not belong to the layout.
    fn decode(&self, key: &Self::Inner) -> Option<Self::Outer>;
}

/// `owner/name` ⇄ `owner/name.<extension>`.
#[derive(Debug, Clone, Copy)]
pub struct RefPath {
    extension: &'static str,
}

impl RefPath {
    pub const ZIP: RefPath = RefPath { extension: "zip" };
    pub const JSON: RefPath = RefPath { extension: "json" };
}

impl KeyCodec for RefPath {
    type Outer = DatasetRef;
    type Inner = Utf8Path;

    fn encode(&self, key: &DatasetRef) -> Utf8PathBuf {
        Utf8PathBuf::from(key.owner()).join(format!("{}.{}", key.name(), self.extension))
    }

    fn decode(&self, key: &Utf8Path) -> Option<DatasetRef> {
        let mut components = key.components();
        let owner = components.next()?.as_str();
        let file = components.next()?.as_str();
        if components.next().is_some() {
            return None;
        }
        let name = file.strip_suffix(self.extension)?.strip_suffix('.')?;
        DatasetRef::new(owner, name).ok()
    }
}

/// Store wrapper that exposes outer keys and talks inner keys to `S`.
#[derive(Debug, Clone)]
pub struct KeyMapped<S, C> {
    inner: S,
    codec: C,
}

impl<S, C> KeyMapped<S, C> {
    pub fn new(inner: S, codec: C) -> Self {
        Self { inner, codec }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }
}

impl<S: FsRooted, C> FsRooted for KeyMapped<S, C> {
    fn root(&self) -> &Utf8Path {
        self.inner.root()
    }
}

impl<V, S, C> KeyedReader<C::Outer, V> for KeyMapped<S, C>
where
    C: KeyCodec,
    S: KeyedReader<C::Inner, V>,
{
    fn get(&self, key: &C::Outer) -> Result<V, HaggleError> {
        let inner = self.codec.encode(key);
        let inner: &C::Inner = inner.borrow();
        self.inner.get(inner)
    }

    fn contains(&self, key: &C::Outer) -> Result<bool, HaggleError> {
        let inner = self.codec.encode(key);
        let inner: &C::Inner = inner.borrow();
        self.inner.contains(inner)
    }
}

impl<V, S, C> KeyedStore<C::Outer, V> for KeyMapped<S, C>
where
    C: KeyCodec,
    C::Outer: Clone,
    S: KeyedStore<C::Inner, V>,
{
    fn set(&self, key: &C::Outer, value: &V) -> Result<(), HaggleError> {
        let inner = self.codec.encode(key);
        let inner: &C::Inner = inner.borrow();
        self.inner.set(inner, value)
    }

    fn delete(&self, key: &C::Outer) -> Result<(), HaggleError> {
        let inner = self.codec.encode(key);
        let inner: &C::Inner = inner.borrow();
        self.inner.delete(inner)
    }

    /// Inner keys that do not decode are left out.
    fn keys(&self) -> Result<Vec<C::Outer>, HaggleError> {
        Ok(self
            .inner
            .keys()?
            .iter()
            .filter_map(|key| {
                let key: &C::Inner = key.borrow();
                self.codec.decode(key)
            })
            .collect())
    }
}

/// Values stored as pretty-printed JSON bytes.
#[derive(Debug, Clone)]
pub struct JsonValues<S, T> {
    inner: S,
    _value: PhantomData<fn() -> T>,
}

impl<S, T> JsonValues<S, T> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            _value: PhantomData,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: FsRooted, T> FsRooted for JsonValues<S, T> {
    fn root(&self) -> &Utf8Path {
        self.inner.root()
    }
}

impl<K, S, T> KeyedReader<K, T> for JsonValues<S, T>
where
    K: ?Sized,
    S: KeyedReader<K, Vec<u8>>,
    T: DeserializeOwned,
{
    fn get(&self, key: &K) -> Result<T, HaggleError> {
        let bytes = self.inner.get(key)?;
        serde_json::from_slice(&bytes).map_err(|err| HaggleError::Metadata(err.to_string()))
    }

    fn contains(&self, key: &K) -> Result<bool, HaggleError> {
        self.inner.contains(key)
    }
}

impl<K, S, T> KeyedStore<K, T> for JsonValues<S, T>
where
    K: ?Sized + ToOwned,
    S: KeyedStore<K, Vec<u8>>,
    T: Serialize + DeserializeOwned,
{
    fn set(&self, key: &K, value: &T) -> Result<(), HaggleError> {
        let bytes =
            serde_json::to_vec_pretty(value).map_err(|err| HaggleError::Metadata(err.to_string()))?;
        self.inner.set(key, &bytes)
    }

    fn delete(&self, key: &K) -> Result<(), HaggleError> {
        self.inner.delete(key)
    }

    fn keys(&self) -> Result<Vec<K::Owned>, HaggleError> {
        self.inner.keys()
    }
}

/// Writes records under the reference found in their own `ref` field.
pub trait AppendByRef: KeyedStore<DatasetRef, DatasetInfo> {
    fn append(&self, record: &DatasetInfo) -> Result<DatasetRef, HaggleError> {
        let reference = record.dataset_ref()?;
        self.set(&reference, record)?;
        Ok(reference)
    }

    /// Appends every record that carries a valid `ref`; the others are
    /// skipped with a warning. Returns how many were written.
    fn extend<'a, I>(&self, records: I) -> Result<usize, HaggleError>
    where
        I: IntoIterator<Item = &'a DatasetInfo>,
    {
        let mut written = 0;
        for record in records {
            match self.append(record) {
                Ok(_) => written += 1,
                Err(HaggleError::InvalidReference(reference)) => {
                    warn!(%reference, "skipping record with malformed ref");
                }
                Err(HaggleError::Metadata(message)) => {
                    warn!(%message, "skipping record without ref");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(written)
    }
}

impl<S: KeyedStore<DatasetRef, DatasetInfo> + ?Sized> AppendByRef for S {}

/// `<root>/<owner>/<name>.zip` holding raw archive bytes.
pub type ZipStore = KeyMapped<AutoMkDirs<FsStore>, RefPath>;

/// `<root>/<owner>/<name>.json` holding one metadata record each.
pub type MetaStore = KeyMapped<JsonValues<AutoMkDirs<FsStore>, DatasetInfo>, RefPath>;

pub fn zip_store(root: impl Into<Utf8PathBuf>) -> ZipStore {
    KeyMapped::new(AutoMkDirs::new(FsStore::new(root)), RefPath::ZIP)
}

pub fn meta_store(root: impl Into<Utf8PathBuf>) -> MetaStore {
    KeyMapped::new(
        JsonValues::new(AutoMkDirs::new(FsStore::new(root))),
        RefPath::JSON,
    )
}

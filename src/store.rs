use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::error::HaggleError;

/// Read side of a keyed mapping. Misses are reported as
/// [`HaggleError::NotFound`] (or [`HaggleError::DatasetNotFound`] for remote
/// readers).
pub trait KeyedReader<K: ?Sized, V> {
    fn get(&self, key: &K) -> Result<V, HaggleError>;

    fn contains(&self, key: &K) -> Result<bool, HaggleError> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// A mutable, enumerable keyed mapping.
pub trait KeyedStore<K: ?Sized + ToOwned, V>: KeyedReader<K, V> {
    fn set(&self, key: &K, value: &V) -> Result<(), HaggleError>;

    /// Removing a missing key is an error.
    fn delete(&self, key: &K) -> Result<(), HaggleError>;

    fn keys(&self) -> Result<Vec<K::Owned>, HaggleError>;
}

/// Access to the directory a filesystem-backed store lives in.
pub trait FsRooted {
    fn root(&self) -> &Utf8Path;
}

/// Raw bytes in files under a root directory, keyed by relative path.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: Utf8PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_of(&self, key: &Utf8Path) -> Result<Utf8PathBuf, HaggleError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

impl FsRooted for FsStore {
    fn root(&self) -> &Utf8Path {
        &self.root
    }
}

impl KeyedReader<Utf8Path, Vec<u8>> for FsStore {
    fn get(&self, key: &Utf8Path) -> Result<Vec<u8>, HaggleError> {
        let path = self.path_of(key)?;
        if !path.as_std_path().is_file() {
            return Err(HaggleError::NotFound(key.to_string()));
        }
        fs::read(path.as_std_path())
            .map_err(|err| HaggleError::Filesystem(format!("read {path}: {err}")))
    }

    fn contains(&self, key: &Utf8Path) -> Result<bool, HaggleError> {
        Ok(self.path_of(key)?.as_std_path().is_file())
    }
}

impl KeyedStore<Utf8Path, Vec<u8>> for FsStore {
    fn set(&self, key: &Utf8Path, value: &Vec<u8>) -> Result<(), HaggleError> {
        let path = self.path_of(key)?;
        write_bytes_atomic(&path, value)
    }

    fn delete(&self, key: &Utf8Path) -> Result<(), HaggleError> {
        let path = self.path_of(key)?;
        if !path.as_std_path().is_file() {
            return Err(HaggleError::NotFound(key.to_string()));
        }
        fs::remove_file(path.as_std_path())
            .map_err(|err| HaggleError::Filesystem(format!("remove {path}: {err}")))
    }

    /// Relative paths of every file under the root, sorted.
    fn keys(&self) -> Result<Vec<Utf8PathBuf>, HaggleError> {
        if !self.root.as_std_path().is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for path in walk_dir(self.root.as_std_path())? {
            if !path.is_file() {
                continue;
            }
            let Ok(path) = Utf8PathBuf::from_path_buf(path) else {
                continue;
            };
            if path.extension() == Some("tmp") {
                continue;
            }
            if let Ok(relative) = path.strip_prefix(&self.root) {
                keys.push(relative.to_path_buf());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Creates missing parent directories before every write.
#[derive(Debug, Clone)]
pub struct AutoMkDirs<S> {
    inner: S,
}

impl<S> AutoMkDirs<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: FsRooted> FsRooted for AutoMkDirs<S> {
    fn root(&self) -> &Utf8Path {
        self.inner.root()
    }
}

impl<V, S: KeyedReader<Utf8Path, V>> KeyedReader<Utf8Path, V> for AutoMkDirs<S> {
    fn get(&self, key: &Utf8Path) -> Result<V, HaggleError> {
        self.inner.get(key)
    }

    fn contains(&self, key: &Utf8Path) -> Result<bool, HaggleError> {
        self.inner.contains(key)
    }
}

impl<V, S> KeyedStore<Utf8Path, V> for AutoMkDirs<S>
where
    S: KeyedStore<Utf8Path, V> + FsRooted,
{
    fn set(&self, key: &Utf8Path, value: &V) -> Result<(), HaggleError> {
        validate_key(key)?;
        if let Some(parent) = self.inner.root().join(key).parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| HaggleError::Filesystem(format!("create {parent}: {err}")))?;
        }
        self.inner.set(key, value)
    }

    fn delete(&self, key: &Utf8Path) -> Result<(), HaggleError> {
        self.inner.delete(key)
    }

    fn keys(&self) -> Result<Vec<Utf8PathBuf>, HaggleError> {
        self.inner.keys()
    }
}

/// In-memory store, mostly useful as a stand-in for the filesystem.
#[derive(Debug, Default)]
pub struct MemoryStore<K, V> {
    entries: Mutex<BTreeMap<K, V>>,
}

impl<K: Ord, V> MemoryStore<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<K, V>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<K: Ord + ToString, V: Clone> KeyedReader<K, V> for MemoryStore<K, V> {
    fn get(&self, key: &K) -> Result<V, HaggleError> {
        self.lock()
            .get(key)
            .cloned()
            .ok_or_else(|| HaggleError::NotFound(key.to_string()))
    }

    fn contains(&self, key: &K) -> Result<bool, HaggleError> {
        Ok(self.lock().contains_key(key))
    }
}

impl<K: Ord + Clone + ToString, V: Clone> KeyedStore<K, V> for MemoryStore<K, V> {
    fn set(&self, key: &K, value: &V) -> Result<(), HaggleError> {
        self.lock().insert(key.clone(), value.clone());
        Ok(())
    }

    fn delete(&self, key: &K) -> Result<(), HaggleError> {
        self.lock()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| HaggleError::NotFound(key.to_string()))
    }

    fn keys(&self) -> Result<Vec<K>, HaggleError> {
        Ok(self.lock().keys().cloned().collect())
    }
}

/// Writes to a sibling temp file and renames it into place, so readers never
/// see a partial value.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), HaggleError> {
    let parent = path
        .parent()
        .ok_or_else(|| HaggleError::Filesystem(format!("invalid destination path {path}")))?;
    if !parent.as_std_path().is_dir() {
        return Err(HaggleError::Filesystem(format!(
            "directory does not exist: {parent}"
        )));
    }
    let mut temp = Builder::new()
        .prefix(".haggle-write")
        .suffix(".tmp")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| HaggleError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| HaggleError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| HaggleError::Filesystem(err.to_string()))?;
    Ok(())
}

fn validate_key(key: &Utf8Path) -> Result<(), HaggleError> {
    let is_valid = !key.as_str().is_empty()
        && key
            .components()
            .all(|component| matches!(component, Utf8Component::Normal(_)));
    if !is_valid {
        return Err(HaggleError::Filesystem(format!("invalid store key: {key}")));
    }
    Ok(())
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, HaggleError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| HaggleError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| HaggleError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

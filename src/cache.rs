use crate::error::HaggleError;
use crate::store::{KeyedReader, KeyedStore};

/// Read-through cache: a local `store` in front of a `source`.
///
/// A miss fetches from the source and writes the value to the store before
/// returning. With `return_source_data` off, the returned value is read back
/// from the store, so callers always see the stored representation.
/// Deleting and membership only ever touch the store.
#[derive(Debug, Clone)]
pub struct ReadThrough<S, T> {
    source: S,
    store: T,
    return_source_data: bool,
}

impl<S, T> ReadThrough<S, T> {
    pub fn new(source: S, store: T, return_source_data: bool) -> Self {
        Self {
            source,
            store,
            return_source_data,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &T {
        &self.store
    }
}

impl<K, V, S, T> KeyedReader<K, V> for ReadThrough<S, T>
where
    K: ?Sized + ToOwned,
    S: KeyedReader<K, V>,
    T: KeyedStore<K, V>,
{
    fn get(&self, key: &K) -> Result<V, HaggleError> {
        if self.store.contains(key)? {
            return self.store.get(key);
        }
        let value = self.source.get(key)?;
        self.store.set(key, &value)?;
        if self.return_source_data {
            Ok(value)
        } else {
            self.store.get(key)
        }
    }

    fn contains(&self, key: &K) -> Result<bool, HaggleError> {
        self.store.contains(key)
    }
}

impl<K, V, S, T> KeyedStore<K, V> for ReadThrough<S, T>
where
    K: ?Sized + ToOwned,
    S: KeyedReader<K, V>,
    T: KeyedStore<K, V>,
{
    fn set(&self, key: &K, value: &V) -> Result<(), HaggleError> {
        self.store.set(key, value)
    }

    fn delete(&self, key: &K) -> Result<(), HaggleError> {
        self.store.delete(key)
    }

    fn keys(&self) -> Result<Vec<K::Owned>, HaggleError> {
        self.store.keys()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;
    use crate::store::MemoryStore;

    /// Source that counts lookups and knows only even numbers.
    #[derive(Default)]
    struct Evens {
        calls: Mutex<usize>,
    }

    impl KeyedReader<u32, String> for Evens {
        fn get(&self, key: &u32) -> Result<String, HaggleError> {
            *self.calls.lock().unwrap() += 1;
            if key % 2 == 0 {
                Ok(format!("value-{key}"))
            } else {
                Err(HaggleError::DatasetNotFound(key.to_string()))
            }
        }
    }

    #[test]
    fn miss_fetches_once_then_serves_from_store() {
        let cache = ReadThrough::new(Evens::default(), MemoryStore::<u32, String>::new(), true);
        assert_eq!(cache.get(&2).unwrap(), "value-2");
        assert_eq!(cache.get(&2).unwrap(), "value-2");
        assert_eq!(*cache.source().calls.lock().unwrap(), 1);
        assert!(cache.contains(&2).unwrap());
    }

    #[test]
    fn failed_fetch_leaves_store_untouched() {
        let cache = ReadThrough::new(Evens::default(), MemoryStore::<u32, String>::new(), false);
        assert_matches!(cache.get(&3), Err(HaggleError::DatasetNotFound(_)));
        assert!(!cache.contains(&3).unwrap());
        assert!(cache.store().is_empty());
    }

    #[test]
    fn delete_only_touches_store() {
        let cache = ReadThrough::new(Evens::default(), MemoryStore::<u32, String>::new(), false);
        cache.get(&4).unwrap();
        cache.delete(&4).unwrap();
        assert!(!cache.contains(&4).unwrap());
        assert_eq!(cache.get(&4).unwrap(), "value-4");
        assert_eq!(*cache.source().calls.lock().unwrap(), 2);
    }
}

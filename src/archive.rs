use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;

use zip::ZipArchive;

use crate::error::HaggleError;
use crate::store::KeyedReader;

/// Read-only view of the files inside a zip held in memory.
///
/// Only the central directory is parsed up front; members are decompressed
/// when asked for.
#[derive(Clone)]
pub struct ArchiveView {
    bytes: Arc<[u8]>,
    archive: ZipArchive<Cursor<Arc<[u8]>>>,
    names: Vec<String>,
}

impl ArchiveView {
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self, HaggleError> {
        let bytes = bytes.into();
        let mut archive = ZipArchive::new(Cursor::new(Arc::clone(&bytes)))
            .map_err(|err| HaggleError::Archive(err.to_string()))?;

        let mut names = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive
                .by_index_raw(i)
                .map_err(|err| HaggleError::Archive(err.to_string()))?;
            if entry.is_dir() {
                continue;
            }
            if entry.enclosed_name().is_none() {
                return Err(HaggleError::Archive(
                    "zip entry path traversal detected".to_string(),
                ));
            }
            names.push(entry.name().to_string());
        }

        Ok(Self {
            bytes,
            archive,
            names,
        })
    }

    /// Member file names, in archive order. Directory entries are skipped.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decompresses every member once, checking the stored CRCs.
    pub fn validate(&self) -> Result<(), HaggleError> {
        for name in &self.names {
            self.get(name.as_str())?;
        }
        Ok(())
    }
}

impl KeyedReader<str, Vec<u8>> for ArchiveView {
    fn get(&self, name: &str) -> Result<Vec<u8>, HaggleError> {
        if !self.names.iter().any(|member| member == name) {
            return Err(HaggleError::NotFound(name.to_string()));
        }
        let mut archive = self.archive.clone();
        let mut entry = archive
            .by_name(name)
            .map_err(|err| HaggleError::Archive(err.to_string()))?;
        // The declared size comes from the archive itself, so it is not used as a hint.
        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|err| HaggleError::Archive(format!("{name}: {err}")))?;
        Ok(content)
    }

    fn contains(&self, name: &str) -> Result<bool, HaggleError> {
        Ok(self.names.iter().any(|member| member == name))
    }
}

impl fmt::Debug for ArchiveView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveView")
            .field("size", &self.bytes.len())
            .field("names", &self.names)
            .finish()
    }
}

use std::fs;

use camino::Utf8PathBuf;
use tempfile::{Builder, TempDir};
use tracing::{debug, info};

use crate::archive::ArchiveView;
use crate::domain::{DatasetInfo, DatasetRef};
use crate::error::HaggleError;
use crate::kaggle::KaggleClient;
use crate::store::KeyedReader;

/// Archive bytes straight from Kaggle, keyed by reference.
///
/// The download goes through a scratch directory unique to the request,
/// which is removed before `get` returns, whatever the outcome.
#[derive(Debug, Clone)]
pub struct RemoteArchives<C> {
    client: C,
    scratch_root: Option<Utf8PathBuf>,
}

impl<C: KaggleClient> RemoteArchives<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            scratch_root: None,
        }
    }

    /// Places scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn fetch(&self, reference: &DatasetRef) -> Result<Vec<u8>, HaggleError> {
        let scratch = self.scratch_dir(reference)?;
        info!(%reference, "downloading dataset");
        let start = std::time::Instant::now();
        let result = self
            .client
            .download(reference, scratch.path())
            .and_then(|path| {
                if !path.is_file() {
                    return Err(HaggleError::Download {
                        reference: reference.to_string(),
                        message: format!("no archive written at {}", path.display()),
                    });
                }
                fs::read(&path).map_err(|err| HaggleError::Download {
                    reference: reference.to_string(),
                    message: err.to_string(),
                })
            })
            .and_then(|bytes| checked_zip(reference, bytes));
        let cleanup = scratch.close().map_err(|err| HaggleError::Filesystem(format!(
            "failed to remove scratch directory: {err}"
        )));
        let bytes = result?;
        cleanup?;
        debug!(
            %reference,
            size = bytes.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "download complete"
        );
        Ok(bytes)
    }

    /// Fetches and decodes in memory, without touching any local store.
    pub fn open(&self, reference: &DatasetRef) -> Result<ArchiveView, HaggleError> {
        ArchiveView::from_bytes(self.fetch(reference)?)
    }

    fn scratch_dir(&self, reference: &DatasetRef) -> Result<TempDir, HaggleError> {
        let prefix = format!(".haggle-{}-{}-", reference.owner(), reference.name());
        let mut builder = Builder::new();
        builder.prefix(&prefix);
        let created = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root.as_std_path()),
            None => builder.tempdir(),
        };
        created.map_err(|err| HaggleError::Filesystem(format!("scratch directory: {err}")))
    }
}

/// Rejects bodies that are not a readable zip, so they never reach a cache.
fn checked_zip(reference: &DatasetRef, bytes: Vec<u8>) -> Result<Vec<u8>, HaggleError> {
    ArchiveView::from_bytes(bytes.as_slice())
        .and_then(|view| view.validate())
        .map_err(|err| HaggleError::Download {
            reference: reference.to_string(),
            message: format!("not a valid zip archive: {err}"),
        })?;
    Ok(bytes)
}

impl<C: KaggleClient> KeyedReader<DatasetRef, Vec<u8>> for RemoteArchives<C> {
    fn get(&self, key: &DatasetRef) -> Result<Vec<u8>, HaggleError> {
        self.fetch(key)
    }

    /// Asks for the metadata rather than downloading the archive.
    fn contains(&self, key: &DatasetRef) -> Result<bool, HaggleError> {
        match self.client.metadata(key) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Per-dataset metadata records straight from Kaggle.
#[derive(Debug, Clone)]
pub struct RemoteMetadata<C> {
    client: C,
}

impl<C: KaggleClient> RemoteMetadata<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn fetch(&self, reference: &DatasetRef) -> Result<DatasetInfo, HaggleError> {
        debug!(%reference, "fetching metadata");
        let mut record = self.client.metadata(reference)?;
        if record.reference().is_none() {
            record.set_reference(reference);
        }
        Ok(record)
    }
}

impl<C: KaggleClient> KeyedReader<DatasetRef, DatasetInfo> for RemoteMetadata<C> {
    fn get(&self, key: &DatasetRef) -> Result<DatasetInfo, HaggleError> {
        self.fetch(key)
    }
}

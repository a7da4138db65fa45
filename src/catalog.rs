use std::fmt;
use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::archive::ArchiveView;
use crate::cache::ReadThrough;
use crate::config::{self, DEFAULT_MAX_PAGES, DEFAULT_START_PAGE};
use crate::domain::{DatasetFilter, DatasetInfo, DatasetRef};
use crate::error::HaggleError;
use crate::kaggle::KaggleClient;
use crate::layout::{AppendByRef, KeyCodec, MetaStore, RefPath, ZipStore, meta_store, zip_store};
use crate::lister::DatasetLister;
use crate::remote::{RemoteArchives, RemoteMetadata};
use crate::store::{FsRooted, KeyedReader, KeyedStore};

pub type ArchiveCache<C> = ReadThrough<RemoteArchives<Arc<C>>, ZipStore>;
pub type MetaCache<C> = ReadThrough<RemoteMetadata<Arc<C>>, MetaStore>;

/// Decides whether a missing directory may be created.
pub trait ConfirmDir {
    fn confirm_create(&self, path: &Utf8Path) -> bool;
}

/// Creates directories without asking.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl ConfirmDir for AutoConfirm {
    fn confirm_create(&self, _path: &Utf8Path) -> bool {
        true
    }
}

impl<F: Fn(&Utf8Path) -> bool> ConfirmDir for F {
    fn confirm_create(&self, path: &Utf8Path) -> bool {
        self(path)
    }
}

#[derive(Debug, Clone)]
pub struct CatalogOptions {
    /// Persist the metadata of every search result.
    pub cache_metas_on_search: bool,
    pub start_page: u32,
    pub max_pages: u32,
    pub warn_if_more: bool,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            cache_metas_on_search: true,
            start_page: DEFAULT_START_PAGE,
            max_pages: DEFAULT_MAX_PAGES,
            warn_if_more: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CachedArchive {
    pub reference: DatasetRef,
    pub path: String,
    pub size: u64,
    pub modified: Option<String>,
}

/// Kaggle datasets by reference, cached under one root directory:
/// archives in `<root>/zips`, metadata in `<root>/meta`.
pub struct KaggleDatasets<C: KaggleClient> {
    rootdir: Utf8PathBuf,
    client: Arc<C>,
    archives: ArchiveCache<C>,
    meta: MetaCache<C>,
    options: CatalogOptions,
}

impl<C: KaggleClient> fmt::Debug for KaggleDatasets<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KaggleDatasets")
            .field("rootdir", &self.rootdir)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<C: KaggleClient> KaggleDatasets<C> {
    /// Default options; directories are created without asking.
    pub fn new(rootdir: Option<Utf8PathBuf>, client: C) -> Result<Self, HaggleError> {
        Self::open(rootdir, client, CatalogOptions::default(), &AutoConfirm)
    }

    pub fn open(
        rootdir: Option<Utf8PathBuf>,
        client: C,
        options: CatalogOptions,
        confirm: &dyn ConfirmDir,
    ) -> Result<Self, HaggleError> {
        let rootdir = config::resolve_rootdir(rootdir)?;
        ensure_dir(&rootdir, Some(confirm))?;
        let zips_dir = rootdir.join("zips");
        let meta_dir = rootdir.join("meta");
        ensure_dir(&zips_dir, None)?;
        ensure_dir(&meta_dir, None)?;
        debug!(%rootdir, "catalog ready");

        let client = Arc::new(client);
        let archives = ReadThrough::new(
            RemoteArchives::new(Arc::clone(&client)).with_scratch_root(rootdir.clone()),
            zip_store(zips_dir),
            true,
        );
        let meta = ReadThrough::new(
            RemoteMetadata::new(Arc::clone(&client)),
            meta_store(meta_dir),
            false,
        );
        Ok(Self {
            rootdir,
            client,
            archives,
            meta,
            options,
        })
    }

    pub fn rootdir(&self) -> &Utf8Path {
        &self.rootdir
    }

    pub fn zips_dir(&self) -> Utf8PathBuf {
        self.rootdir.join("zips")
    }

    pub fn meta_dir(&self) -> Utf8PathBuf {
        self.rootdir.join("meta")
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn options(&self) -> &CatalogOptions {
        &self.options
    }

    pub fn archives(&self) -> &ArchiveCache<C> {
        &self.archives
    }

    pub fn meta(&self) -> &MetaCache<C> {
        &self.meta
    }

    /// The dataset's files, downloading the archive on first access.
    pub fn get(&self, reference: &DatasetRef) -> Result<ArchiveView, HaggleError> {
        ArchiveView::from_bytes(self.get_bytes(reference)?)
    }

    pub fn get_bytes(&self, reference: &DatasetRef) -> Result<Vec<u8>, HaggleError> {
        self.archives.get(reference)
    }

    /// The dataset's metadata record, fetched once and then read from disk.
    pub fn info(&self, reference: &DatasetRef) -> Result<DatasetInfo, HaggleError> {
        self.meta.get(reference)
    }

    /// Removes the local archive only.
    pub fn delete(&self, reference: &DatasetRef) -> Result<(), HaggleError> {
        info!(%reference, "removing cached archive");
        self.archives.delete(reference)
    }

    /// Whether the archive is cached locally.
    pub fn contains(&self, reference: &DatasetRef) -> Result<bool, HaggleError> {
        self.archives.contains(reference)
    }

    /// A fresh lister over datasets matching `term`.
    pub fn search(&self, term: &str) -> Result<DatasetLister<Arc<C>>, HaggleError> {
        self.search_with(DatasetFilter::search(term))
    }

    /// Like [`KaggleDatasets::search`] with a full filter. When metadata
    /// caching is on, the listing is walked right away and every record is
    /// written to the metadata cache, replacing what was there.
    pub fn search_with(
        &self,
        filter: DatasetFilter,
    ) -> Result<DatasetLister<Arc<C>>, HaggleError> {
        let mut lister = DatasetLister::new(Arc::clone(&self.client), filter)
            .start_page(self.options.start_page)
            .max_pages(self.options.max_pages)
            .warn_if_more(self.options.warn_if_more);
        if self.options.cache_metas_on_search {
            let written = self.meta.extend(lister.index()?.indexed())?;
            debug!(written, "cached search metadata");
        }
        Ok(lister)
    }

    /// Archives present locally, with their size and modification time.
    pub fn cached(&self) -> Result<Vec<CachedArchive>, HaggleError> {
        let store = self.archives.store();
        let mut entries = Vec::new();
        for reference in store.keys()? {
            let path = store.root().join(RefPath::ZIP.encode(&reference));
            let metadata = fs::metadata(path.as_std_path())
                .map_err(|err| HaggleError::Filesystem(format!("stat {path}: {err}")))?;
            entries.push(CachedArchive {
                reference,
                size: metadata.len(),
                modified: metadata
                    .modified()
                    .ok()
                    .map(|time| DateTime::<Utc>::from(time).to_rfc3339()),
                path: path.to_string(),
            });
        }
        Ok(entries)
    }
}

/// Makes sure `path` is a directory. With a `confirm` callback the user gets
/// to refuse the creation.
pub fn ensure_dir(path: &Utf8Path, confirm: Option<&dyn ConfirmDir>) -> Result<(), HaggleError> {
    if path.as_std_path().is_dir() {
        return Ok(());
    }
    if path.as_std_path().exists() {
        return Err(HaggleError::Directory {
            path: path.to_string(),
            message: "exists and is not a directory".to_string(),
        });
    }
    if let Some(confirm) = confirm
        && !confirm.confirm_create(path)
    {
        return Err(HaggleError::Directory {
            path: path.to_string(),
            message: "creation declined".to_string(),
        });
    }
    info!(%path, "creating directory");
    fs::create_dir_all(path.as_std_path()).map_err(|err| HaggleError::Directory {
        path: path.to_string(),
        message: err.to_string(),
    })
}

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use camino::Utf8PathBuf;
use serde_json::{Map, Value, json};
use zip::write::SimpleFileOptions;

use haggle::domain::{DatasetFilter, DatasetInfo, DatasetRef};
use haggle::error::HaggleError;
use haggle::kaggle::KaggleClient;

/// In-memory Kaggle: listing pages by number, archives and metadata by ref.
#[derive(Default)]
pub struct MockKaggle {
    pub pages: HashMap<u32, Vec<DatasetInfo>>,
    pub archives: HashMap<String, Vec<u8>>,
    pub metadata: HashMap<String, DatasetInfo>,
    /// Refs whose download claims success but writes nothing.
    pub broken: Vec<String>,
    pub list_calls: Mutex<Vec<u32>>,
    pub download_calls: Mutex<usize>,
    pub metadata_calls: Mutex<usize>,
    pub download_dirs: Mutex<Vec<PathBuf>>,
}

impl MockKaggle {
    pub fn with_page(mut self, page: u32, records: Vec<DatasetInfo>) -> Self {
        self.pages.insert(page, records);
        self
    }

    pub fn with_archive(mut self, reference: &str, files: &[(&str, &[u8])]) -> Self {
        self.archives.insert(reference.to_string(), zip_of(files));
        self
    }

    pub fn with_metadata(mut self, record: DatasetInfo) -> Self {
        let reference = record.reference().unwrap_or_default().to_string();
        self.metadata.insert(reference, record);
        self
    }

    pub fn with_broken(mut self, reference: &str) -> Self {
        self.broken.push(reference.to_string());
        self
    }

    pub fn list_calls(&self) -> Vec<u32> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn download_calls(&self) -> usize {
        *self.download_calls.lock().unwrap()
    }

    pub fn metadata_calls(&self) -> usize {
        *self.metadata_calls.lock().unwrap()
    }

    pub fn download_dirs(&self) -> Vec<PathBuf> {
        self.download_dirs.lock().unwrap().clone()
    }
}

impl KaggleClient for MockKaggle {
    fn list(&self, page: u32, _filter: &DatasetFilter) -> Result<Vec<DatasetInfo>, HaggleError> {
        self.list_calls.lock().unwrap().push(page);
        Ok(self.pages.get(&page).cloned().unwrap_or_default())
    }

    fn download(
        &self,
        reference: &DatasetRef,
        destination_dir: &Path,
    ) -> Result<PathBuf, HaggleError> {
        *self.download_calls.lock().unwrap() += 1;
        self.download_dirs
            .lock()
            .unwrap()
            .push(destination_dir.to_path_buf());
        let key = reference.to_string();
        let path = destination_dir.join(format!("{}.zip", reference.name()));
        if self.broken.contains(&key) {
            return Ok(path);
        }
        let bytes = self
            .archives
            .get(&key)
            .ok_or(HaggleError::DatasetNotFound(key))?;
        std::fs::write(&path, bytes).unwrap();
        Ok(path)
    }

    fn metadata(&self, reference: &DatasetRef) -> Result<DatasetInfo, HaggleError> {
        *self.metadata_calls.lock().unwrap() += 1;
        let key = reference.to_string();
        self.metadata
            .get(&key)
            .cloned()
            .ok_or(HaggleError::DatasetNotFound(key))
    }
}

pub fn record(reference: &str, title: &str) -> DatasetInfo {
    let value = json!({ "ref": reference, "title": title, "totalBytes": 1024 });
    match value {
        Value::Object(map) => DatasetInfo::new(map),
        _ => unreachable!(),
    }
}

pub fn unreferenced(title: &str) -> DatasetInfo {
    let mut map = Map::new();
    map.insert("title".to_string(), Value::String(title.to_string()));
    DatasetInfo::new(map)
}

/// `count` records `owner/<prefix>-<n>`.
pub fn page_of(prefix: &str, count: usize) -> Vec<DatasetInfo> {
    (0..count)
        .map(|n| record(&format!("owner/{prefix}-{n}"), &format!("{prefix} {n}")))
        .collect()
}

pub fn zip_of(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("haggle")).unwrap();
    (temp, root)
}

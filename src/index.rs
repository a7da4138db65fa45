use std::collections::HashMap;

use crate::domain::DatasetInfo;
use crate::error::HaggleError;
use crate::store::KeyedReader;

/// Listing pages in fetch order, with a `ref -> (page, offset)` index.
///
/// Records without a string `ref` are kept in their page but are not
/// indexed. A ref seen again in a later page points at the later record.
/// Only one producer may append to an index.
#[derive(Debug, Clone, Default)]
pub struct PagedIndex {
    pages: Vec<Vec<DatasetInfo>>,
    positions: HashMap<String, (usize, usize)>,
}

impl PagedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, page_contents: Vec<DatasetInfo>) {
        let page = self.pages.len();
        for (offset, record) in page_contents.iter().enumerate() {
            if let Some(reference) = record.reference() {
                self.positions.insert(reference.to_string(), (page, offset));
            }
        }
        self.pages.push(page_contents);
    }

    pub fn lookup(&self, reference: &str) -> Result<&DatasetInfo, HaggleError> {
        self.position(reference)
            .map(|(page, offset)| &self.pages[page][offset])
            .ok_or_else(|| HaggleError::NotFound(reference.to_string()))
    }

    pub fn position(&self, reference: &str) -> Option<(usize, usize)> {
        self.positions.get(reference).copied()
    }

    /// Number of indexed refs, not of raw records.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, page: usize) -> Option<&[DatasetInfo]> {
        self.pages.get(page).map(Vec::as_slice)
    }

    /// Every record, page by page.
    pub fn records(&self) -> impl Iterator<Item = &DatasetInfo> {
        self.pages.iter().flatten()
    }

    /// One record per indexed ref, in page-then-offset order.
    pub fn indexed(&self) -> impl Iterator<Item = &DatasetInfo> {
        self.pages.iter().enumerate().flat_map(move |(page, records)| {
            records
                .iter()
                .enumerate()
                .filter(move |(offset, record)| {
                    record
                        .reference()
                        .and_then(|reference| self.position(reference))
                        == Some((page, *offset))
                })
                .map(|(_, record)| record)
        })
    }

    pub fn refs(&self) -> impl Iterator<Item = &str> {
        self.indexed().filter_map(DatasetInfo::reference)
    }
}

impl KeyedReader<str, DatasetInfo> for PagedIndex {
    fn get(&self, key: &str) -> Result<DatasetInfo, HaggleError> {
        self.lookup(key).cloned()
    }

    fn contains(&self, key: &str) -> Result<bool, HaggleError> {
        Ok(self.positions.contains_key(key))
    }
}
